//! Export manifest and registry construction

use evalkit::metrics::manifest::{CLASSIFICATION_METRICS, EXTRA_EXPORT, REGRESSION_METRICS};
use evalkit::metrics::registry::{
    default_providers, Export, ExportProvider, ModuleProvider, IMPORTS,
};
use evalkit::{Error, Manifest, MetricRegistry};
use std::collections::HashSet;

/// Wraps a provider and hides one of its symbols
struct Without {
    inner: ModuleProvider,
    hidden: &'static str,
}

impl ExportProvider for Without {
    fn module(&self) -> &str {
        self.inner.module()
    }

    fn exports(&self) -> Vec<(&'static str, Export)> {
        self.inner
            .exports()
            .into_iter()
            .filter(|(name, _)| *name != self.hidden)
            .collect()
    }
}

#[test]
fn test_manifest_length_is_sum_of_groups_plus_one() {
    let manifest = Manifest::new();
    assert_eq!(
        manifest.len(),
        REGRESSION_METRICS.len() + CLASSIFICATION_METRICS.len() + 1
    );
}

#[test]
fn test_manifest_names_are_unique() {
    let manifest = Manifest::new();
    let unique: HashSet<&str> = manifest.iter().collect();
    assert_eq!(unique.len(), manifest.len());
}

#[test]
fn test_regression_names_in_order() {
    assert_eq!(REGRESSION_METRICS, ["MSE", "RMSE", "MAE", "RMSLE"]);
}

#[test]
fn test_classification_group_has_sixteen_names() {
    assert_eq!(CLASSIFICATION_METRICS.len(), 16);
    assert!(CLASSIFICATION_METRICS.contains(&"AUC"));
    assert!(CLASSIFICATION_METRICS.contains(&"PrecisionRecallCurve"));
    assert_eq!(EXTRA_EXPORT, "SklearnMetric");
}

#[test]
fn test_reference_backed_names_come_from_sklearns() {
    let (_, sklearn_names) = IMPORTS
        .iter()
        .find(|(module, _)| *module == "sklearns")
        .expect("sklearns import list");
    assert!(sklearn_names.contains(&"AUC"));
    assert!(sklearn_names.contains(&"PrecisionRecallCurve"));

    let (_, classification_names) = IMPORTS
        .iter()
        .find(|(module, _)| *module == "classification")
        .expect("classification import list");
    assert!(!classification_names.contains(&"AUC"));
}

#[test]
fn test_every_manifest_name_resolves() {
    let registry = MetricRegistry::new().unwrap();
    for name in registry.manifest().iter() {
        assert!(registry.get(name).is_some(), "{} does not resolve", name);
    }
}

#[test]
fn test_removing_any_symbol_fails_construction() {
    for provider in default_providers() {
        for (hidden, _) in provider.exports() {
            let stripped: Vec<Without> = default_providers()
                .into_iter()
                .map(|p| Without {
                    inner: p,
                    hidden: if p.module() == provider.module() { hidden } else { "" },
                })
                .collect();
            let providers: Vec<&dyn ExportProvider> =
                stripped.iter().map(|p| p as &dyn ExportProvider).collect();

            let result = MetricRegistry::from_providers(&providers);
            assert!(
                matches!(result, Err(Error::MissingSymbol { ref name, .. }) if name == hidden),
                "hiding {} did not fail",
                hidden
            );
        }
    }
}

#[test]
fn test_no_providers_is_an_error_not_an_empty_registry() {
    let result = MetricRegistry::from_providers(&[]);
    assert!(matches!(result, Err(Error::MissingSymbol { .. })));
}

#[test]
fn test_global_registry_matches_fresh_one() {
    let global = evalkit::registry().unwrap();
    let fresh = MetricRegistry::new().unwrap();
    assert_eq!(global.manifest(), fresh.manifest());
    assert_eq!(
        global.symbols().collect::<Vec<_>>(),
        fresh.symbols().collect::<Vec<_>>()
    );
}

#[test]
fn test_registry_from_many_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| evalkit::registry().map(|r| r as *const _ as usize)))
        .collect();

    let addresses: HashSet<usize> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    assert_eq!(addresses.len(), 1);
}
