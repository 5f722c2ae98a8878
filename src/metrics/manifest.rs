//! Export manifest: the public metric names this package promises

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Regression metric names, in export order
pub const REGRESSION_METRICS: [&str; 4] = ["MSE", "RMSE", "MAE", "RMSLE"];

/// Classification metric names, in export order
///
/// `AUC` and `PrecisionRecallCurve` are supplied by the reference-library
/// backed module, not by `classification`, yet they are grouped here.
pub const CLASSIFICATION_METRICS: [&str; 16] = [
    "AUC",
    "AUROC",
    "Accuracy",
    "AveragePrecision",
    "ConfusionMatrix",
    "DiceCoefficient",
    "F1",
    "FBeta",
    "MulticlassPrecisionRecall",
    "MulticlassROC",
    "Precision",
    "PrecisionRecall",
    "PrecisionRecallCurve",
    "ROC",
    "Recall",
    "IoU",
];

/// The one exported name that belongs to neither group
pub const EXTRA_EXPORT: &str = "SklearnMetric";

/// Ordered list of exported names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    names: Vec<&'static str>,
}

#[derive(Serialize)]
struct ManifestView<'a> {
    regression: &'a [&'static str],
    classification: &'a [&'static str],
    all: &'a [&'static str],
}

impl Manifest {
    /// Regression names, then classification names, then [`EXTRA_EXPORT`]
    pub fn new() -> Self {
        let names = REGRESSION_METRICS
            .iter()
            .chain(CLASSIFICATION_METRICS.iter())
            .copied()
            .chain(std::iter::once(EXTRA_EXPORT))
            .collect();
        Manifest { names }
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.iter().copied()
    }

    pub fn regression(&self) -> &'static [&'static str] {
        &REGRESSION_METRICS
    }

    pub fn classification(&self) -> &'static [&'static str] {
        &CLASSIFICATION_METRICS
    }

    /// Fails on the first name listed twice
    pub fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.names.len());
        for name in &self.names {
            if !seen.insert(*name) {
                return Err(Error::DuplicateExport(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let view = ManifestView {
            regression: self.regression(),
            classification: self.classification(),
            all: &self.names,
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_length() {
        let manifest = Manifest::new();
        assert_eq!(
            manifest.len(),
            REGRESSION_METRICS.len() + CLASSIFICATION_METRICS.len() + 1
        );
        assert_eq!(manifest.len(), 21);
    }

    #[test]
    fn test_manifest_order() {
        let manifest = Manifest::new();
        assert_eq!(manifest.names()[..4], ["MSE", "RMSE", "MAE", "RMSLE"]);
        assert_eq!(manifest.names()[4..20], CLASSIFICATION_METRICS);
        assert_eq!(manifest.names()[20], "SklearnMetric");
    }

    #[test]
    fn test_manifest_unique() {
        assert!(Manifest::new().check_unique().is_ok());

        let broken = Manifest {
            names: vec!["MSE", "AUC", "MSE"],
        };
        assert!(matches!(
            broken.check_unique(),
            Err(Error::DuplicateExport(name)) if name == "MSE"
        ));
    }

    #[test]
    fn test_classification_keeps_reference_backed_names() {
        assert_eq!(CLASSIFICATION_METRICS.len(), 16);
        assert!(CLASSIFICATION_METRICS.contains(&"AUC"));
        assert!(CLASSIFICATION_METRICS.contains(&"PrecisionRecallCurve"));
        assert!(!CLASSIFICATION_METRICS.contains(&EXTRA_EXPORT));
    }

    #[test]
    fn test_manifest_json() {
        let json = Manifest::new().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["regression"][3], "RMSLE");
        assert_eq!(value["classification"].as_array().unwrap().len(), 16);
        assert_eq!(value["all"][20], "SklearnMetric");
    }
}
