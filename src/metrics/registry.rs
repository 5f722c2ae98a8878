//! Metric registry
//!
//! The registry is the explicit namespace of the metrics package. It is
//! populated once from the providing modules, checked against the
//! [`Manifest`], and immutable afterwards. A provider that fails to supply an
//! expected symbol aborts construction with [`Error::MissingSymbol`].

use crate::config::MetricsConfig;
use crate::error::{Error, Result};
use crate::metrics::manifest::Manifest;
use crate::metrics::metric::{Metric, MetricInput, MetricOutput, NumpyMetric, ReduceOp, TensorMetric};
use crate::metrics::{classification, converters, metric, regression, sklearns};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Builds a metric from configuration
pub type MetricFactory = fn(&MetricsConfig) -> Result<RegisteredMetric>;

/// Exported base types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Metric,
    TensorMetric,
    NumpyMetric,
}

/// Exported function-to-metric converters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    NumpyMetric,
    TensorMetric,
}

/// Symbol behind an exported name
#[derive(Clone, Copy)]
pub enum Export {
    Metric(MetricFactory),
    BaseType(BaseType),
    Converter(Converter),
}

impl Export {
    pub fn is_metric(&self) -> bool {
        matches!(self, Export::Metric(_))
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Metric(_) => f.write_str("Metric(<factory>)"),
            Export::BaseType(t) => f.debug_tuple("BaseType").field(t).finish(),
            Export::Converter(c) => f.debug_tuple("Converter").field(c).finish(),
        }
    }
}

/// A metric built by the registry
#[derive(Debug)]
pub enum RegisteredMetric {
    Tensor(TensorMetric),
    Numpy(NumpyMetric),
}

impl RegisteredMetric {
    pub fn reduce_op(&self) -> ReduceOp {
        match self {
            RegisteredMetric::Tensor(m) => m.reduce_op(),
            RegisteredMetric::Numpy(m) => m.reduce_op(),
        }
    }

    pub fn compute_distributed(&self, shards: &[MetricInput<'_>]) -> Result<MetricOutput> {
        match self {
            RegisteredMetric::Tensor(m) => m.compute_distributed(shards),
            RegisteredMetric::Numpy(m) => m.compute_distributed(shards),
        }
    }
}

impl Metric for RegisteredMetric {
    fn name(&self) -> &str {
        match self {
            RegisteredMetric::Tensor(m) => m.name(),
            RegisteredMetric::Numpy(m) => m.name(),
        }
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        match self {
            RegisteredMetric::Tensor(m) => m.compute(input),
            RegisteredMetric::Numpy(m) => m.compute(input),
        }
    }
}

/// A module that supplies symbols to the registry
pub trait ExportProvider {
    fn module(&self) -> &str;
    fn exports(&self) -> Vec<(&'static str, Export)>;
}

/// Provider backed by one of this crate's modules
#[derive(Debug, Clone, Copy)]
pub struct ModuleProvider {
    module: &'static str,
    exports: fn() -> Vec<(&'static str, Export)>,
}

impl ExportProvider for ModuleProvider {
    fn module(&self) -> &str {
        self.module
    }

    fn exports(&self) -> Vec<(&'static str, Export)> {
        (self.exports)()
    }
}

/// The five modules the metrics package is assembled from
pub fn default_providers() -> Vec<ModuleProvider> {
    vec![
        ModuleProvider {
            module: "converters",
            exports: converters::exports,
        },
        ModuleProvider {
            module: "metric",
            exports: metric::exports,
        },
        ModuleProvider {
            module: "regression",
            exports: regression::exports,
        },
        ModuleProvider {
            module: "classification",
            exports: classification::exports,
        },
        ModuleProvider {
            module: "sklearns",
            exports: sklearns::exports,
        },
    ]
}

/// Names each module must provide, in import order
pub const IMPORTS: &[(&str, &[&str])] = &[
    ("converters", &["numpy_metric", "tensor_metric"]),
    ("metric", &["Metric", "TensorMetric", "NumpyMetric"]),
    ("regression", &["MSE", "RMSE", "MAE", "RMSLE"]),
    (
        "classification",
        &[
            "Accuracy",
            "AveragePrecision",
            "ConfusionMatrix",
            "F1",
            "FBeta",
            "Recall",
            "ROC",
            "AUROC",
            "DiceCoefficient",
            "MulticlassPrecisionRecall",
            "MulticlassROC",
            "Precision",
            "PrecisionRecall",
            "IoU",
        ],
    ),
    ("sklearns", &["AUC", "PrecisionRecallCurve", "SklearnMetric"]),
];

/// Immutable name to symbol mapping of the metrics package
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    symbols: Vec<(&'static str, Export)>,
    index: HashMap<&'static str, usize>,
    manifest: Manifest,
}

impl MetricRegistry {
    /// Build from this crate's own modules
    pub fn new() -> Result<Self> {
        let providers = default_providers();
        let providers: Vec<&dyn ExportProvider> = providers
            .iter()
            .map(|p| p as &dyn ExportProvider)
            .collect();
        Self::from_providers(&providers)
    }

    /// Resolve every entry of [`IMPORTS`] against `providers`, then check the
    /// manifest against the resulting namespace
    pub fn from_providers(providers: &[&dyn ExportProvider]) -> Result<Self> {
        let mut symbols = Vec::new();
        let mut index = HashMap::new();

        for (module, names) in IMPORTS {
            let provider = providers
                .iter()
                .find(|p| p.module() == *module)
                .ok_or_else(|| Error::MissingSymbol {
                    module: module.to_string(),
                    name: names.first().copied().unwrap_or_default().to_string(),
                })?;

            let available: HashMap<&'static str, Export> = provider.exports().into_iter().collect();

            for name in names.iter() {
                let export = available.get(name).copied().ok_or_else(|| Error::MissingSymbol {
                    module: module.to_string(),
                    name: name.to_string(),
                })?;

                if index.insert(*name, symbols.len()).is_some() {
                    return Err(Error::DuplicateExport(name.to_string()));
                }
                log::debug!("imported {} from {}", name, module);
                symbols.push((*name, export));
            }
        }

        let manifest = Manifest::new();
        manifest.check_unique()?;
        if let Some(dangling) = manifest.iter().find(|name| !index.contains_key(name)) {
            return Err(Error::DanglingExport(dangling.to_string()));
        }

        log::info!(
            "metric registry ready: {} symbols, {} exported",
            symbols.len(),
            manifest.len()
        );

        Ok(MetricRegistry {
            symbols,
            index,
            manifest,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.index.get(name).map(|&i| &self.symbols[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Every imported name, exported or not, in import order
    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.symbols.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Instantiate the metric exported as `name`
    pub fn create(&self, name: &str, config: &MetricsConfig) -> Result<RegisteredMetric> {
        match self.get(name) {
            Some(Export::Metric(factory)) => {
                config.validate()?;
                factory(config)
            }
            Some(_) => Err(Error::NotAMetric(name.to_string())),
            None => Err(Error::UnknownMetric(name.to_string())),
        }
    }

    /// Instantiate every metric of the manifest
    pub fn create_all(&self, config: &MetricsConfig) -> Result<Vec<RegisteredMetric>> {
        self.manifest
            .iter()
            .map(|name| self.create(name, config))
            .collect()
    }
}

static GLOBAL_REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Process-wide registry, built on first use
///
/// Concurrent first callers wait for a single build. A failed build is
/// returned and not cached.
pub fn registry() -> Result<&'static MetricRegistry> {
    if let Some(registry) = GLOBAL_REGISTRY.get() {
        return Ok(registry);
    }

    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(registry) = GLOBAL_REGISTRY.get() {
        return Ok(registry);
    }
    let built = MetricRegistry::new()?;
    Ok(GLOBAL_REGISTRY.get_or_init(|| built))
}
