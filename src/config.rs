//! Metric configuration
//!
//! Options shared by the metrics the registry builds. Loaded from TOML or
//! YAML; every field has a default so partial files are fine.

use crate::error::{Error, Result};
use crate::metrics::metric::{ReduceOp, Reduction, MAX_CLASSES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options passed to every metric factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How per-element or per-class values are collapsed
    pub reduction: Reduction,
    /// Number of classes; inferred from the labels when absent
    pub num_classes: Option<usize>,
    /// Weight of recall in `FBeta`
    pub beta: f64,
    /// Label treated as positive by score based metrics
    pub pos_label: usize,
    /// Normalize confusion matrix rows
    pub normalize: bool,
    /// Score the background class in `DiceCoefficient`
    pub include_background: bool,
    pub nan_score: f64,
    pub no_fg_score: f64,
    /// Drop the background class from `IoU`
    pub remove_bg: bool,
    /// Sort points by x before `AUC`
    pub reorder: bool,
    /// Reference function run by `SklearnMetric`
    pub sklearn_metric: String,
    /// Merge operation across shards
    pub reduce_op: ReduceOp,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            reduction: Reduction::ElementwiseMean,
            num_classes: None,
            beta: 1.0,
            pos_label: 1,
            normalize: false,
            include_background: false,
            nan_score: 0.0,
            no_fg_score: 0.0,
            remove_bg: false,
            reorder: false,
            sklearn_metric: "accuracy_score".to_string(),
            reduce_op: ReduceOp::Mean,
        }
    }
}

impl MetricsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MetricsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: MetricsConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => {
                log::warn!(
                    "unrecognized config extension {:?} for {}, trying YAML",
                    other,
                    path.display()
                );
                Self::from_yaml_str(&content)
            }
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.beta > 0.0) {
            return Err(Error::Config(format!(
                "beta must be positive, got {}",
                self.beta
            )));
        }

        match self.num_classes {
            Some(0) => {
                return Err(Error::Config("num_classes must be at least 1".to_string()));
            }
            Some(n) if n > MAX_CLASSES => {
                return Err(Error::Config(format!(
                    "num_classes must be at most {}, got {}",
                    MAX_CLASSES, n
                )));
            }
            _ => {}
        }

        if self.sklearn_metric.is_empty() {
            return Err(Error::Config("sklearn_metric must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_is_valid() {
        assert!(MetricsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = MetricsConfig::from_toml_str(
            r#"
reduction = "sum"
num_classes = 3
reduce_op = "max"
"#,
        )
        .unwrap();

        assert_eq!(config.reduction, Reduction::Sum);
        assert_eq!(config.num_classes, Some(3));
        assert_eq!(config.reduce_op, ReduceOp::Max);
        assert_eq!(config.beta, 1.0);
        assert_eq!(config.sklearn_metric, "accuracy_score");
    }

    #[test]
    fn test_yaml() {
        let config = MetricsConfig::from_yaml_str(
            "reduction: none\nbeta: 2.0\npos_label: 0\nsklearn_metric: roc_auc_score\n",
        )
        .unwrap();

        assert_eq!(config.reduction, Reduction::None);
        assert_eq!(config.beta, 2.0);
        assert_eq!(config.pos_label, 0);
        assert_eq!(config.sklearn_metric, "roc_auc_score");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            MetricsConfig::from_toml_str("beta = 0.0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MetricsConfig::from_toml_str("num_classes = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MetricsConfig::from_toml_str("num_classes = 1000000"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MetricsConfig::from_toml_str("reduction = \"median\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut toml_file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(toml_file, "normalize = true").unwrap();
        let config = MetricsConfig::from_file(toml_file.path()).unwrap();
        assert!(config.normalize);

        let mut yaml_file = Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(yaml_file, "remove_bg: true").unwrap();
        let config = MetricsConfig::from_file(yaml_file.path()).unwrap();
        assert!(config.remove_bg);

        assert!(MetricsConfig::from_file("/nonexistent/metrics.toml").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MetricsConfig {
            num_classes: Some(4),
            normalize: true,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(MetricsConfig::from_toml_str(&text).unwrap(), config);
    }
}
