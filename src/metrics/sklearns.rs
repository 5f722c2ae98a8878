//! Metrics backed by reference-library style functions on host slices
//!
//! These follow the conventions of the usual Python reference library:
//! functions take `(y_pred, y_true)` as plain slices, binary scores use the
//! positive label 1, and every metric here is a [`NumpyMetric`].

use crate::config::MetricsConfig;
use crate::error::{check_lengths, Error, Result};
use crate::metrics::classification::{
    auc, average_precision, confusion_matrix, precision_recall_curve, roc_curve, stat_scores,
    StatScores,
};
use crate::metrics::converters::numpy_metric;
use crate::metrics::metric::{
    observed_classes, to_label, Metric, MetricInput, MetricOutput, NumpyMetric, ReduceOp,
};
use crate::metrics::regression;
use crate::metrics::registry::{Export, RegisteredMetric};

type ReferenceFn = fn(&[f64], &[f64]) -> Result<MetricOutput>;

const REFERENCE_FUNCTIONS: &[(&str, ReferenceFn)] = &[
    ("accuracy_score", accuracy_score),
    ("auc", auc_score),
    ("average_precision_score", average_precision_score),
    ("confusion_matrix", confusion_matrix_score),
    ("f1_score", f1_score),
    ("mean_absolute_error", mean_absolute_error),
    ("mean_squared_error", mean_squared_error),
    ("precision_score", precision_score),
    ("recall_score", recall_score),
    ("roc_auc_score", roc_auc_score),
];

/// Names accepted by [`SklearnMetric::new`]
pub fn reference_functions() -> impl Iterator<Item = &'static str> {
    REFERENCE_FUNCTIONS.iter().map(|(name, _)| *name)
}

fn reference_function(name: &str) -> Option<ReferenceFn> {
    REFERENCE_FUNCTIONS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, func)| *func)
}

fn label_pair(y_pred: &[f64], y_true: &[f64]) -> Result<(Vec<usize>, Vec<usize>)> {
    check_lengths(y_pred.len(), y_true.len())?;
    let pred = y_pred.iter().map(|&v| to_label(v)).collect::<Result<Vec<_>>>()?;
    let target = y_true.iter().map(|&v| to_label(v)).collect::<Result<Vec<_>>>()?;
    Ok((pred, target))
}

/// Counts of the positive class (label 1)
fn positive_counts(y_pred: &[f64], y_true: &[f64]) -> Result<StatScores> {
    let (pred, target) = label_pair(y_pred, y_true)?;
    let n = observed_classes(&pred, &target)?.max(2);
    Ok(stat_scores(&pred, &target, n)[1])
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn positive_mask(y_true: &[f64]) -> Vec<bool> {
    y_true.iter().map(|&t| t == 1.0).collect()
}

fn accuracy_score(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let (pred, target) = label_pair(y_pred, y_true)?;
    let correct = pred.iter().zip(target.iter()).filter(|(p, t)| p == t).count();
    Ok(MetricOutput::Scalar(ratio(correct, target.len())))
}

fn auc_score(x: &[f64], y: &[f64]) -> Result<MetricOutput> {
    Ok(MetricOutput::Scalar(auc(x, y, false)?))
}

fn average_precision_score(scores: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let curve = precision_recall_curve(scores, &positive_mask(y_true))?;
    Ok(MetricOutput::Scalar(average_precision(&curve)))
}

fn confusion_matrix_score(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let (pred, target) = label_pair(y_pred, y_true)?;
    let n = observed_classes(&pred, &target)?;
    Ok(MetricOutput::Matrix(confusion_matrix(&pred, &target, n)))
}

fn precision_score(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let s = positive_counts(y_pred, y_true)?;
    Ok(MetricOutput::Scalar(ratio(s.tp, s.tp + s.fp)))
}

fn recall_score(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let s = positive_counts(y_pred, y_true)?;
    Ok(MetricOutput::Scalar(ratio(s.tp, s.support)))
}

fn f1_score(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let s = positive_counts(y_pred, y_true)?;
    Ok(MetricOutput::Scalar(ratio(2 * s.tp, 2 * s.tp + s.fp + s.fn_)))
}

fn mean_absolute_error(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    Ok(MetricOutput::Scalar(regression::mean_absolute_error(y_true, y_pred)?))
}

fn mean_squared_error(y_pred: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    Ok(MetricOutput::Scalar(regression::mean_squared_error(y_true, y_pred)?))
}

fn roc_auc_score(scores: &[f64], y_true: &[f64]) -> Result<MetricOutput> {
    let roc = roc_curve(scores, &positive_mask(y_true))?;
    Ok(MetricOutput::Scalar(auc(&roc.fpr, &roc.tpr, false)?))
}

/// Area under an `(x, y)` curve; `x` travels as predictions, `y` as targets
#[derive(Debug, Clone, Copy, Default)]
pub struct Auc {
    pub reorder: bool,
}

impl Auc {
    pub fn into_numpy(self, reduce_op: ReduceOp) -> NumpyMetric {
        let reorder = self.reorder;
        numpy_metric("AUC", reduce_op, move |x, y| {
            Ok(MetricOutput::Scalar(auc(x, y, reorder)?))
        })
    }
}

impl Metric for Auc {
    fn name(&self) -> &str {
        "AUC"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        Ok(MetricOutput::Scalar(auc(input.pred(), input.target(), self.reorder)?))
    }
}

/// Precision-recall curve on binary scores
#[derive(Debug, Clone, Copy)]
pub struct PrecisionRecallCurve {
    pub pos_label: usize,
}

impl Default for PrecisionRecallCurve {
    fn default() -> Self {
        PrecisionRecallCurve { pos_label: 1 }
    }
}

impl PrecisionRecallCurve {
    pub fn into_numpy(self, reduce_op: ReduceOp) -> NumpyMetric {
        let pos_label = self.pos_label;
        numpy_metric("PrecisionRecallCurve", reduce_op, move |scores, y_true| {
            let positive = y_true
                .iter()
                .map(|&t| to_label(t).map(|label| label == pos_label))
                .collect::<Result<Vec<_>>>()?;
            Ok(MetricOutput::PrecisionRecall(precision_recall_curve(
                scores, &positive,
            )?))
        })
    }
}

impl Metric for PrecisionRecallCurve {
    fn name(&self) -> &str {
        "PrecisionRecallCurve"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        let positive: Vec<bool> = input
            .target_labels()?
            .into_iter()
            .map(|t| t == self.pos_label)
            .collect();
        Ok(MetricOutput::PrecisionRecall(precision_recall_curve(
            input.pred(),
            &positive,
        )?))
    }
}

/// A reference function looked up by name and run as a [`NumpyMetric`]
#[derive(Debug, Clone)]
pub struct SklearnMetric {
    metric_name: String,
    inner: NumpyMetric,
}

impl SklearnMetric {
    pub fn new(metric_name: &str, reduce_op: ReduceOp) -> Result<Self> {
        let func = reference_function(metric_name)
            .ok_or_else(|| Error::UnknownFunction(metric_name.to_string()))?;

        Ok(SklearnMetric {
            metric_name: metric_name.to_string(),
            inner: numpy_metric(metric_name, reduce_op, func),
        })
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn into_numpy(self) -> NumpyMetric {
        self.inner
    }
}

impl Metric for SklearnMetric {
    fn name(&self) -> &str {
        &self.metric_name
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        self.inner.compute(input)
    }
}

fn numpy(metric: NumpyMetric) -> Result<RegisteredMetric> {
    Ok(RegisteredMetric::Numpy(metric))
}

/// Symbols this module provides to the registry
pub(crate) fn exports() -> Vec<(&'static str, Export)> {
    vec![
        (
            "AUC",
            Export::Metric(|c: &MetricsConfig| {
                numpy(Auc { reorder: c.reorder }.into_numpy(c.reduce_op))
            }),
        ),
        (
            "PrecisionRecallCurve",
            Export::Metric(|c: &MetricsConfig| {
                numpy(PrecisionRecallCurve { pos_label: c.pos_label }.into_numpy(c.reduce_op))
            }),
        ),
        (
            "SklearnMetric",
            Export::Metric(|c: &MetricsConfig| {
                numpy(SklearnMetric::new(&c.sklearn_metric, c.reduce_op)?.into_numpy())
            }),
        ),
    ]
}
