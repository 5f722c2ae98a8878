//! Base metric types
//!
//! Every metric in this crate implements [`Metric`]. The two wrappers,
//! [`TensorMetric`] and [`NumpyMetric`], add the reduction step used to merge
//! results that were computed on several shards of a distributed run.

use crate::error::{check_lengths, Error, Result};
use crate::metrics::registry::{BaseType, Export};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Borrowed predictions and targets handed to a metric
#[derive(Debug, Clone, Copy)]
pub struct MetricInput<'a> {
    pred: &'a [f64],
    target: &'a [f64],
    /// Number of prediction columns per sample (1 unless probabilities)
    num_columns: usize,
    probabilities: bool,
}

impl<'a> MetricInput<'a> {
    /// One prediction (label or score) per target
    pub fn new(pred: &'a [f64], target: &'a [f64]) -> Result<Self> {
        check_lengths(pred.len(), target.len())?;
        Ok(MetricInput {
            pred,
            target,
            num_columns: 1,
            probabilities: false,
        })
    }

    /// Row-major `samples x num_classes` probability matrix
    pub fn probabilities(pred: &'a [f64], target: &'a [f64], num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::InvalidInput(
                "a probability matrix needs at least one class".to_string(),
            ));
        }

        check_lengths(pred.len() / num_classes, target.len())?;
        if pred.len() != target.len() * num_classes {
            return Err(Error::DimensionMismatch(format!(
                "expected {} probabilities ({} samples x {} classes), got {}",
                target.len() * num_classes,
                target.len(),
                num_classes,
                pred.len()
            )));
        }

        Ok(MetricInput {
            pred,
            target,
            num_columns: num_classes,
            probabilities: true,
        })
    }

    pub fn pred(&self) -> &'a [f64] {
        self.pred
    }

    pub fn target(&self) -> &'a [f64] {
        self.target
    }

    pub fn num_samples(&self) -> usize {
        self.target.len()
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn is_probabilities(&self) -> bool {
        self.probabilities
    }

    /// Prediction row of sample `i`
    pub fn row(&self, i: usize) -> &'a [f64] {
        let start = i * self.num_columns;
        &self.pred[start..start + self.num_columns]
    }

    /// Hard predictions: the argmax of each row for probabilities, the raw
    /// values otherwise
    pub fn pred_labels(&self) -> Result<Vec<usize>> {
        if self.probabilities {
            Ok((0..self.num_samples())
                .map(|i| argmax(self.row(i)))
                .collect())
        } else {
            self.pred.iter().map(|&v| to_label(v)).collect()
        }
    }

    pub fn target_labels(&self) -> Result<Vec<usize>> {
        self.target.iter().map(|&v| to_label(v)).collect()
    }

    /// Fails unless this input carries one value per sample
    pub(crate) fn require_flat(&self, metric: &str) -> Result<()> {
        if self.probabilities {
            return Err(Error::InvalidInput(format!(
                "{} expects one score per sample, got a probability matrix",
                metric
            )));
        }
        Ok(())
    }

    pub(crate) fn require_probabilities(&self, metric: &str) -> Result<()> {
        if !self.probabilities {
            return Err(Error::InvalidInput(format!(
                "{} expects a samples x classes probability matrix",
                metric
            )));
        }
        Ok(())
    }
}

/// Largest number of classes a label based metric accepts
///
/// Labels index per-class counts and confusion matrices, so every label must
/// be below this limit.
pub const MAX_CLASSES: usize = 1 << 16;

/// Converts a float encoded class label into an index
pub(crate) fn to_label(value: f64) -> Result<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(Error::InvalidValue(format!(
            "class labels must be non-negative integers, got {}",
            value
        )));
    }

    if value >= MAX_CLASSES as f64 {
        return Err(Error::InvalidValue(format!(
            "class label {} exceeds the limit of {} classes",
            value, MAX_CLASSES
        )));
    }
    Ok(value as usize)
}

/// Number of classes implied by the labels: the largest label plus one
pub(crate) fn observed_classes(pred: &[usize], target: &[usize]) -> Result<usize> {
    match pred.iter().chain(target.iter()).copied().max() {
        None => Ok(0),
        Some(largest) => largest
            .checked_add(1)
            .filter(|&n| n <= MAX_CLASSES)
            .ok_or_else(|| {
                Error::InvalidValue(format!(
                    "class label {} exceeds the limit of {} classes",
                    largest, MAX_CLASSES
                ))
            }),
    }
}

fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// JSON has no NaN: serde_json writes it as `null`, which reads back as NaN
mod nan_as_null {
    use serde::{Deserialize, Deserializer};

    pub fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }

    pub fn vector<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    pub fn matrix<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error> {
        let rows = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect())
    }
}

/// Receiver operating characteristic curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub fpr: Vec<f64>,
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub tpr: Vec<f64>,
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub thresholds: Vec<f64>,
}

/// Precision-recall curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub precision: Vec<f64>,
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub recall: Vec<f64>,
    #[serde(deserialize_with = "nan_as_null::vector")]
    pub thresholds: Vec<f64>,
}

/// Value produced by a metric
///
/// Undefined entries (an absent class in `IoU`, a degenerate curve) are NaN.
/// In JSON they are written as `null` and read back as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricOutput {
    #[serde(deserialize_with = "nan_as_null::scalar")]
    Scalar(f64),
    #[serde(deserialize_with = "nan_as_null::vector")]
    Vector(Vec<f64>),
    #[serde(deserialize_with = "nan_as_null::matrix")]
    Matrix(Vec<Vec<f64>>),
    Roc(RocCurve),
    PrecisionRecall(PrCurve),
    MulticlassRoc(Vec<RocCurve>),
    MulticlassPrecisionRecall(Vec<PrCurve>),
}

impl MetricOutput {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricOutput::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            MetricOutput::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            MetricOutput::Matrix(m) => Some(m),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MetricOutput::Scalar(_) => "scalar",
            MetricOutput::Vector(_) => "vector",
            MetricOutput::Matrix(_) => "matrix",
            MetricOutput::Roc(_) => "roc",
            MetricOutput::PrecisionRecall(_) => "precision_recall",
            MetricOutput::MulticlassRoc(_) => "multiclass_roc",
            MetricOutput::MulticlassPrecisionRecall(_) => "multiclass_precision_recall",
        }
    }
}

/// How per-element or per-class values collapse into the reported value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    ElementwiseMean,
    Sum,
    None,
}

impl Reduction {
    pub fn apply(self, values: Vec<f64>) -> MetricOutput {
        match self {
            Reduction::ElementwiseMean => {
                let n = values.len() as f64;
                MetricOutput::Scalar(values.iter().sum::<f64>() / n)
            }
            Reduction::Sum => MetricOutput::Scalar(values.iter().sum()),
            Reduction::None => MetricOutput::Vector(values),
        }
    }
}

/// Operation used to merge the outputs of several shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    Sum,
    #[default]
    Mean,
    Max,
    Min,
}

impl ReduceOp {
    /// NaN in any shard makes the combined value NaN, for every operation
    fn combine(self, values: &[f64]) -> f64 {
        if values.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }

        match self {
            ReduceOp::Sum => values.iter().sum(),
            ReduceOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
            ReduceOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ReduceOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    /// Elementwise reduction of outputs that share a shape. Curves have no
    /// elementwise meaning and are rejected.
    pub fn reduce(self, outputs: &[MetricOutput]) -> Result<MetricOutput> {
        let first = outputs
            .first()
            .ok_or_else(|| Error::EmptyData("no outputs to reduce".to_string()))?;

        match first {
            MetricOutput::Scalar(_) => {
                let values = outputs
                    .iter()
                    .map(|o| o.as_scalar().ok_or_else(|| shape_mismatch(first, o)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(MetricOutput::Scalar(self.combine(&values)))
            }
            MetricOutput::Vector(v) => {
                let vectors = outputs
                    .iter()
                    .map(|o| match o.as_vector() {
                        Some(x) if x.len() == v.len() => Ok(x),
                        _ => Err(shape_mismatch(first, o)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let reduced = (0..v.len())
                    .map(|i| {
                        let column: Vec<f64> = vectors.iter().map(|x| x[i]).collect();
                        self.combine(&column)
                    })
                    .collect();
                Ok(MetricOutput::Vector(reduced))
            }
            MetricOutput::Matrix(m) => {
                let matrices = outputs
                    .iter()
                    .map(|o| match o.as_matrix() {
                        Some(x)
                            if x.len() == m.len()
                                && x.iter().zip(m.iter()).all(|(a, b)| a.len() == b.len()) =>
                        {
                            Ok(x)
                        }
                        _ => Err(shape_mismatch(first, o)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let reduced = m
                    .iter()
                    .enumerate()
                    .map(|(r, row)| {
                        (0..row.len())
                            .map(|c| {
                                let cell: Vec<f64> = matrices.iter().map(|x| x[r][c]).collect();
                                self.combine(&cell)
                            })
                            .collect()
                    })
                    .collect();
                Ok(MetricOutput::Matrix(reduced))
            }
            other => Err(Error::InvalidInput(format!(
                "{} outputs cannot be reduced across shards",
                other.kind()
            ))),
        }
    }
}

fn shape_mismatch(expected: &MetricOutput, found: &MetricOutput) -> Error {
    Error::DimensionMismatch(format!(
        "shard outputs differ in shape: {} vs {}",
        expected.kind(),
        found.kind()
    ))
}

/// A named computation over predictions and targets
pub trait Metric: Send + Sync + fmt::Debug {
    /// Name the metric is exported under
    fn name(&self) -> &str;

    /// Compute the metric on one batch
    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput>;
}

impl<M: Metric + ?Sized> Metric for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        (**self).compute(input)
    }
}

fn compute_shards<M: Metric + ?Sized>(
    metric: &M,
    shards: &[MetricInput<'_>],
    reduce_op: ReduceOp,
) -> Result<MetricOutput> {
    if shards.is_empty() {
        return Err(Error::EmptyData(format!(
            "{}: no shards to compute",
            metric.name()
        )));
    }

    let outputs = shards
        .par_iter()
        .map(|shard| metric.compute(shard))
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "{}: reducing {} shard outputs with {:?}",
        metric.name(),
        outputs.len(),
        reduce_op
    );
    reduce_op.reduce(&outputs)
}

/// Metric whose shard results are merged with a [`ReduceOp`]
#[derive(Debug)]
pub struct TensorMetric {
    inner: Box<dyn Metric>,
    reduce_op: ReduceOp,
}

impl TensorMetric {
    pub fn new<M: Metric + 'static>(inner: M, reduce_op: ReduceOp) -> Self {
        TensorMetric {
            inner: Box::new(inner),
            reduce_op,
        }
    }

    pub fn reduce_op(&self) -> ReduceOp {
        self.reduce_op
    }

    pub fn inner(&self) -> &dyn Metric {
        self.inner.as_ref()
    }

    /// Compute every shard in parallel, then reduce
    pub fn compute_distributed(&self, shards: &[MetricInput<'_>]) -> Result<MetricOutput> {
        compute_shards(self.inner.as_ref(), shards, self.reduce_op)
    }
}

impl Metric for TensorMetric {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        self.inner.compute(input)
    }
}

/// Function over plain host slices: `(pred, target)`
pub type HostFn = dyn Fn(&[f64], &[f64]) -> Result<MetricOutput> + Send + Sync;

/// Metric backed by a function over plain slices
#[derive(Clone)]
pub struct NumpyMetric {
    name: String,
    func: Arc<HostFn>,
    reduce_op: ReduceOp,
}

impl NumpyMetric {
    pub fn new<F>(name: impl Into<String>, reduce_op: ReduceOp, func: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> Result<MetricOutput> + Send + Sync + 'static,
    {
        NumpyMetric {
            name: name.into(),
            func: Arc::new(func),
            reduce_op,
        }
    }

    pub fn reduce_op(&self) -> ReduceOp {
        self.reduce_op
    }

    pub fn compute_distributed(&self, shards: &[MetricInput<'_>]) -> Result<MetricOutput> {
        compute_shards(self, shards, self.reduce_op)
    }
}

impl fmt::Debug for NumpyMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumpyMetric")
            .field("name", &self.name)
            .field("reduce_op", &self.reduce_op)
            .finish()
    }
}

impl Metric for NumpyMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        (self.func)(input.pred(), input.target())
    }
}

/// Symbols this module provides to the registry
pub(crate) fn exports() -> Vec<(&'static str, Export)> {
    vec![
        ("Metric", Export::BaseType(BaseType::Metric)),
        ("TensorMetric", Export::BaseType(BaseType::TensorMetric)),
        ("NumpyMetric", Export::BaseType(BaseType::NumpyMetric)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Mean;

    impl Metric for Mean {
        fn name(&self) -> &str {
            "mean"
        }

        fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
            let n = input.num_samples() as f64;
            Ok(MetricOutput::Scalar(input.pred().iter().sum::<f64>() / n))
        }
    }

    #[test]
    fn test_input_shape_checks() {
        assert!(MetricInput::new(&[1.0, 2.0], &[1.0]).is_err());
        assert!(MetricInput::new(&[], &[]).is_err());
        assert!(MetricInput::probabilities(&[0.1, 0.9, 0.5], &[1.0, 0.0], 2).is_err());
        assert!(MetricInput::probabilities(&[0.1, 0.9], &[1.0], 0).is_err());

        let input = MetricInput::probabilities(&[0.1, 0.9, 0.7, 0.3], &[1.0, 0.0], 2).unwrap();
        assert_eq!(input.row(1), &[0.7, 0.3]);
        assert_eq!(input.pred_labels().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_labels_must_be_integers() {
        let input = MetricInput::new(&[0.5], &[1.0]).unwrap();
        assert!(input.pred_labels().is_err());
        assert_eq!(input.target_labels().unwrap(), vec![1]);
    }

    #[test]
    fn test_labels_above_class_limit() {
        for value in [1e30, 1e12, MAX_CLASSES as f64, f64::MAX] {
            assert!(matches!(to_label(value), Err(Error::InvalidValue(_))), "{}", value);
        }
        assert_eq!(to_label((MAX_CLASSES - 1) as f64).unwrap(), MAX_CLASSES - 1);

        assert_eq!(observed_classes(&[0, 3], &[1]).unwrap(), 4);
        assert_eq!(observed_classes(&[], &[]).unwrap(), 0);
        assert!(observed_classes(&[usize::MAX], &[0]).is_err());
        assert!(observed_classes(&[MAX_CLASSES], &[0]).is_err());
    }

    #[test]
    fn test_reduce_op_propagates_nan() {
        let outputs = vec![MetricOutput::Scalar(f64::NAN), MetricOutput::Scalar(1.0)];
        for op in [ReduceOp::Sum, ReduceOp::Mean, ReduceOp::Max, ReduceOp::Min] {
            let out = op.reduce(&outputs).unwrap();
            assert!(out.as_scalar().unwrap().is_nan(), "{:?}", op);
        }

        let vectors = vec![
            MetricOutput::Vector(vec![f64::NAN, 2.0]),
            MetricOutput::Vector(vec![0.5, 3.0]),
        ];
        let out = ReduceOp::Max.reduce(&vectors).unwrap();
        let values = out.as_vector().unwrap();
        assert!(values[0].is_nan());
        assert_eq!(values[1], 3.0);
    }

    #[test]
    fn test_nan_entries_survive_json() {
        let out = MetricOutput::Vector(vec![0.5, f64::NAN]);
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(json, r#"{"kind":"vector","value":[0.5,null]}"#);

        let back: MetricOutput = serde_json::from_str(&json).unwrap();
        let values = back.as_vector().unwrap();
        assert_eq!(values[0], 0.5);
        assert!(values[1].is_nan());

        let scalar: MetricOutput = serde_json::from_str(r#"{"kind":"scalar","value":null}"#).unwrap();
        assert!(scalar.as_scalar().unwrap().is_nan());

        let matrix: MetricOutput =
            serde_json::from_str(r#"{"kind":"matrix","value":[[1.0,null]]}"#).unwrap();
        assert!(matrix.as_matrix().unwrap()[0][1].is_nan());

        let roc = MetricOutput::Roc(RocCurve {
            fpr: vec![0.0, 1.0],
            tpr: vec![f64::NAN, f64::NAN],
            thresholds: vec![1.5, 0.5],
        });
        let back: MetricOutput = serde_json::from_str(&serde_json::to_string(&roc).unwrap()).unwrap();
        let MetricOutput::Roc(curve) = back else {
            panic!("expected a ROC curve");
        };
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert!(curve.tpr.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_reduction() {
        assert_eq!(
            Reduction::ElementwiseMean.apply(vec![1.0, 3.0]),
            MetricOutput::Scalar(2.0)
        );
        assert_eq!(Reduction::Sum.apply(vec![1.0, 3.0]), MetricOutput::Scalar(4.0));
        assert_eq!(
            Reduction::None.apply(vec![1.0, 3.0]),
            MetricOutput::Vector(vec![1.0, 3.0])
        );
    }

    #[test]
    fn test_reduce_op_elementwise() {
        let outputs = vec![
            MetricOutput::Vector(vec![1.0, 4.0]),
            MetricOutput::Vector(vec![3.0, 2.0]),
        ];
        assert_eq!(
            ReduceOp::Max.reduce(&outputs).unwrap(),
            MetricOutput::Vector(vec![3.0, 4.0])
        );
        assert_eq!(
            ReduceOp::Mean.reduce(&outputs).unwrap(),
            MetricOutput::Vector(vec![2.0, 3.0])
        );

        let mixed = vec![MetricOutput::Scalar(1.0), MetricOutput::Vector(vec![1.0])];
        assert!(ReduceOp::Sum.reduce(&mixed).is_err());
        assert!(ReduceOp::Sum.reduce(&[]).is_err());
    }

    #[test]
    fn test_tensor_metric_distributed() {
        let metric = TensorMetric::new(Mean, ReduceOp::Sum);
        let a = [1.0, 3.0];
        let b = [10.0, 20.0];
        let shards = vec![
            MetricInput::new(&a, &a).unwrap(),
            MetricInput::new(&b, &b).unwrap(),
        ];

        let out = metric.compute_distributed(&shards).unwrap();
        assert_eq!(out, MetricOutput::Scalar(17.0));
        assert_eq!(metric.name(), "mean");
        assert!(metric.compute_distributed(&[]).is_err());
    }

    #[test]
    fn test_numpy_metric_uses_slices() {
        let metric = NumpyMetric::new("count", ReduceOp::Sum, |pred, _target| {
            Ok(MetricOutput::Scalar(pred.len() as f64))
        });
        let x = [0.0, 1.0, 2.0];
        let input = MetricInput::new(&x, &x).unwrap();
        assert_eq!(metric.compute(&input).unwrap(), MetricOutput::Scalar(3.0));
        assert_eq!(
            metric.compute_distributed(&[input, input]).unwrap(),
            MetricOutput::Scalar(6.0)
        );
    }

    #[test]
    fn test_output_serializes_with_kind() {
        let json = serde_json::to_string(&MetricOutput::Scalar(0.5)).unwrap();
        assert_eq!(json, r#"{"kind":"scalar","value":0.5}"#);
    }
}
