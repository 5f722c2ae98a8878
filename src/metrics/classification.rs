//! Metrics for evaluating classification models
//!
//! Label based metrics take one class index per sample, or a probability
//! matrix that is reduced to its row-wise argmax. Score based metrics (the
//! curves and the areas under them) take one score per sample and compare the
//! targets against a positive label.

use crate::config::MetricsConfig;
use crate::error::{check_lengths, Error, Result};
use crate::metrics::metric::{
    observed_classes, Metric, MetricInput, MetricOutput, PrCurve, Reduction, RocCurve,
    TensorMetric, MAX_CLASSES,
};
use crate::metrics::registry::{Export, RegisteredMetric};
use rayon::prelude::*;

/// Per-class counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatScores {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
    pub support: usize,
}

/// Count true/false positives and negatives of every class
///
/// Every label must be below `num_classes`.
pub fn stat_scores(pred: &[usize], target: &[usize], num_classes: usize) -> Vec<StatScores> {
    let mut stats = vec![StatScores::default(); num_classes];

    for (&p, &t) in pred.iter().zip(target.iter()) {
        if p == t {
            stats[t].tp += 1;
        } else {
            stats[p].fp += 1;
            stats[t].fn_ += 1;
        }
        stats[t].support += 1;
    }

    let total = pred.len();
    for s in stats.iter_mut() {
        s.tn = total - s.tp - s.fp - s.fn_;
    }
    stats
}

/// Confusion matrix with targets on the rows and predictions on the columns
pub fn confusion_matrix(pred: &[usize], target: &[usize], num_classes: usize) -> Vec<Vec<f64>> {
    let mut matrix = vec![vec![0.0; num_classes]; num_classes];
    for (&p, &t) in pred.iter().zip(target.iter()) {
        matrix[t][p] += 1.0;
    }
    matrix
}

fn divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn resolve_num_classes(pred: &[usize], target: &[usize], num_classes: Option<usize>) -> Result<usize> {
    let observed = observed_classes(pred, target)?;

    match num_classes {
        Some(n) if n > MAX_CLASSES => Err(Error::InvalidValue(format!(
            "{} classes exceeds the limit of {}",
            n, MAX_CLASSES
        ))),
        Some(n) if n < observed => Err(Error::InvalidValue(format!(
            "label {} is out of range for {} classes",
            observed - 1,
            n
        ))),
        Some(n) => Ok(n),
        None => Ok(observed),
    }
}

/// Hard labels of both sides plus the number of classes
fn labels(input: &MetricInput<'_>, num_classes: Option<usize>) -> Result<(Vec<usize>, Vec<usize>, usize)> {
    let pred = input.pred_labels()?;
    let target = input.target_labels()?;

    let declared = match num_classes {
        Some(n) => Some(n),
        None if input.is_probabilities() => Some(input.num_columns()),
        None => None,
    };
    let n = resolve_num_classes(&pred, &target, declared)?;
    Ok((pred, target, n))
}

/// Positive mask of the targets for score based metrics
fn positives(input: &MetricInput<'_>, metric: &str, pos_label: usize) -> Result<Vec<bool>> {
    input.require_flat(metric)?;
    Ok(input
        .target_labels()?
        .into_iter()
        .map(|t| t == pos_label)
        .collect())
}

struct ClfCurve {
    fps: Vec<f64>,
    tps: Vec<f64>,
    thresholds: Vec<f64>,
}

/// Cumulative false/true positive counts at every distinct score, highest
/// score first
fn binary_clf_curve(scores: &[f64], positive: &[bool]) -> Result<ClfCurve> {
    check_lengths(scores.len(), positive.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(Error::InvalidValue("scores must not contain NaN".to_string()));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = ClfCurve {
        fps: Vec::new(),
        tps: Vec::new(),
        thresholds: Vec::new(),
    };
    let (mut tp, mut fp) = (0.0, 0.0);

    for (k, &i) in order.iter().enumerate() {
        if positive[i] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }

        let boundary = k + 1 == order.len() || scores[order[k + 1]] != scores[i];
        if boundary {
            curve.tps.push(tp);
            curve.fps.push(fp);
            curve.thresholds.push(scores[i]);
        }
    }

    Ok(curve)
}

/// ROC curve of binary scores
///
/// Starts at `(0, 0)` with a threshold one above the highest score. Without
/// negative (or positive) samples the false (or true) positive rate is NaN.
pub fn roc_curve(scores: &[f64], positive: &[bool]) -> Result<RocCurve> {
    let curve = binary_clf_curve(scores, positive)?;

    let mut fps = vec![0.0];
    fps.extend(curve.fps);
    let mut tps = vec![0.0];
    tps.extend(curve.tps);
    let mut thresholds = vec![curve.thresholds[0] + 1.0];
    thresholds.extend(curve.thresholds);

    let fp_total = fps[fps.len() - 1];
    let tp_total = tps[tps.len() - 1];
    if fp_total == 0.0 {
        log::warn!("no negative samples, false positive rate is undefined");
    }
    if tp_total == 0.0 {
        log::warn!("no positive samples, true positive rate is undefined");
    }

    Ok(RocCurve {
        fpr: fps.iter().map(|&f| f / fp_total).collect(),
        tpr: tps.iter().map(|&t| t / tp_total).collect(),
        thresholds,
    })
}

/// Precision-recall curve of binary scores
///
/// Thresholds ascend; the curve is cut where full recall is first reached and
/// closes with `precision = 1, recall = 0`.
pub fn precision_recall_curve(scores: &[f64], positive: &[bool]) -> Result<PrCurve> {
    let curve = binary_clf_curve(scores, positive)?;

    let tp_total = curve.tps[curve.tps.len() - 1];
    if tp_total == 0.0 {
        log::warn!("no positive samples, recall is undefined");
    }

    let last = curve
        .tps
        .iter()
        .position(|&t| t == tp_total)
        .unwrap_or(curve.tps.len() - 1);

    let mut precision: Vec<f64> = (0..=last)
        .rev()
        .map(|k| curve.tps[k] / (curve.tps[k] + curve.fps[k]))
        .collect();
    let mut recall: Vec<f64> = (0..=last).rev().map(|k| curve.tps[k] / tp_total).collect();
    let thresholds = (0..=last).rev().map(|k| curve.thresholds[k]).collect();

    precision.push(1.0);
    recall.push(0.0);

    Ok(PrCurve {
        precision,
        recall,
        thresholds,
    })
}

/// Area under a curve with the trapezoidal rule
///
/// `x` must be monotonic unless `reorder` is set, in which case the points are
/// sorted by `x` first. Decreasing `x` yields a positive area.
pub fn auc(x: &[f64], y: &[f64], reorder: bool) -> Result<f64> {
    check_lengths(x.len(), y.len())?;
    if x.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "at least 2 points are needed to compute an area, got {}",
            x.len()
        )));
    }

    let (x, y): (Vec<f64>, Vec<f64>) = if reorder {
        let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points.into_iter().unzip()
    } else {
        (x.to_vec(), y.to_vec())
    };

    let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let direction = if dx.iter().any(|&d| d < 0.0) {
        if dx.iter().all(|&d| d <= 0.0) {
            -1.0
        } else {
            return Err(Error::InvalidValue(
                "x is neither increasing nor decreasing".to_string(),
            ));
        }
    } else {
        1.0
    };

    let area: f64 = dx
        .iter()
        .zip(y.windows(2))
        .map(|(d, w)| d * (w[0] + w[1]) / 2.0)
        .sum();

    Ok(direction * area)
}

/// Average precision from a precision-recall curve
pub fn average_precision(curve: &PrCurve) -> f64 {
    curve
        .recall
        .windows(2)
        .zip(curve.precision.iter())
        .map(|(r, p)| (r[0] - r[1]) * p)
        .sum()
}

/// Fraction of correct predictions
///
/// `Reduction::ElementwiseMean` gives the overall accuracy, `Sum` the number
/// of correct predictions and `None` the accuracy of every class.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy {
    pub num_classes: Option<usize>,
    pub reduction: Reduction,
}

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "Accuracy"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let correct = pred.iter().zip(target.iter()).filter(|(p, t)| p == t).count() as f64;

        Ok(match self.reduction {
            Reduction::ElementwiseMean => MetricOutput::Scalar(correct / target.len() as f64),
            Reduction::Sum => MetricOutput::Scalar(correct),
            Reduction::None => MetricOutput::Vector(
                stat_scores(&pred, &target, n)
                    .iter()
                    .map(|s| divide(s.tp as f64, s.support as f64))
                    .collect(),
            ),
        })
    }
}

/// Precision of every class, reduced over classes
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision {
    pub num_classes: Option<usize>,
    pub reduction: Reduction,
}

impl Metric for Precision {
    fn name(&self) -> &str {
        "Precision"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let values = stat_scores(&pred, &target, n)
            .iter()
            .map(|s| divide(s.tp as f64, (s.tp + s.fp) as f64))
            .collect();
        Ok(self.reduction.apply(values))
    }
}

/// Recall of every class, reduced over classes
#[derive(Debug, Clone, Copy, Default)]
pub struct Recall {
    pub num_classes: Option<usize>,
    pub reduction: Reduction,
}

impl Metric for Recall {
    fn name(&self) -> &str {
        "Recall"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let values = stat_scores(&pred, &target, n)
            .iter()
            .map(|s| divide(s.tp as f64, s.support as f64))
            .collect();
        Ok(self.reduction.apply(values))
    }
}

fn fbeta_values(stats: &[StatScores], beta: f64) -> Vec<f64> {
    let beta2 = beta * beta;
    stats
        .iter()
        .map(|s| {
            let precision = divide(s.tp as f64, (s.tp + s.fp) as f64);
            let recall = divide(s.tp as f64, s.support as f64);
            divide(
                (1.0 + beta2) * precision * recall,
                beta2 * precision + recall,
            )
        })
        .collect()
}

/// F-beta score of every class, reduced over classes
#[derive(Debug, Clone, Copy)]
pub struct FBeta {
    pub beta: f64,
    pub num_classes: Option<usize>,
    pub reduction: Reduction,
}

impl FBeta {
    pub fn new(beta: f64) -> Result<Self> {
        if !(beta > 0.0) {
            return Err(Error::InvalidValue(format!("beta must be positive, got {}", beta)));
        }
        Ok(FBeta {
            beta,
            num_classes: None,
            reduction: Reduction::default(),
        })
    }
}

impl Metric for FBeta {
    fn name(&self) -> &str {
        "FBeta"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let stats = stat_scores(&pred, &target, n);
        Ok(self.reduction.apply(fbeta_values(&stats, self.beta)))
    }
}

/// F1 score of every class, reduced over classes
#[derive(Debug, Clone, Copy, Default)]
pub struct F1 {
    pub num_classes: Option<usize>,
    pub reduction: Reduction,
}

impl Metric for F1 {
    fn name(&self) -> &str {
        "F1"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let stats = stat_scores(&pred, &target, n);
        Ok(self.reduction.apply(fbeta_values(&stats, 1.0)))
    }
}

/// Confusion matrix, optionally normalized so every row sums to one
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfusionMatrix {
    pub num_classes: Option<usize>,
    pub normalize: bool,
}

impl Metric for ConfusionMatrix {
    fn name(&self) -> &str {
        "ConfusionMatrix"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let mut matrix = confusion_matrix(&pred, &target, n);

        if self.normalize {
            for row in matrix.iter_mut() {
                let total: f64 = row.iter().sum();
                for cell in row.iter_mut() {
                    *cell = divide(*cell, total);
                }
            }
        }

        Ok(MetricOutput::Matrix(matrix))
    }
}

/// Intersection over union of every class
///
/// Classes absent from both predictions and targets score NaN and are left
/// out of the mean and the sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iou {
    pub num_classes: Option<usize>,
    pub remove_bg: bool,
    pub reduction: Reduction,
}

impl Metric for Iou {
    fn name(&self) -> &str {
        "IoU"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (pred, target, n) = labels(input, self.num_classes)?;
        let skip = usize::from(self.remove_bg);

        let values: Vec<f64> = stat_scores(&pred, &target, n)
            .iter()
            .skip(skip)
            .map(|s| {
                let union = s.tp + s.fp + s.fn_;
                if union == 0 {
                    f64::NAN
                } else {
                    s.tp as f64 / union as f64
                }
            })
            .collect();

        if values.is_empty() {
            return Err(Error::InvalidInput("no classes left to score".to_string()));
        }

        Ok(match self.reduction {
            Reduction::None => MetricOutput::Vector(values),
            reduction => reduction.apply(values.into_iter().filter(|v| !v.is_nan()).collect()),
        })
    }
}

/// Dice coefficient of every class on a probability matrix
#[derive(Debug, Clone, Copy)]
pub struct DiceCoefficient {
    pub include_background: bool,
    /// Score used when a class has a zero denominator
    pub nan_score: f64,
    /// Score used when a class never occurs in the targets
    pub no_fg_score: f64,
    pub reduction: Reduction,
}

impl Default for DiceCoefficient {
    fn default() -> Self {
        DiceCoefficient {
            include_background: false,
            nan_score: 0.0,
            no_fg_score: 0.0,
            reduction: Reduction::default(),
        }
    }
}

impl Metric for DiceCoefficient {
    fn name(&self) -> &str {
        "DiceCoefficient"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_probabilities(self.name())?;
        let (pred, target, n) = labels(input, None)?;
        let skip = usize::from(!self.include_background);

        let values: Vec<f64> = stat_scores(&pred, &target, n)
            .iter()
            .skip(skip)
            .map(|s| {
                if s.support == 0 {
                    return self.no_fg_score;
                }
                let denominator = (2 * s.tp + s.fp + s.fn_) as f64;
                if denominator == 0.0 {
                    self.nan_score
                } else {
                    2.0 * s.tp as f64 / denominator
                }
            })
            .collect();

        if values.is_empty() {
            return Err(Error::InvalidInput(
                "dice needs at least one foreground class".to_string(),
            ));
        }

        Ok(self.reduction.apply(values))
    }
}

/// ROC curve of binary scores
#[derive(Debug, Clone, Copy)]
pub struct Roc {
    pub pos_label: usize,
}

impl Default for Roc {
    fn default() -> Self {
        Roc { pos_label: 1 }
    }
}

impl Metric for Roc {
    fn name(&self) -> &str {
        "ROC"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let positive = positives(input, self.name(), self.pos_label)?;
        Ok(MetricOutput::Roc(roc_curve(input.pred(), &positive)?))
    }
}

/// Area under the ROC curve
#[derive(Debug, Clone, Copy)]
pub struct Auroc {
    pub pos_label: usize,
}

impl Default for Auroc {
    fn default() -> Self {
        Auroc { pos_label: 1 }
    }
}

impl Metric for Auroc {
    fn name(&self) -> &str {
        "AUROC"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let positive = positives(input, self.name(), self.pos_label)?;
        let roc = roc_curve(input.pred(), &positive)?;
        Ok(MetricOutput::Scalar(auc(&roc.fpr, &roc.tpr, false)?))
    }
}

/// Precision-recall curve of binary scores
#[derive(Debug, Clone, Copy)]
pub struct PrecisionRecall {
    pub pos_label: usize,
}

impl Default for PrecisionRecall {
    fn default() -> Self {
        PrecisionRecall { pos_label: 1 }
    }
}

impl Metric for PrecisionRecall {
    fn name(&self) -> &str {
        "PrecisionRecall"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let positive = positives(input, self.name(), self.pos_label)?;
        Ok(MetricOutput::PrecisionRecall(precision_recall_curve(
            input.pred(),
            &positive,
        )?))
    }
}

/// Average precision of binary scores
#[derive(Debug, Clone, Copy)]
pub struct AveragePrecision {
    pub pos_label: usize,
}

impl Default for AveragePrecision {
    fn default() -> Self {
        AveragePrecision { pos_label: 1 }
    }
}

impl Metric for AveragePrecision {
    fn name(&self) -> &str {
        "AveragePrecision"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let positive = positives(input, self.name(), self.pos_label)?;
        let curve = precision_recall_curve(input.pred(), &positive)?;
        Ok(MetricOutput::Scalar(average_precision(&curve)))
    }
}

/// Column of class `class` plus the one-vs-rest positive mask
fn one_vs_rest(input: &MetricInput<'_>, target: &[usize], class: usize) -> (Vec<f64>, Vec<bool>) {
    let scores = (0..input.num_samples()).map(|i| input.row(i)[class]).collect();
    let positive = target.iter().map(|&t| t == class).collect();
    (scores, positive)
}

fn multiclass_setup(input: &MetricInput<'_>, metric: &str, num_classes: Option<usize>) -> Result<(Vec<usize>, usize)> {
    input.require_probabilities(metric)?;
    let n = input.num_columns();
    if let Some(declared) = num_classes {
        if declared != n {
            return Err(Error::DimensionMismatch(format!(
                "{} configured for {} classes, predictions have {}",
                metric, declared, n
            )));
        }
    }
    Ok((input.target_labels()?, n))
}

/// One-vs-rest ROC curve of every class
#[derive(Debug, Clone, Copy, Default)]
pub struct MulticlassRoc {
    pub num_classes: Option<usize>,
}

impl Metric for MulticlassRoc {
    fn name(&self) -> &str {
        "MulticlassROC"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (target, n) = multiclass_setup(input, self.name(), self.num_classes)?;
        let curves = (0..n)
            .into_par_iter()
            .map(|class| {
                let (scores, positive) = one_vs_rest(input, &target, class);
                roc_curve(&scores, &positive)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricOutput::MulticlassRoc(curves))
    }
}

/// One-vs-rest precision-recall curve of every class
#[derive(Debug, Clone, Copy, Default)]
pub struct MulticlassPrecisionRecall {
    pub num_classes: Option<usize>,
}

impl Metric for MulticlassPrecisionRecall {
    fn name(&self) -> &str {
        "MulticlassPrecisionRecall"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        let (target, n) = multiclass_setup(input, self.name(), self.num_classes)?;
        let curves = (0..n)
            .into_par_iter()
            .map(|class| {
                let (scores, positive) = one_vs_rest(input, &target, class);
                precision_recall_curve(&scores, &positive)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricOutput::MulticlassPrecisionRecall(curves))
    }
}

fn tensor<M: Metric + 'static>(metric: M, config: &MetricsConfig) -> Result<RegisteredMetric> {
    Ok(RegisteredMetric::Tensor(TensorMetric::new(
        metric,
        config.reduce_op,
    )))
}

/// Symbols this module provides to the registry
pub(crate) fn exports() -> Vec<(&'static str, Export)> {
    vec![
        (
            "Accuracy",
            Export::Metric(|c| {
                tensor(
                    Accuracy {
                        num_classes: c.num_classes,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
        (
            "AveragePrecision",
            Export::Metric(|c| tensor(AveragePrecision { pos_label: c.pos_label }, c)),
        ),
        (
            "ConfusionMatrix",
            Export::Metric(|c| {
                tensor(
                    ConfusionMatrix {
                        num_classes: c.num_classes,
                        normalize: c.normalize,
                    },
                    c,
                )
            }),
        ),
        (
            "F1",
            Export::Metric(|c| {
                tensor(
                    F1 {
                        num_classes: c.num_classes,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
        (
            "FBeta",
            Export::Metric(|c| {
                let mut metric = FBeta::new(c.beta)?;
                metric.num_classes = c.num_classes;
                metric.reduction = c.reduction;
                tensor(metric, c)
            }),
        ),
        (
            "Recall",
            Export::Metric(|c| {
                tensor(
                    Recall {
                        num_classes: c.num_classes,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
        ("ROC", Export::Metric(|c| tensor(Roc { pos_label: c.pos_label }, c))),
        ("AUROC", Export::Metric(|c| tensor(Auroc { pos_label: c.pos_label }, c))),
        (
            "DiceCoefficient",
            Export::Metric(|c| {
                tensor(
                    DiceCoefficient {
                        include_background: c.include_background,
                        nan_score: c.nan_score,
                        no_fg_score: c.no_fg_score,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
        (
            "MulticlassPrecisionRecall",
            Export::Metric(|c| {
                tensor(
                    MulticlassPrecisionRecall {
                        num_classes: c.num_classes,
                    },
                    c,
                )
            }),
        ),
        (
            "MulticlassROC",
            Export::Metric(|c| {
                tensor(
                    MulticlassRoc {
                        num_classes: c.num_classes,
                    },
                    c,
                )
            }),
        ),
        (
            "Precision",
            Export::Metric(|c| {
                tensor(
                    Precision {
                        num_classes: c.num_classes,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
        (
            "PrecisionRecall",
            Export::Metric(|c| tensor(PrecisionRecall { pos_label: c.pos_label }, c)),
        ),
        (
            "IoU",
            Export::Metric(|c| {
                tensor(
                    Iou {
                        num_classes: c.num_classes,
                        remove_bg: c.remove_bg,
                        reduction: c.reduction,
                    },
                    c,
                )
            }),
        ),
    ]
}
