//! Evaluation metrics for model training
//!
//! Regression and classification metrics, the reference-library backed
//! metrics, and the registry that ties their exported names together.

pub mod classification;
pub mod converters;
pub mod manifest;
pub mod metric;
pub mod registry;
pub mod regression;
pub mod sklearns;

pub use classification::{
    Accuracy, AveragePrecision, Auroc, ConfusionMatrix, DiceCoefficient, FBeta, Iou,
    MulticlassPrecisionRecall, MulticlassRoc, Precision, PrecisionRecall, Recall, Roc, F1,
};
pub use converters::{numpy_metric, tensor_metric};
pub use manifest::{Manifest, CLASSIFICATION_METRICS, EXTRA_EXPORT, REGRESSION_METRICS};
pub use metric::{
    Metric, MetricInput, MetricOutput, NumpyMetric, PrCurve, ReduceOp, Reduction, RocCurve,
    TensorMetric, MAX_CLASSES,
};
pub use registry::{registry, Export, MetricRegistry, RegisteredMetric};
pub use regression::{Mae, Mse, Rmse, Rmsle};
pub use sklearns::{Auc, PrecisionRecallCurve, SklearnMetric};
