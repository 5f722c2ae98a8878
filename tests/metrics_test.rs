//! Metrics built through the registry

use evalkit::metrics::{MetricOutput, ReduceOp, Reduction};
use evalkit::{Error, Metric, MetricInput, MetricRegistry, MetricsConfig, RegisteredMetric};

fn build(name: &str, config: &MetricsConfig) -> RegisteredMetric {
    MetricRegistry::new().unwrap().create(name, config).unwrap()
}

fn scalar(metric: &RegisteredMetric, pred: &[f64], target: &[f64]) -> f64 {
    let input = MetricInput::new(pred, target).unwrap();
    metric.compute(&input).unwrap().as_scalar().unwrap()
}

#[test]
fn test_regression_metrics_from_registry() {
    let config = MetricsConfig::default();
    let pred = [2.5, 0.0, 2.0, 8.0];
    let target = [3.0, -0.5, 2.0, 7.0];

    assert!((scalar(&build("MSE", &config), &pred, &target) - 0.375).abs() < 1e-12);
    assert!((scalar(&build("MAE", &config), &pred, &target) - 0.5).abs() < 1e-12);
    assert!((scalar(&build("RMSE", &config), &pred, &target) - 0.375f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_config_reduction_reaches_metric() {
    let config = MetricsConfig {
        reduction: Reduction::Sum,
        ..Default::default()
    };
    let mse = build("MSE", &config);
    assert!((scalar(&mse, &[1.0, 2.0], &[0.0, 0.0]) - 5.0).abs() < 1e-12);
}

#[test]
fn test_classification_metrics_from_registry() {
    let config = MetricsConfig::default();
    let pred = [0.0, 1.0, 1.0, 0.0];
    let target = [0.0, 1.0, 0.0, 0.0];

    assert!((scalar(&build("Accuracy", &config), &pred, &target) - 0.75).abs() < 1e-12);

    let input = MetricInput::new(&pred, &target).unwrap();
    let matrix = build("ConfusionMatrix", &config).compute(&input).unwrap();
    assert_eq!(
        matrix,
        MetricOutput::Matrix(vec![vec![2.0, 1.0], vec![0.0, 1.0]])
    );
}

#[test]
fn test_score_metrics_from_registry() {
    let config = MetricsConfig::default();
    let scores = [0.1, 0.4, 0.35, 0.8];
    let target = [0.0, 0.0, 1.0, 1.0];

    assert!((scalar(&build("AUROC", &config), &scores, &target) - 0.75).abs() < 1e-12);
    assert!(
        (scalar(&build("AveragePrecision", &config), &scores, &target) - 5.0 / 6.0).abs() < 1e-12
    );
}

#[test]
fn test_sklearn_metric_follows_config() {
    let config = MetricsConfig {
        sklearn_metric: "roc_auc_score".to_string(),
        ..Default::default()
    };
    let metric = build("SklearnMetric", &config);
    assert!(matches!(metric, RegisteredMetric::Numpy(_)));
    assert!((scalar(&metric, &[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]) - 0.75).abs() < 1e-12);

    let unknown = MetricsConfig {
        sklearn_metric: "log_loss".to_string(),
        ..Default::default()
    };
    let err = MetricRegistry::new()
        .unwrap()
        .create("SklearnMetric", &unknown)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownFunction(_)));
}

#[test]
fn test_distributed_mean_over_shards() {
    let config = MetricsConfig {
        reduce_op: ReduceOp::Mean,
        ..Default::default()
    };
    let mae = build("MAE", &config);
    assert_eq!(mae.reduce_op(), ReduceOp::Mean);

    let a_pred = [1.0, 2.0];
    let a_target = [0.0, 0.0];
    let b_pred = [4.0];
    let b_target = [0.0];
    let shards = [
        MetricInput::new(&a_pred, &a_target).unwrap(),
        MetricInput::new(&b_pred, &b_target).unwrap(),
    ];

    // shard means are 1.5 and 4.0
    let out = mae.compute_distributed(&shards).unwrap();
    assert_eq!(out, MetricOutput::Scalar(2.75));
}

#[test]
fn test_distributed_sum_of_confusion_matrices() {
    let config = MetricsConfig {
        reduce_op: ReduceOp::Sum,
        num_classes: Some(2),
        ..Default::default()
    };
    let metric = build("ConfusionMatrix", &config);

    let a = [0.0, 1.0];
    let b = [1.0, 1.0];
    let shards = [
        MetricInput::new(&a, &a).unwrap(),
        MetricInput::new(&b, &a).unwrap(),
    ];

    let out = metric.compute_distributed(&shards).unwrap();
    assert_eq!(
        out,
        MetricOutput::Matrix(vec![vec![1.0, 1.0], vec![0.0, 2.0]])
    );
}

#[test]
fn test_curves_cannot_be_reduced() {
    let metric = build("ROC", &MetricsConfig::default());
    let scores = [0.2, 0.9];
    let target = [0.0, 1.0];
    let shard = MetricInput::new(&scores, &target).unwrap();
    assert!(metric.compute_distributed(&[shard, shard]).is_err());
}

#[test]
fn test_multiclass_metrics_need_probabilities() {
    let config = MetricsConfig::default();
    let probs = [0.8, 0.2, 0.3, 0.7, 0.4, 0.6];
    let target = [0.0, 1.0, 0.0];

    let input = MetricInput::probabilities(&probs, &target, 2).unwrap();
    let out = build("MulticlassROC", &config).compute(&input).unwrap();
    assert!(matches!(out, MetricOutput::MulticlassRoc(ref curves) if curves.len() == 2));

    let dice = build("DiceCoefficient", &config).compute(&input).unwrap();
    // argmax [0, 1, 1]: class 1 has tp=1, fp=1, fn=0
    assert!((dice.as_scalar().unwrap() - 2.0 / 3.0).abs() < 1e-12);

    let flat = MetricInput::new(&target, &target).unwrap();
    assert!(build("MulticlassPrecisionRecall", &config)
        .compute(&flat)
        .is_err());
}

#[test]
fn test_output_json() {
    let metric = build("Recall", &MetricsConfig {
        reduction: Reduction::None,
        ..Default::default()
    });
    let pred = [0.0, 1.0];
    let target = [0.0, 0.0];
    let out = metric.compute(&MetricInput::new(&pred, &target).unwrap()).unwrap();

    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["kind"], "vector");
    assert_eq!(json["value"][0], 0.5);
}
