//! Metrics for evaluating regression models

use crate::config::MetricsConfig;
use crate::error::{check_lengths, Error, Result};
use crate::metrics::metric::{Metric, MetricInput, MetricOutput, Reduction, TensorMetric};
use crate::metrics::registry::{Export, RegisteredMetric};

/// Compute the squared error of every sample
fn squared_errors(y_true: &[f64], y_pred: &[f64]) -> Result<Vec<f64>> {
    check_lengths(y_pred.len(), y_true.len())?;

    Ok(y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&true_val, &pred_val)| {
            let error = true_val - pred_val;
            error * error
        })
        .collect())
}

/// Mean squared error
///
/// # Arguments
/// * `y_true` - true values
/// * `y_pred` - predicted values
///
/// # Returns
/// * `Result<f64>` - mean squared error
pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    let errors = squared_errors(y_true, y_pred)?;
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

/// Mean absolute error
///
/// # Arguments
/// * `y_true` - true values
/// * `y_pred` - predicted values
///
/// # Returns
/// * `Result<f64>` - mean absolute error
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_pred.len(), y_true.len())?;

    let sum_absolute_error = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&true_val, &pred_val)| (true_val - pred_val).abs())
        .sum::<f64>();

    Ok(sum_absolute_error / y_true.len() as f64)
}

/// Root mean squared error
pub fn root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    let mse = mean_squared_error(y_true, y_pred)?;
    Ok(mse.sqrt())
}

/// Root mean squared logarithmic error
///
/// Both inputs go through `ln(1 + x)` first, so values below -1 are rejected.
pub fn root_mean_squared_log_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    let (log_true, log_pred) = log1p_pair(y_true, y_pred)?;
    root_mean_squared_error(&log_true, &log_pred)
}

fn log1p_pair(y_true: &[f64], y_pred: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    check_lengths(y_pred.len(), y_true.len())?;

    if let Some(bad) = y_true.iter().chain(y_pred.iter()).find(|&&v| v <= -1.0) {
        return Err(Error::InvalidValue(format!(
            "RMSLE is undefined for values <= -1, got {}",
            bad
        )));
    }

    Ok((
        y_true.iter().map(|v| v.ln_1p()).collect(),
        y_pred.iter().map(|v| v.ln_1p()).collect(),
    ))
}

fn sqrt_output(output: MetricOutput) -> MetricOutput {
    match output {
        MetricOutput::Scalar(v) => MetricOutput::Scalar(v.sqrt()),
        MetricOutput::Vector(v) => MetricOutput::Vector(v.into_iter().map(f64::sqrt).collect()),
        other => other,
    }
}

/// Mean squared error between predictions and targets
#[derive(Debug, Clone, Copy, Default)]
pub struct Mse {
    pub reduction: Reduction,
}

impl Mse {
    pub fn new(reduction: Reduction) -> Self {
        Mse { reduction }
    }
}

impl Metric for Mse {
    fn name(&self) -> &str {
        "MSE"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        let errors = squared_errors(input.target(), input.pred())?;
        Ok(self.reduction.apply(errors))
    }
}

/// Root mean squared error
///
/// The square root is taken after the reduction, so with `Reduction::None`
/// this yields absolute errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse {
    pub reduction: Reduction,
}

impl Rmse {
    pub fn new(reduction: Reduction) -> Self {
        Rmse { reduction }
    }
}

impl Metric for Rmse {
    fn name(&self) -> &str {
        "RMSE"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        let errors = squared_errors(input.target(), input.pred())?;
        Ok(sqrt_output(self.reduction.apply(errors)))
    }
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae {
    pub reduction: Reduction,
}

impl Mae {
    pub fn new(reduction: Reduction) -> Self {
        Mae { reduction }
    }
}

impl Metric for Mae {
    fn name(&self) -> &str {
        "MAE"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        let errors = input
            .target()
            .iter()
            .zip(input.pred())
            .map(|(t, p)| (t - p).abs())
            .collect();
        Ok(self.reduction.apply(errors))
    }
}

/// Root mean squared logarithmic error
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmsle {
    pub reduction: Reduction,
}

impl Rmsle {
    pub fn new(reduction: Reduction) -> Self {
        Rmsle { reduction }
    }
}

impl Metric for Rmsle {
    fn name(&self) -> &str {
        "RMSLE"
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        input.require_flat(self.name())?;
        let (log_true, log_pred) = log1p_pair(input.target(), input.pred())?;
        let errors = squared_errors(&log_true, &log_pred)?;
        Ok(sqrt_output(self.reduction.apply(errors)))
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
        ("MSE", Export::Metric(|c| tensor(Mse::new(c.reduction), c))),
        ("RMSE", Export::Metric(|c| tensor(Rmse::new(c.reduction), c))),
        ("MAE", Export::Metric(|c| tensor(Mae::new(c.reduction), c))),
        ("RMSLE", Export::Metric(|c| tensor(Rmsle::new(c.reduction), c))),
    ]
}
