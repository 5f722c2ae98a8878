//! Builders that turn plain functions into metrics

use crate::error::Result;
use crate::metrics::metric::{Metric, MetricInput, MetricOutput, NumpyMetric, ReduceOp, TensorMetric};
use crate::metrics::registry::{Converter, Export};
use std::fmt;

type InputFn = dyn Fn(&MetricInput<'_>) -> Result<MetricOutput> + Send + Sync;

/// A metric defined by a closure over [`MetricInput`]
pub struct FnMetric {
    name: String,
    func: Box<InputFn>,
}

impl fmt::Debug for FnMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMetric").field("name", &self.name).finish()
    }
}

impl Metric for FnMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, input: &MetricInput<'_>) -> Result<MetricOutput> {
        (self.func)(input)
    }
}

/// Wrap a closure over metric inputs into a [`TensorMetric`]
pub fn tensor_metric<F>(name: impl Into<String>, reduce_op: ReduceOp, func: F) -> TensorMetric
where
    F: Fn(&MetricInput<'_>) -> Result<MetricOutput> + Send + Sync + 'static,
{
    TensorMetric::new(
        FnMetric {
            name: name.into(),
            func: Box::new(func),
        },
        reduce_op,
    )
}

/// Wrap a closure over plain slices into a [`NumpyMetric`]
pub fn numpy_metric<F>(name: impl Into<String>, reduce_op: ReduceOp, func: F) -> NumpyMetric
where
    F: Fn(&[f64], &[f64]) -> Result<MetricOutput> + Send + Sync + 'static,
{
    NumpyMetric::new(name, reduce_op, func)
}

/// Symbols this module provides to the registry
pub(crate) fn exports() -> Vec<(&'static str, Export)> {
    vec![
        ("numpy_metric", Export::Converter(Converter::NumpyMetric)),
        ("tensor_metric", Export::Converter(Converter::TensorMetric)),
    ]
}
