//! Named tensors exchanged with an inference engine.

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use std::collections::HashMap;

/// Tensors keyed by input/output name.
pub type TensorMap = HashMap<String, Tensor>;

/// A dense tensor of one of the dtypes the engine understands.
#[derive(Clone, Debug, PartialEq)]
pub enum Tensor {
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
}

impl Tensor {
    /// Build an `int64` tensor of shape `[1, ids.len()]`.
    pub fn int64_row(ids: &[i64]) -> Self {
        Tensor::Int64(Array1::from(ids.to_vec()).insert_axis(Axis(0)).into_dyn())
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Int64(a) => a.shape(),
            Tensor::Float32(a) => a.shape(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Tensor::Int64(_) => "int64",
            Tensor::Float32(_) => "float32",
        }
    }

    pub fn as_int64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Tensor::Int64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_float32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Tensor::Float32(a) => Some(a),
            _ => None,
        }
    }
}

/// Convenience for building a float tensor of an arbitrary shape.
pub fn float32(shape: &[usize], data: Vec<f32>) -> Option<Tensor> {
    ArrayD::from_shape_vec(IxDyn(shape), data).ok().map(Tensor::Float32)
}
