//! Inference engine seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::tensor::{Tensor, TensorMap};

/// One forward pass over named tensors.
///
/// Implementations must be safe to call from several tasks at once; every
/// call gets its own input map and returns a fresh output map.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn run(&self, inputs: TensorMap) -> Result<TensorMap, EngineError>;
}

/// Names of the tensors exchanged with the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoNames {
    pub source: String,
    pub target: String,
    pub output: String,
}

impl Default for IoNames {
    fn default() -> Self {
        Self {
            source: "source".to_string(),
            target: "target".to_string(),
            output: "output".to_string(),
        }
    }
}

/// Remove `name` from `inputs`, failing if it is absent.
pub fn take_input(inputs: &mut TensorMap, name: &str) -> Result<Tensor, EngineError> {
    inputs
        .remove(name)
        .ok_or_else(|| EngineError::MissingInput(name.to_string()))
}
