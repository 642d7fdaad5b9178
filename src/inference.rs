//! Inference adapter seam
//!
//! The pipelines never talk to a runtime directly. They hand named input
//! tensors to an [`Inference`] implementation and read named output tensors
//! back. [`crate::onnx::InferenceEngine`] is the ONNX Runtime implementation;
//! any `Fn(TensorMap) -> OcrResult<TensorMap>` closure works as well, which is
//! how fixed model outputs are injected in tests.

use crate::error::OcrResult;
use crate::tensor::TensorMap;

/// Synchronous model invocation: named tensors in, named tensors out
pub trait Inference: Send + Sync {
    /// Run the model once
    fn run(&self, inputs: TensorMap) -> OcrResult<TensorMap>;
}

impl<F> Inference for F
where
    F: Fn(TensorMap) -> OcrResult<TensorMap> + Send + Sync,
{
    fn run(&self, inputs: TensorMap) -> OcrResult<TensorMap> {
        self(inputs)
    }
}
