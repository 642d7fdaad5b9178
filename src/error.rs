//! OCR error type definitions

use thiserror::Error;

use crate::tensor::ElementType;

/// OCR error type
#[derive(Error, Debug)]
pub enum OcrError {
    /// ONNX Runtime error
    #[error("ONNX Runtime error: {0}")]
    OnnxError(#[from] ort::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid parameter error
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Model loading error
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    /// Preprocessing error
    #[error("Preprocessing error: {0}")]
    PreprocessError(String),

    /// Postprocessing error
    #[error("Postprocessing error: {0}")]
    PostprocessError(String),

    /// The inference call of a pipeline stage failed
    #[error("{stage} inference failed: {source}")]
    InferenceError {
        stage: &'static str,
        #[source]
        source: Box<OcrError>,
    },

    /// An expected output tensor was not produced by the model
    #[error("Model output '{0}' not found")]
    MissingOutput(String),

    /// Tensor buffer does not match its declared or expected shape
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// Tensor element type differs from the one requested
    #[error("Element type mismatch: expected {expected}, got {got}")]
    DtypeMismatch {
        expected: ElementType,
        got: ElementType,
    },

    /// Not initialized error
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Charset parsing error
    #[error("Charset parsing error: {0}")]
    CharsetError(String),
}

impl OcrError {
    /// Wrap an adapter failure with the name of the stage that issued the call
    pub fn inference(stage: &'static str, source: OcrError) -> Self {
        OcrError::InferenceError {
            stage,
            source: Box::new(source),
        }
    }
}

/// OCR result type alias
pub type OcrResult<T> = std::result::Result<T, OcrError>;
