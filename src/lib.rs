//! # dddd-ocr
//!
//! Captcha recognition and text-region detection with ddddocr ONNX models, using
//! ONNX Runtime for inference.
//!
//! ## Quick Start
//!
//! ### Simple Usage - Using High-Level API (Recommended)
//!
//! ```ignore
//! use dddd_ocr::{OcrEngine, OcrEngineConfig, RecVariant};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrEngineConfig::new()
//!         .with_model_path("models/common.onnx")
//!         .with_dict_path("models/charsets.txt")
//!         .with_det_model_path("models/common_det.onnx")
//!         .with_variant(RecVariant::Official);
//!     let engine = OcrEngine::new(config)?;
//!
//!     let captcha = image::open("captcha.png")?;
//!     println!("Text: {}", engine.classification(&captcha)?);
//!
//!     let clicks = image::open("click.jpg")?;
//!     for b in engine.detect(&clicks)? {
//!         println!("({:.0}, {:.0}) - ({:.0}, {:.0}) score {:.2}", b.x1, b.y1, b.x2, b.y2, b.score);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Advanced Usage - Custom Inference
//!
//! Models talk to the runtime through the [`Inference`] trait, which closures
//! also implement. This is how precomputed outputs are fed to the decoders:
//!
//! ```ignore
//! use std::sync::Arc;
//! use dddd_ocr::{Dictionary, OcrResult, RecModel, RecVariant, Tensor, TensorMap};
//!
//! let engine = |_inputs: TensorMap| -> OcrResult<TensorMap> {
//!     let mut outputs = TensorMap::new();
//!     outputs.insert("output".to_string(), Tensor::from_i64(&[4], vec![0, 1, 1, 2])?);
//!     Ok(outputs)
//! };
//! let rec = RecModel::with_engine(engine, Arc::new(Dictionary::from_symbols(["a", "b"])), RecVariant::Custom);
//! assert_eq!(rec.recognize(&image::DynamicImage::new_rgb8(64, 64))?, "ab");
//! ```
//!
//! ## Module Structure
//!
//! - [`tensor`]: Shaped tensor buffers exchanged with the models
//! - [`inference`]: The [`Inference`] trait between pipelines and runtimes
//! - [`onnx`]: ONNX Runtime inference engine ([`InferenceEngine`])
//! - [`dict`]: Recognition dictionary ([`Dictionary`]) with the CTC blank at index 0
//! - [`rec`]: Captcha recognition ([`RecModel`]) and CTC decoding
//! - [`det`]: Text region detection ([`DetModel`]) and anchor grid decoding
//! - [`engine`]: High-level engine ([`OcrEngine`])
//! - [`preprocess`]: Image encoding for recognition and detection
//! - [`postprocess`]: Bounding boxes, NMS and box drawing
//! - [`error`]: Error types [`OcrError`]
//!
//! ## API Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        OcrEngine (High-Level API)       │
//! │  classification / detection in one call │
//! ├─────────────────────────────────────────┤
//! │     RecModel      │      DetModel       │
//! │  CTC recognition  │  anchor detection   │
//! ├─────────────────────────────────────────┤
//! │   Inference trait (InferenceEngine)     │
//! │        ONNX Runtime session             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Supported Models
//!
//! - **Official**: ddddocr `common.onnx` / `common_old.onnx`, logit output `387`
//! - **Custom**: models trained with dddd_trainer, index output `output`
//! - **Detection**: ddddocr `common_det.onnx`, 416x416 input

// Core modules
pub mod det;
pub mod dict;
pub mod engine;
pub mod error;
pub mod inference;
pub mod onnx;
pub mod postprocess;
pub mod preprocess;
pub mod rec;
pub mod tensor;

// Re-export commonly used types
pub use det::{DetModel, DetOptions, GridCell, GridTable};
pub use dict::Dictionary;
pub use engine::{detect_file, ocr_file, OcrEngine, OcrEngineBuilder, OcrEngineConfig};
pub use error::{OcrError, OcrResult};
pub use inference::Inference;
pub use onnx::{Backend, InferenceConfig, InferenceEngine, OptimizationLevel};
pub use postprocess::{draw_boxes, nms, DetBox};
pub use preprocess::NormalizeParams;
pub use rec::{RecModel, RecOptions, RecProfile, RecVariant};
pub use tensor::{ElementType, Tensor, TensorMap};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
