//! OCR Engine
//!
//! Owns the optional recognition and detection pipelines and exposes the
//! captcha classification and text-region detection entry points

use image::DynamicImage;
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::det::{DetModel, DetOptions};
use crate::error::{OcrError, OcrResult};
use crate::onnx::{Backend, InferenceConfig, OptimizationLevel};
use crate::postprocess::DetBox;
use crate::rec::{RecModel, RecOptions, RecVariant};

/// OCR engine configuration
#[derive(Debug, Clone)]
pub struct OcrEngineConfig {
    /// Recognition model path
    pub model_path: Option<PathBuf>,
    /// Detection model path
    pub det_model_path: Option<PathBuf>,
    /// Recognition dictionary path
    pub dict_path: Option<PathBuf>,
    /// Recognition model family
    pub variant: RecVariant,
    /// Inference backend
    pub backend: Backend,
    /// Thread count
    pub thread_count: usize,
    /// Graph optimization level
    pub optimization_level: OptimizationLevel,
    /// Detection options
    pub det_options: DetOptions,
    /// Recognition options
    pub rec_options: RecOptions,
    /// Whether batch classification runs images in parallel with rayon
    pub enable_parallel: bool,
    /// ONNX Runtime shared library, see [`InferenceConfig::dylib_path`]
    pub ort_dylib_path: Option<PathBuf>,
}

impl Default for OcrEngineConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            det_model_path: None,
            dict_path: None,
            variant: RecVariant::default(),
            backend: Backend::CPU,
            thread_count: 4,
            optimization_level: OptimizationLevel::All,
            det_options: DetOptions::default(),
            rec_options: RecOptions::default(),
            enable_parallel: true,
            ort_dylib_path: None,
        }
    }
}

impl OcrEngineConfig {
    /// Create new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set recognition model path
    pub fn with_model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set detection model path
    pub fn with_det_model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.det_model_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set dictionary path
    pub fn with_dict_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dict_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set recognition model family
    pub fn with_variant(mut self, variant: RecVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set inference backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    /// Set graph optimization level
    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    /// Set detection options
    pub fn with_det_options(mut self, options: DetOptions) -> Self {
        self.det_options = options;
        self
    }

    /// Set recognition options
    pub fn with_rec_options(mut self, options: RecOptions) -> Self {
        self.rec_options = options;
        self
    }

    /// Enable/disable parallel batch classification
    ///
    /// Note: every call still goes through the same inference session, so
    /// parallelism mostly overlaps preprocessing and decoding.
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.enable_parallel = enable;
        self
    }

    /// Set the ONNX Runtime shared library path
    pub fn with_ort_dylib_path(mut self, path: impl AsRef<Path>) -> Self {
        self.ort_dylib_path = Some(path.as_ref().to_path_buf());
        self
    }

    fn to_inference_config(&self) -> InferenceConfig {
        let config = InferenceConfig::new()
            .with_threads(self.thread_count)
            .with_optimization_level(self.optimization_level)
            .with_backend(self.backend);
        match &self.ort_dylib_path {
            Some(path) => config.with_dylib_path(path),
            None => config,
        }
    }
}

/// OCR engine
///
/// Holds a recognition pipeline, a detection pipeline, or both
///
/// # Example
///
/// ```ignore
/// use dddd_ocr::{OcrEngine, OcrEngineConfig, RecVariant};
///
/// let config = OcrEngineConfig::new()
///     .with_model_path("models/common.onnx")
///     .with_dict_path("models/charsets.txt")
///     .with_variant(RecVariant::Official);
/// let engine = OcrEngine::new(config)?;
///
/// let image = image::open("captcha.png")?;
/// println!("{}", engine.classification(&image)?);
/// ```
pub struct OcrEngine {
    rec_model: Option<RecModel>,
    det_model: Option<DetModel>,
    config: OcrEngineConfig,
}

impl OcrEngine {
    /// Create OCR engine, loading every pipeline the configuration names
    ///
    /// Recognition needs both `model_path` and `dict_path`; detection needs
    /// `det_model_path`. Any load failure fails construction.
    pub fn new(config: OcrEngineConfig) -> OcrResult<Self> {
        let inference_config = config.to_inference_config();

        let rec_model = match (&config.model_path, &config.dict_path) {
            (Some(model_path), Some(dict_path)) => {
                info!("Loading {:?} recognition model", config.variant);
                let model = RecModel::from_file(
                    model_path,
                    dict_path,
                    config.variant,
                    Some(inference_config.clone()),
                )?
                .with_options(config.rec_options.clone());
                Some(model)
            }
            (Some(_), None) => {
                return Err(OcrError::InvalidParameter(
                    "dict_path is required when model_path is set".to_string(),
                ));
            }
            (None, Some(_)) => {
                warn!("dict_path is set without model_path, recognition stays disabled");
                None
            }
            (None, None) => None,
        };

        let det_model = match &config.det_model_path {
            Some(path) => {
                info!("Loading detection model");
                let model = DetModel::from_file(path, Some(inference_config))?
                    .with_options(config.det_options.clone())?;
                Some(model)
            }
            None => None,
        };

        if rec_model.is_none() && det_model.is_none() {
            return Err(OcrError::InvalidParameter(
                "No recognition or detection model configured".to_string(),
            ));
        }

        Ok(Self {
            rec_model,
            det_model,
            config,
        })
    }

    /// Assemble an engine from already-built models
    pub fn from_models(rec_model: Option<RecModel>, det_model: Option<DetModel>) -> Self {
        Self {
            rec_model,
            det_model,
            config: OcrEngineConfig::default(),
        }
    }

    /// Replace the configuration used by batch operations
    pub fn with_config(mut self, config: OcrEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Recognize the text of a captcha image
    pub fn classification(&self, image: &DynamicImage) -> OcrResult<String> {
        self.rec()?.recognize(image)
    }

    /// Recognize the text of an encoded image (PNG, JPEG, ...)
    pub fn classification_bytes(&self, bytes: &[u8]) -> OcrResult<String> {
        let image = image::load_from_memory(bytes)?;
        self.classification(&image)
    }

    /// Recognize several images, one result per image in input order
    pub fn classification_batch(&self, images: &[DynamicImage]) -> Vec<OcrResult<String>> {
        let rec = match self.rec() {
            Ok(rec) => rec,
            Err(_) => {
                return images
                    .iter()
                    .map(|_| Err(not_initialized("recognition")))
                    .collect();
            }
        };

        if self.config.enable_parallel && images.len() > 1 {
            use rayon::prelude::*;
            images.par_iter().map(|img| rec.recognize(img)).collect()
        } else {
            images.iter().map(|img| rec.recognize(img)).collect()
        }
    }

    /// Detect text regions
    ///
    /// # Returns
    /// Boxes in image coordinates, sorted by score descending
    pub fn detect(&self, image: &DynamicImage) -> OcrResult<Vec<DetBox>> {
        self.det()?.detect(image)
    }

    /// Get recognition model reference (if loaded)
    pub fn rec_model(&self) -> Option<&RecModel> {
        self.rec_model.as_ref()
    }

    /// Get detection model reference (if loaded)
    pub fn det_model(&self) -> Option<&DetModel> {
        self.det_model.as_ref()
    }

    /// Get configuration
    pub fn config(&self) -> &OcrEngineConfig {
        &self.config
    }

    fn rec(&self) -> OcrResult<&RecModel> {
        self.rec_model
            .as_ref()
            .ok_or_else(|| not_initialized("recognition"))
    }

    fn det(&self) -> OcrResult<&DetModel> {
        self.det_model
            .as_ref()
            .ok_or_else(|| not_initialized("detection"))
    }
}

fn not_initialized(pipeline: &str) -> OcrError {
    OcrError::NotInitialized(format!("{} model is not loaded", pipeline))
}

/// Builder for OCR engine
#[derive(Debug, Default)]
pub struct OcrEngineBuilder {
    config: OcrEngineConfig,
}

impl OcrEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set recognition model path
    pub fn with_model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config = self.config.with_model_path(path);
        self
    }

    /// Set detection model path
    pub fn with_det_model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config = self.config.with_det_model_path(path);
        self
    }

    /// Set dictionary path
    pub fn with_dict_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config = self.config.with_dict_path(path);
        self
    }

    /// Use the custom-model recognition variant
    pub fn with_custom_model(mut self, custom: bool) -> Self {
        let variant = if custom {
            RecVariant::Custom
        } else {
            RecVariant::Official
        };
        self.config = self.config.with_variant(variant);
        self
    }

    /// Set engine configuration, keeping paths already given to the builder
    pub fn with_config(mut self, config: OcrEngineConfig) -> Self {
        let model_path = self.config.model_path.take();
        let det_model_path = self.config.det_model_path.take();
        let dict_path = self.config.dict_path.take();

        self.config = OcrEngineConfig {
            model_path: config.model_path.or(model_path),
            det_model_path: config.det_model_path.or(det_model_path),
            dict_path: config.dict_path.or(dict_path),
            ..config
        };
        self
    }

    /// Configuration the builder will use
    pub fn config(&self) -> &OcrEngineConfig {
        &self.config
    }

    /// Build OCR engine
    pub fn build(self) -> OcrResult<OcrEngine> {
        OcrEngine::new(self.config)
    }
}

/// Convenience function: recognize a captcha from file
///
/// # Example
///
/// ```ignore
/// let text = dddd_ocr::ocr_file(
///     "captcha.png",
///     "models/common.onnx",
///     "models/charsets.txt",
///     dddd_ocr::RecVariant::Official,
/// )?;
/// ```
pub fn ocr_file(
    image_path: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    dict_path: impl AsRef<Path>,
    variant: RecVariant,
) -> OcrResult<String> {
    let image = image::open(image_path)?;
    let engine = OcrEngine::new(
        OcrEngineConfig::new()
            .with_model_path(model_path)
            .with_dict_path(dict_path)
            .with_variant(variant),
    )?;
    engine.classification(&image)
}

/// Convenience function: detect text regions in an image file
pub fn detect_file(
    image_path: impl AsRef<Path>,
    det_model_path: impl AsRef<Path>,
) -> OcrResult<Vec<DetBox>> {
    let image = image::open(image_path)?;
    let engine = OcrEngine::new(OcrEngineConfig::new().with_det_model_path(det_model_path))?;
    engine.detect(&image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::tensor::{Tensor, TensorMap};
    use std::sync::Arc;

    fn fake_rec_model() -> RecModel {
        let engine = |_inputs: TensorMap| -> OcrResult<TensorMap> {
            let mut outputs = TensorMap::new();
            outputs.insert("output".to_string(), Tensor::from_i64(&[3], vec![1, 0, 2])?);
            Ok(outputs)
        };
        RecModel::with_engine(
            engine,
            Arc::new(Dictionary::from_symbols(["x", "y"])),
            RecVariant::Custom,
        )
    }

    #[test]
    fn test_engine_config() {
        let config = OcrEngineConfig::default();
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.backend, Backend::CPU);
        assert_eq!(config.variant, RecVariant::Official);
        assert!(config.enable_parallel);
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_engine_config_builder() {
        let config = OcrEngineConfig::new()
            .with_model_path("a.onnx")
            .with_dict_path("dict.txt")
            .with_variant(RecVariant::Custom)
            .with_threads(1)
            .with_parallel(false);

        assert_eq!(config.model_path.as_deref(), Some(Path::new("a.onnx")));
        assert_eq!(config.dict_path.as_deref(), Some(Path::new("dict.txt")));
        assert_eq!(config.variant, RecVariant::Custom);
        assert_eq!(config.to_inference_config().thread_count, 1);
        assert!(!config.enable_parallel);
        assert!(config.to_inference_config().dylib_path.is_none());

        let config = config.with_ort_dylib_path("libonnxruntime.so");
        assert_eq!(
            config.to_inference_config().dylib_path.as_deref(),
            Some(Path::new("libonnxruntime.so"))
        );
    }

    #[test]
    fn test_new_requires_dictionary() {
        let result = OcrEngine::new(OcrEngineConfig::new().with_model_path("common.onnx"));
        assert!(matches!(result, Err(OcrError::InvalidParameter(_))));
    }

    #[test]
    fn test_new_requires_some_model() {
        let result = OcrEngine::new(OcrEngineConfig::new());
        assert!(matches!(result, Err(OcrError::InvalidParameter(_))));
    }

    #[test]
    fn test_new_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrEngineConfig::new().with_det_model_path(dir.path().join("det.onnx"));
        assert!(OcrEngine::new(config).is_err());
    }

    #[test]
    fn test_classification_without_rec_model() {
        let engine = OcrEngine::from_models(None, None);
        let err = engine
            .classification(&DynamicImage::new_rgb8(10, 10))
            .unwrap_err();
        assert!(matches!(err, OcrError::NotInitialized(_)));

        let err = engine.detect(&DynamicImage::new_rgb8(10, 10)).unwrap_err();
        assert!(matches!(err, OcrError::NotInitialized(_)));
    }

    #[test]
    fn test_classification_batch_keeps_order() {
        let engine = OcrEngine::from_models(Some(fake_rec_model()), None);
        let images = vec![
            DynamicImage::new_rgb8(30, 10),
            DynamicImage::new_rgb8(0, 10),
            DynamicImage::new_rgb8(40, 20),
        ];

        let results = engine.classification_batch(&images);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref().unwrap(), "xy");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_deref().unwrap(), "xy");
    }

    #[test]
    fn test_classification_batch_sequential() {
        let engine = OcrEngine::from_models(Some(fake_rec_model()), None)
            .with_config(OcrEngineConfig::new().with_parallel(false));
        let images = vec![DynamicImage::new_rgb8(30, 10); 2];

        let results = engine.classification_batch(&images);
        assert!(results.iter().all(|r| r.as_deref().ok() == Some("xy")));
    }

    #[test]
    fn test_classification_batch_not_initialized() {
        let engine = OcrEngine::from_models(None, None);
        let results = engine.classification_batch(&[DynamicImage::new_rgb8(5, 5)]);
        assert!(matches!(results[0], Err(OcrError::NotInitialized(_))));
    }

    #[test]
    fn test_classification_bytes() {
        let engine = OcrEngine::from_models(Some(fake_rec_model()), None);

        let mut png = Vec::new();
        DynamicImage::new_rgb8(16, 16)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(engine.classification_bytes(&png).unwrap(), "xy");

        let err = engine.classification_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, OcrError::ImageError(_)));
    }

    #[test]
    fn test_builder_keeps_paths() {
        let builder = OcrEngineBuilder::new()
            .with_model_path("rec.onnx")
            .with_dict_path("dict.txt")
            .with_custom_model(true)
            .with_config(OcrEngineConfig::new().with_threads(2));

        let config = builder.config();
        assert_eq!(config.model_path.as_deref(), Some(Path::new("rec.onnx")));
        assert_eq!(config.dict_path.as_deref(), Some(Path::new("dict.txt")));
        assert_eq!(config.thread_count, 2);
    }
}
