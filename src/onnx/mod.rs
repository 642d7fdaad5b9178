//! ONNX Runtime inference engine
//!
//! Wraps an `ort` session behind the [`Inference`] trait. Tensors cross the
//! boundary by value: inputs are converted into ort values right before the run
//! and every declared output is copied back into an owned [`Tensor`], so no ort
//! value outlives a single call.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
#[cfg(feature = "load-dynamic")]
use std::sync::OnceLock;

use log::{debug, info};
#[cfg(feature = "load-dynamic")]
use log::warn;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputs};
use ort::value::{DynValue, Value};

use crate::error::{OcrError, OcrResult};
use crate::inference::Inference;
use crate::tensor::{ElementType, Tensor, TensorMap};

// ============== Configuration Types ==============

/// Graph optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    /// No graph optimizations
    Disable,
    /// Basic optimizations (constant folding, redundant node removal)
    Basic,
    /// Extended optimizations (node fusions)
    Extended,
    /// All optimizations, including layout transforms
    #[default]
    All,
}

impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

/// Inference backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// CPU backend
    #[default]
    CPU,
    /// CUDA GPU (NVIDIA), requires the `cuda` feature
    CUDA,
    /// CoreML (macOS/iOS), requires the `coreml` feature
    CoreML,
}

impl Backend {
    fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
        // CPU stays registered last so unavailable accelerators fall back to it.
        match self {
            Backend::CPU => vec![CPUExecutionProvider::default().build()],
            Backend::CUDA => vec![
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            Backend::CoreML => vec![
                CoreMLExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Intra-op thread count (0 lets ONNX Runtime decide)
    pub thread_count: usize,
    /// Graph optimization level
    pub optimization_level: OptimizationLevel,
    /// Inference backend
    pub backend: Backend,
    /// ONNX Runtime shared library to load, requires the `load-dynamic` feature
    ///
    /// Without it, `load-dynamic` builds fall back to `ORT_DYLIB_PATH`.
    pub dylib_path: Option<PathBuf>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            thread_count: 4,
            optimization_level: OptimizationLevel::All,
            backend: Backend::CPU,
            dylib_path: None,
        }
    }
}

impl InferenceConfig {
    /// Create new inference configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    /// Set optimization level
    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    /// Set backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the ONNX Runtime shared library path
    pub fn with_dylib_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dylib_path = Some(path.as_ref().to_path_buf());
        self
    }

    fn session_builder(&self) -> OcrResult<SessionBuilder> {
        init_runtime(self.dylib_path.as_deref())?;

        let mut builder = Session::builder()?
            .with_optimization_level(self.optimization_level.into())?
            .with_execution_providers(self.backend.execution_providers())?;
        if self.thread_count > 0 {
            builder = builder.with_intra_threads(self.thread_count)?;
        }
        Ok(builder)
    }
}

#[cfg(feature = "load-dynamic")]
static RUNTIME_LIBRARY: OnceLock<PathBuf> = OnceLock::new();

/// Load the ONNX Runtime library once per process
#[cfg(feature = "load-dynamic")]
fn init_runtime(path: Option<&Path>) -> OcrResult<()> {
    let Some(path) = path else {
        return Ok(());
    };

    if let Some(loaded) = RUNTIME_LIBRARY.get() {
        if loaded != path {
            warn!(
                "ONNX Runtime already loaded from {}, ignoring {}",
                loaded.display(),
                path.display()
            );
        }
        return Ok(());
    }

    info!("Loading ONNX Runtime from {}", path.display());
    ort::init_from(path.to_string_lossy().into_owned()).commit()?;
    let _ = RUNTIME_LIBRARY.set(path.to_path_buf());
    Ok(())
}

#[cfg(not(feature = "load-dynamic"))]
fn init_runtime(path: Option<&Path>) -> OcrResult<()> {
    match path {
        Some(path) => Err(OcrError::InvalidParameter(format!(
            "Loading ONNX Runtime from {} requires the `load-dynamic` feature",
            path.display()
        ))),
        None => Ok(()),
    }
}

// ============== Inference Engine ==============

/// ONNX Runtime inference engine
///
/// Encapsulates model loading and inference. The session is guarded by a mutex,
/// so one engine can be shared across threads; calls are serialized.
pub struct InferenceEngine {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl InferenceEngine {
    /// Create inference engine from model byte data
    ///
    /// # Parameters
    /// - `model_buffer`: Model file byte data
    /// - `config`: Optional inference configuration
    pub fn from_buffer(model_buffer: &[u8], config: Option<InferenceConfig>) -> OcrResult<Self> {
        if model_buffer.is_empty() {
            return Err(OcrError::ModelLoadError("Model data is empty".to_string()));
        }

        let config = config.unwrap_or_default();
        let session = config
            .session_builder()?
            .commit_from_memory(model_buffer)
            .map_err(|e| OcrError::ModelLoadError(e.to_string()))?;

        Ok(Self::from_session(session))
    }

    /// Create inference engine from model file
    pub fn from_file(
        model_path: impl AsRef<Path>,
        config: Option<InferenceConfig>,
    ) -> OcrResult<Self> {
        let model_path = model_path.as_ref();
        info!("Loading ONNX model from {}", model_path.display());

        let model_buffer = std::fs::read(model_path).map_err(|e| {
            OcrError::ModelLoadError(format!(
                "Failed to read model file {}: {}",
                model_path.display(),
                e
            ))
        })?;
        debug!(
            "Model file size: {:.2} MB",
            model_buffer.len() as f64 / (1024.0 * 1024.0)
        );

        Self::from_buffer(&model_buffer, config)
    }

    fn from_session(session: Session) -> Self {
        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> =
            session.outputs.iter().map(|o| o.name.clone()).collect();
        debug!("Model inputs: {:?}, outputs: {:?}", input_names, output_names);

        Self {
            session: Mutex::new(session),
            input_names,
            output_names,
        }
    }

    /// Names of the model inputs, in declaration order
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Names of the model outputs, in declaration order
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Execute inference
    ///
    /// Every input name must be declared by the model. All declared outputs are
    /// returned.
    pub fn run_named(&self, inputs: TensorMap) -> OcrResult<TensorMap> {
        let mut values = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            if !self.input_names.iter().any(|n| n == &name) {
                return Err(OcrError::InvalidParameter(format!(
                    "Model has no input named '{}' (inputs: {:?})",
                    name, self.input_names
                )));
            }
            values.push((Cow::Owned(name), to_ort_value(tensor)?.into()));
        }

        let mut session = self.session.lock().map_err(|_| {
            OcrError::ModelLoadError("Inference session lock poisoned".to_string())
        })?;

        let ort_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(values);
        let outputs = session.run(ort_inputs)?;

        let mut results = TensorMap::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = outputs
                .get(name.as_str())
                .ok_or_else(|| OcrError::MissingOutput(name.clone()))?;
            results.insert(name.clone(), from_ort_value(name, value)?);
        }

        Ok(results)
    }
}

impl Inference for InferenceEngine {
    fn run(&self, inputs: TensorMap) -> OcrResult<TensorMap> {
        self.run_named(inputs)
    }
}

fn to_ort_value(tensor: Tensor) -> OcrResult<DynValue> {
    let value = match tensor.element_type() {
        ElementType::F32 => {
            let (shape, data) = tensor.into_f32_parts()?;
            Value::from_array((shape.as_slice(), data))?.into_dyn()
        }
        ElementType::I64 => {
            let (shape, data) = tensor.into_i64_parts()?;
            Value::from_array((shape.as_slice(), data))?.into_dyn()
        }
    };
    Ok(value)
}

fn from_ort_value(name: &str, value: &DynValue) -> OcrResult<Tensor> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        return Tensor::from_f32(&dims, data.to_vec());
    }
    if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        return Tensor::from_i64(&dims, data.to_vec());
    }
    if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        return Tensor::from_i64(&dims, data.iter().map(|&v| v as i64).collect());
    }

    Err(OcrError::PostprocessError(format!(
        "Unsupported element type for output '{}', only f32, i64 and i32 are supported",
        name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_config_default() {
        let config = InferenceConfig::default();
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.optimization_level, OptimizationLevel::All);
        assert_eq!(config.backend, Backend::CPU);
        assert!(config.dylib_path.is_none());
    }

    #[test]
    fn test_inference_config_builder() {
        let config = InferenceConfig::new()
            .with_threads(2)
            .with_optimization_level(OptimizationLevel::Basic)
            .with_backend(Backend::CUDA)
            .with_dylib_path("/opt/onnxruntime/lib/libonnxruntime.so");

        assert_eq!(config.thread_count, 2);
        assert_eq!(config.optimization_level, OptimizationLevel::Basic);
        assert_eq!(config.backend, Backend::CUDA);
        assert_eq!(
            config.dylib_path,
            Some(PathBuf::from("/opt/onnxruntime/lib/libonnxruntime.so"))
        );
    }

    #[cfg(not(feature = "load-dynamic"))]
    #[test]
    fn test_dylib_path_requires_load_dynamic() {
        let config = InferenceConfig::new().with_dylib_path("libonnxruntime.so");
        let result = InferenceEngine::from_buffer(&[0u8; 4], Some(config));
        assert!(matches!(result, Err(OcrError::InvalidParameter(_))));
    }

    #[test]
    fn test_accelerated_backends_fall_back_to_cpu() {
        assert_eq!(Backend::CPU.execution_providers().len(), 1);
        assert_eq!(Backend::CUDA.execution_providers().len(), 2);
        assert_eq!(Backend::CoreML.execution_providers().len(), 2);
    }

    #[test]
    fn test_from_buffer_rejects_empty_model() {
        let result = InferenceEngine::from_buffer(&[], None);
        assert!(matches!(result, Err(OcrError::ModelLoadError(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = InferenceEngine::from_file("does/not/exist.onnx", None);
        assert!(matches!(result, Err(OcrError::ModelLoadError(_))));
    }
}
