use std::env;
use std::path::PathBuf;

use dddd_ocr::{OcrEngineConfig, RecVariant};

pub struct Config {
    pub model_path: Option<PathBuf>,
    pub det_model_path: Option<PathBuf>,
    pub dict_path: Option<PathBuf>,
    pub ort_dylib_path: Option<PathBuf>,
    pub custom_model: bool,
    pub threads: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        Self {
            model_path: path("DDDD_MODEL_PATH"),
            det_model_path: path("DDDD_DET_MODEL_PATH"),
            dict_path: path("DDDD_DICT_PATH"),
            ort_dylib_path: path("ORT_DYLIB_PATH"),
            custom_model: lookup("DDDD_CUSTOM_MODEL")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            threads: lookup("DDDD_THREADS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(4),
        }
    }

    pub fn engine_config(&self) -> OcrEngineConfig {
        let variant = if self.custom_model {
            RecVariant::Custom
        } else {
            RecVariant::Official
        };

        let mut config = OcrEngineConfig::new()
            .with_variant(variant)
            .with_threads(self.threads);
        config.model_path = self.model_path.clone();
        config.det_model_path = self.det_model_path.clone();
        config.dict_path = self.dict_path.clone();
        config.ort_dylib_path = self.ort_dylib_path.clone();
        config
    }
}
