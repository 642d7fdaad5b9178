//! Captcha Recognition Model
//!
//! Provides text recognition based on ddddocr classification models, decoding
//! the model output with a greedy CTC collapse

use image::DynamicImage;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::dict::Dictionary;
use crate::error::{OcrError, OcrResult};
use crate::inference::Inference;
use crate::onnx::{InferenceConfig, InferenceEngine};
use crate::preprocess::{preprocess_for_rec, NormalizeParams};
use crate::tensor::{Tensor, TensorMap};

/// Class count of the official ddddocr model
pub const DEFAULT_NUM_CLASSES: usize = 8210;

/// Layout of the recognition model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Already-argmaxed class indices (`i64`)
    Indices,
    /// Per-timestep class scores (`f32`, `[seq_len, ..., num_classes]`)
    Logits,
}

/// Constants describing one recognition model family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecProfile {
    /// Grayscale normalization
    pub normalize: NormalizeParams,
    /// Model input name
    pub input_name: &'static str,
    /// Model output name
    pub output_name: &'static str,
    /// Output layout
    pub output_kind: OutputKind,
    /// Class count used when the output shape does not carry it
    pub num_classes: usize,
}

static CUSTOM_PROFILE: RecProfile = RecProfile {
    normalize: NormalizeParams::ddddocr_custom(),
    input_name: "input1",
    output_name: "output",
    output_kind: OutputKind::Indices,
    num_classes: DEFAULT_NUM_CLASSES,
};

static OFFICIAL_PROFILE: RecProfile = RecProfile {
    normalize: NormalizeParams::ddddocr_official(),
    input_name: "input1",
    output_name: "387",
    output_kind: OutputKind::Logits,
    num_classes: DEFAULT_NUM_CLASSES,
};

/// Recognition model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecVariant {
    /// Custom-trained model emitting class indices
    Custom,
    /// Official ddddocr model emitting logits
    #[default]
    Official,
}

impl RecVariant {
    /// Constants for this model family
    pub fn profile(self) -> &'static RecProfile {
        match self {
            RecVariant::Custom => &CUSTOM_PROFILE,
            RecVariant::Official => &OFFICIAL_PROFILE,
        }
    }
}

/// Recognition options
#[derive(Debug, Clone)]
pub struct RecOptions {
    /// Target height (recognition model input height)
    pub target_height: u32,
    /// Input columns per output timestep
    pub seq_stride: usize,
}

impl Default for RecOptions {
    fn default() -> Self {
        Self {
            target_height: 64,
            seq_stride: 8,
        }
    }
}

impl RecOptions {
    /// Create new recognition options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target height
    pub fn with_target_height(mut self, height: u32) -> Self {
        self.target_height = height;
        self
    }

    /// Set sequence stride
    pub fn with_seq_stride(mut self, stride: usize) -> Self {
        self.seq_stride = stride;
        self
    }
}

// ============== CTC decoding ==============

/// Greedy CTC collapse over a class index sequence
///
/// Blanks (index 0) and immediate repeats are dropped; the repeat check looks at
/// the previous index whether or not it was emitted. Indices outside the
/// dictionary, negative ones included, are skipped.
pub fn ctc_collapse<I>(indices: I, dictionary: &Dictionary) -> String
where
    I: IntoIterator<Item = i64>,
{
    let mut text = String::new();
    let mut prev: Option<i64> = None;

    for idx in indices {
        if idx != 0 && prev != Some(idx) {
            if let Some(symbol) = usize::try_from(idx).ok().and_then(|i| dictionary.get(i)) {
                text.push_str(symbol);
            }
        }
        prev = Some(idx);
    }

    text
}

/// Decode an index-mode output
pub fn decode_indices(indices: &[i64], dictionary: &Dictionary) -> String {
    ctc_collapse(indices.iter().copied(), dictionary)
}

/// Index of the largest score, lowest index on ties
pub fn argmax(scores: &[f32]) -> usize {
    let mut best_idx = 0;
    let mut best = f32::NEG_INFINITY;
    for (idx, &score) in scores.iter().enumerate() {
        if score > best {
            best = score;
            best_idx = idx;
        }
    }
    best_idx
}

/// Decode a logit-mode output of `seq_len` rows of `num_classes` scores
///
/// Decoding stops early, without error, at the first row the buffer cannot
/// fully hold.
pub fn decode_logits(
    scores: &[f32],
    seq_len: usize,
    num_classes: usize,
    dictionary: &Dictionary,
) -> String {
    if num_classes == 0 {
        return String::new();
    }

    let steps = scores
        .chunks_exact(num_classes)
        .take(seq_len)
        .map(|row| argmax(row) as i64);
    ctc_collapse(steps, dictionary)
}

/// Output timesteps for an input of `width` columns
#[inline]
pub fn sequence_length(width: usize, stride: usize) -> usize {
    width.div_ceil(stride)
}

// ============== Model ==============

/// Captcha recognition model
pub struct RecModel {
    engine: Box<dyn Inference>,
    dictionary: Arc<Dictionary>,
    variant: RecVariant,
    options: RecOptions,
}

impl RecModel {
    /// Create recognizer from model file and dictionary file
    ///
    /// # Parameters
    /// - `model_path`: Model file path (.onnx format)
    /// - `dict_path`: Dictionary file path (one symbol per line, blank first)
    /// - `variant`: Model family
    /// - `config`: Optional inference config
    pub fn from_file(
        model_path: impl AsRef<Path>,
        dict_path: impl AsRef<Path>,
        variant: RecVariant,
        config: Option<InferenceConfig>,
    ) -> OcrResult<Self> {
        let dictionary = Dictionary::load(dict_path)?;
        let engine = InferenceEngine::from_file(model_path, config)?;
        Ok(Self::with_engine(engine, Arc::new(dictionary), variant))
    }

    /// Create recognizer from model bytes and a loaded dictionary
    pub fn from_bytes(
        model_bytes: &[u8],
        dictionary: Arc<Dictionary>,
        variant: RecVariant,
        config: Option<InferenceConfig>,
    ) -> OcrResult<Self> {
        let engine = InferenceEngine::from_buffer(model_bytes, config)?;
        Ok(Self::with_engine(engine, dictionary, variant))
    }

    /// Create recognizer around any inference implementation
    pub fn with_engine(
        engine: impl Inference + 'static,
        dictionary: Arc<Dictionary>,
        variant: RecVariant,
    ) -> Self {
        Self {
            engine: Box::new(engine),
            dictionary,
            variant,
            options: RecOptions::default(),
        }
    }

    /// Set recognition options
    pub fn with_options(mut self, options: RecOptions) -> Self {
        self.options = options;
        self
    }

    /// Get current recognition options
    pub fn options(&self) -> &RecOptions {
        &self.options
    }

    /// Model family
    pub fn variant(&self) -> RecVariant {
        self.variant
    }

    /// Shared dictionary
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Recognize the text in a single image
    pub fn recognize(&self, image: &DynamicImage) -> OcrResult<String> {
        let profile = self.variant.profile();

        let input = preprocess_for_rec(image, self.options.target_height, &profile.normalize)?;
        let input_width = input.shape()[3];

        let mut inputs = TensorMap::with_capacity(1);
        inputs.insert(profile.input_name.to_string(), input);

        let mut outputs = self
            .engine
            .run(inputs)
            .map_err(|e| OcrError::inference("recognition", e))?;
        let output = outputs
            .remove(profile.output_name)
            .ok_or_else(|| OcrError::MissingOutput(profile.output_name.to_string()))?;

        self.decode_output(&output, input_width)
    }

    /// Decode a raw model output
    ///
    /// # Parameters
    /// - `output`: Output tensor named by the variant's profile
    /// - `input_width`: Width of the encoded input, used for the logit timestep count
    pub fn decode_output(&self, output: &Tensor, input_width: usize) -> OcrResult<String> {
        let profile = self.variant.profile();

        match profile.output_kind {
            OutputKind::Indices => {
                let indices = output.as_i64_slice()?;
                debug!("Decoding {} class indices", indices.len());
                Ok(decode_indices(indices, &self.dictionary))
            }
            OutputKind::Logits => {
                if self.options.seq_stride == 0 {
                    return Err(OcrError::InvalidParameter(
                        "Sequence stride must be positive".to_string(),
                    ));
                }
                let scores = output.as_f32_slice()?;
                let num_classes = match output.last_dim() {
                    Some(n) if n > 0 && output.shape().len() >= 2 => n,
                    _ => profile.num_classes,
                };
                let seq_len = sequence_length(input_width, self.options.seq_stride);
                debug!(
                    "Decoding logits: shape {:?}, {} timesteps of {} classes",
                    output.shape(),
                    seq_len,
                    num_classes
                );
                Ok(decode_logits(scores, seq_len, num_classes, &self.dictionary))
            }
        }
    }
}
