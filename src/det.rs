//! Text Region Detection Model
//!
//! Provides text region detection based on the ddddocr anchor-free detector.
//! The model predicts one `(dx, dy, dw, dh, objectness, class_score)` row per
//! grid cell of every stride; rows are decoded against a [`GridTable`] and
//! filtered with non-maximum suppression.

use image::{DynamicImage, GenericImageView};
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::error::{OcrError, OcrResult};
use crate::inference::Inference;
use crate::onnx::{InferenceConfig, InferenceEngine};
use crate::postprocess::{nms, DetBox};
use crate::preprocess::preprocess_for_det;
use crate::tensor::{Tensor, TensorMap};

/// Detection model input name
pub const DET_INPUT_NAME: &str = "images";
/// Detection model output name
pub const DET_OUTPUT_NAME: &str = "output";
/// Values per anchor row
const ANCHOR_ROW: usize = 6;

// ============== Grid table ==============

/// One anchor position on the detection grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    /// Column index
    pub x: u32,
    /// Row index
    pub y: u32,
    /// Stride of the feature map this cell belongs to
    pub stride: u32,
}

/// Flattened anchor grid for a fixed input size
///
/// Cells are ordered by ascending stride, then row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridTable {
    input_size: u32,
    cells: Vec<GridCell>,
}

impl GridTable {
    /// Build the grid for a square input of `input_size` pixels
    pub fn new(input_size: u32, strides: &[u32]) -> OcrResult<Self> {
        if strides.is_empty() {
            return Err(OcrError::InvalidParameter(
                "At least one stride is required".to_string(),
            ));
        }
        if strides.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(OcrError::InvalidParameter(format!(
                "Strides must be strictly ascending, got {:?}",
                strides
            )));
        }
        if let Some(&bad) = strides.iter().find(|&&s| s == 0 || s > input_size) {
            return Err(OcrError::InvalidParameter(format!(
                "Stride {} is invalid for input size {}",
                bad, input_size
            )));
        }

        let capacity = strides
            .iter()
            .map(|&s| ((input_size / s) * (input_size / s)) as usize)
            .sum();
        let mut cells = Vec::with_capacity(capacity);

        for &stride in strides {
            let size = input_size / stride;
            for y in 0..size {
                for x in 0..size {
                    cells.push(GridCell { x, y, stride });
                }
            }
        }

        Ok(Self { input_size, cells })
    }

    /// Input size the table was built for
    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Anchors in output row order
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }
}

/// Decode raw anchor rows into candidate boxes
///
/// # Parameters
/// - `output`: Flat `[N, 6]` rows aligned with `grid`
/// - `grid`: Anchor grid
/// - `ratio`: Letterbox scale, model coordinates are divided by it
/// - `image_width`, `image_height`: Original image size, boxes are clamped to it
/// - `score_threshold`: Rows with `objectness * class_score` below it are dropped
///
/// # Returns
/// Candidates in anchor order, before suppression
pub fn decode_anchors(
    output: &[f32],
    grid: &GridTable,
    ratio: f32,
    image_width: u32,
    image_height: u32,
    score_threshold: f32,
) -> OcrResult<Vec<DetBox>> {
    if ratio.is_nan() || ratio <= 0.0 {
        return Err(OcrError::InvalidParameter(format!(
            "Letterbox ratio must be positive, got {}",
            ratio
        )));
    }

    let needed = grid.len() * ANCHOR_ROW;
    if output.len() < needed {
        return Err(OcrError::ShapeMismatch {
            expected: vec![1, grid.len(), ANCHOR_ROW],
            got: vec![output.len()],
        });
    }
    if output.len() > needed {
        debug!(
            "Ignoring {} trailing values beyond {} anchors",
            output.len() - needed,
            grid.len()
        );
    }

    let (w, h) = (image_width as f32, image_height as f32);
    let mut candidates = Vec::new();

    for (row, cell) in output.chunks_exact(ANCHOR_ROW).zip(grid.cells()) {
        let score = row[4] * row[5];
        if score.is_nan() || score < score_threshold {
            continue;
        }

        let stride = cell.stride as f32;
        let cx = (row[0] + cell.x as f32) * stride;
        let cy = (row[1] + cell.y as f32) * stride;
        let bw = row[2].exp() * stride;
        let bh = row[3].exp() * stride;

        let det_box = DetBox::new(
            (cx - bw / 2.0) / ratio,
            (cy - bh / 2.0) / ratio,
            (cx + bw / 2.0) / ratio,
            (cy + bh / 2.0) / ratio,
            score,
        );
        candidates.push(det_box.clamp(w, h));
    }

    Ok(candidates)
}

// ============== Options ==============

/// Detection options
#[derive(Debug, Clone)]
pub struct DetOptions {
    /// Square model input size
    pub input_size: u32,
    /// Feature map strides, in model output order
    pub strides: Vec<u32>,
    /// Minimum `objectness * class_score`
    pub score_threshold: f32,
    /// NMS IoU threshold
    pub nms_threshold: f32,
}

impl Default for DetOptions {
    fn default() -> Self {
        Self {
            input_size: 416,
            strides: vec![8, 16, 32],
            score_threshold: 0.1,
            nms_threshold: 0.45,
        }
    }
}

impl DetOptions {
    /// Create new detection options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set input size
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// Set strides
    pub fn with_strides(mut self, strides: Vec<u32>) -> Self {
        self.strides = strides;
        self
    }

    /// Set score threshold
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Set NMS threshold
    pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
        self.nms_threshold = threshold;
        self
    }

    /// Build the anchor grid these options describe
    pub fn grid(&self) -> OcrResult<GridTable> {
        GridTable::new(self.input_size, &self.strides)
    }
}

// ============== Model ==============

/// Text region detection model
pub struct DetModel {
    engine: Box<dyn Inference>,
    options: DetOptions,
    grid: Arc<GridTable>,
}

impl DetModel {
    /// Create detector from model file
    ///
    /// # Parameters
    /// - `model_path`: Model file path (.onnx format)
    /// - `config`: Optional inference config
    pub fn from_file(model_path: impl AsRef<Path>, config: Option<InferenceConfig>) -> OcrResult<Self> {
        let engine = InferenceEngine::from_file(model_path, config)?;
        Self::with_engine(engine)
    }

    /// Create detector from model bytes
    pub fn from_bytes(model_bytes: &[u8], config: Option<InferenceConfig>) -> OcrResult<Self> {
        let engine = InferenceEngine::from_buffer(model_bytes, config)?;
        Self::with_engine(engine)
    }

    /// Create detector around any inference implementation
    pub fn with_engine(engine: impl Inference + 'static) -> OcrResult<Self> {
        let options = DetOptions::default();
        let grid = Arc::new(options.grid()?);
        Ok(Self {
            engine: Box::new(engine),
            options,
            grid,
        })
    }

    /// Set detection options, rebuilding the anchor grid when its shape changes
    pub fn with_options(mut self, options: DetOptions) -> OcrResult<Self> {
        if options.input_size != self.options.input_size || options.strides != self.options.strides {
            self.grid = Arc::new(options.grid()?);
        }
        self.options = options;
        Ok(self)
    }

    /// Get current detection options
    pub fn options(&self) -> &DetOptions {
        &self.options
    }

    /// Shared anchor grid
    pub fn grid(&self) -> &Arc<GridTable> {
        &self.grid
    }

    /// Detect text regions in an image
    ///
    /// # Returns
    /// Boxes in original-image coordinates, sorted by score descending
    pub fn detect(&self, image: &DynamicImage) -> OcrResult<Vec<DetBox>> {
        let (width, height) = image.dimensions();
        let letterbox = preprocess_for_det(image, self.options.input_size)?;
        debug!(
            "Letterboxed {}x{} to {}x{} (ratio {:.4})",
            width, height, letterbox.resized_width, letterbox.resized_height, letterbox.ratio
        );

        let mut inputs = TensorMap::with_capacity(1);
        inputs.insert(DET_INPUT_NAME.to_string(), letterbox.tensor);

        let mut outputs = self
            .engine
            .run(inputs)
            .map_err(|e| OcrError::inference("detection", e))?;
        let output = outputs
            .remove(DET_OUTPUT_NAME)
            .ok_or_else(|| OcrError::MissingOutput(DET_OUTPUT_NAME.to_string()))?;

        self.decode_output(&output, letterbox.ratio, width, height)
    }

    /// Decode a raw `[1, N, 6]` model output and suppress overlaps
    pub fn decode_output(
        &self,
        output: &Tensor,
        ratio: f32,
        image_width: u32,
        image_height: u32,
    ) -> OcrResult<Vec<DetBox>> {
        if output.shape().len() >= 2 && output.last_dim() != Some(ANCHOR_ROW) {
            return Err(OcrError::ShapeMismatch {
                expected: vec![1, self.grid.len(), ANCHOR_ROW],
                got: output.shape().to_vec(),
            });
        }

        let data = output.as_f32_slice()?;
        let candidates = decode_anchors(
            data,
            &self.grid,
            ratio,
            image_width,
            image_height,
            self.options.score_threshold,
        )?;
        let boxes = nms(&candidates, self.options.nms_threshold);
        debug!("{} candidates, {} boxes after NMS", candidates.len(), boxes.len());

        Ok(boxes)
    }
}
