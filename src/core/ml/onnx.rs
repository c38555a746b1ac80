//! ONNX Runtime classification head

use crate::core::capture::frame::Frame;
use crate::core::ml::error::ModelError;
use crate::core::ml::model::ClassificationModel;
use crate::core::ml::transforms::normalize_chw;
use log::{debug, info};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;

/// Exported classifier taking `[1, 3, size, size]` ImageNet-normalized input
/// and producing `[1, classes]` logits.
pub struct OnnxModel {
    name: String,
    // `Session::run` needs `&mut`
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
    num_classes: usize,
}

impl OnnxModel {
    pub fn load(
        path: impl AsRef<Path>,
        input_size: u32,
        num_classes: usize,
        threads: usize,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if input_size == 0 || num_classes == 0 {
            return Err(ModelError::invalid_config("input size and class count must be positive"));
        }
        let load_err = |e: &dyn Display| ModelError::load_weights(path.display().to_string(), e.to_string());

        info!("🔧 Building ONNX Runtime session: {}", path.display());
        let session = Session::builder()
            .map_err(|e| load_err(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(&e))?
            .with_intra_threads(threads.max(1))
            .map_err(|e| load_err(&e))?
            .commit_from_file(path)
            .map_err(|e| load_err(&e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| load_err(&"model declares no inputs"))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        info!("✅ ONNX model '{}' ready (input '{}', {}px)", name, input_name, input_size);
        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            input_size,
            num_classes,
        })
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    fn run(&self, input: Vec<f32>) -> Result<Vec<f32>, ModelError> {
        let side = self.input_size as usize;
        let shape = [1, 3, side, side];
        let input_value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))
            .map_err(|e| ModelError::runtime(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::runtime("session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| ModelError::runtime(e.to_string()))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::runtime(e.to_string()))?;
        Ok(data.to_vec())
    }
}

impl ClassificationModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, frame: &Frame) -> Result<Vec<f32>, ModelError> {
        let size = self.input_size;
        let img = frame.resize_to(size, size).ok_or_else(|| {
            ModelError::shape_mismatch(
                format!("{}x{}x3 bytes", frame.width, frame.height),
                format!("{} bytes", frame.data.len()),
            )
        })?;

        let logits = self.run(normalize_chw(&img))?;
        debug!("{}: {} logits for {}", self.name, logits.len(), frame.frame_id());

        if logits.len() != self.num_classes {
            return Err(ModelError::shape_mismatch(
                format!("{} logits", self.num_classes),
                logits.len().to_string(),
            ));
        }
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(ModelError::runtime("non-finite logits"));
        }
        Ok(logits)
    }
}
