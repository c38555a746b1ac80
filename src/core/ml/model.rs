use crate::core::capture::frame::Frame;
use crate::core::ml::error::ModelError;
use crate::core::ml::transforms::normalize_chw;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Image classifier producing one logit per class.
pub trait ClassificationModel: Send + Sync {
    fn name(&self) -> &str;

    fn forward(&self, frame: &Frame) -> Result<Vec<f32>, ModelError>;
}

/// Serialized weights of a linear classification head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWeights {
    pub name: String,
    /// Square input side in pixels.
    pub input_size: u32,
    pub labels: Vec<String>,
    /// One row of `3 * input_size^2` weights per label.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearWeights {
    pub fn input_len(&self) -> usize {
        3 * (self.input_size as usize) * (self.input_size as usize)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.input_size == 0 {
            return Err(ModelError::invalid_config("input size is zero"));
        }
        if self.labels.is_empty() {
            return Err(ModelError::invalid_config("no labels"));
        }
        if self.weights.len() != self.labels.len() {
            return Err(ModelError::shape_mismatch(
                format!("{} weight rows", self.labels.len()),
                self.weights.len().to_string(),
            ));
        }
        if self.bias.len() != self.labels.len() {
            return Err(ModelError::shape_mismatch(
                format!("{} biases", self.labels.len()),
                self.bias.len().to_string(),
            ));
        }
        let input_len = self.input_len();
        if let Some(row) = self.weights.iter().find(|row| row.len() != input_len) {
            return Err(ModelError::shape_mismatch(
                format!("rows of {}", input_len),
                row.len().to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::load_weights(path.display().to_string(), e.to_string()))?;
        let weights: LinearWeights = serde_json::from_str(&text)
            .map_err(|e| ModelError::load_weights(path.display().to_string(), e.to_string()))?;
        weights.validate()?;
        Ok(weights)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Placeholder head: resize, normalize, then one dot product per class.
pub struct LinearModel {
    weights: LinearWeights,
}

impl LinearModel {
    pub fn new(weights: LinearWeights) -> Result<Self, ModelError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn labels(&self) -> &[String] {
        &self.weights.labels
    }

    pub fn input_size(&self) -> u32 {
        self.weights.input_size
    }
}

impl ClassificationModel for LinearModel {
    fn name(&self) -> &str {
        &self.weights.name
    }

    fn forward(&self, frame: &Frame) -> Result<Vec<f32>, ModelError> {
        let size = self.weights.input_size;
        let img = frame.resize_to(size, size).ok_or_else(|| {
            ModelError::shape_mismatch(
                format!("{}x{}x3 bytes", frame.width, frame.height),
                format!("{} bytes", frame.data.len()),
            )
        })?;
        let input = normalize_chw(&img);

        let logits: Vec<f32> = self
            .weights
            .weights
            .iter()
            .zip(self.weights.bias.iter())
            .map(|(row, b)| row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        if logits.iter().any(|l| !l.is_finite()) {
            return Err(ModelError::invalid_config("non-finite logits"));
        }
        Ok(logits)
    }
}

type LogitPattern = Box<dyn Fn(u64) -> Result<Vec<f32>, ModelError> + Send + Sync>;

/// Scripted model for tests and demos, keyed by frame sequence.
pub struct MockModel {
    pattern: LogitPattern,
}

impl MockModel {
    pub fn constant(logits: Vec<f32>) -> Self {
        Self::with_pattern(move |_| Ok(logits.clone()))
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<f32>, ModelError> + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(pattern),
        }
    }

    /// Fails on the listed frames, otherwise returns `logits`.
    pub fn failing_at(frames: Vec<u64>, logits: Vec<f32>) -> Self {
        Self::with_pattern(move |sequence| {
            if frames.contains(&sequence) {
                Err(ModelError::invalid_config(format!(
                    "scripted failure on frame {}",
                    sequence
                )))
            } else {
                Ok(logits.clone())
            }
        })
    }

    /// Logits whose softmax puts `confidence` percent on `index`.
    pub fn peaked(len: usize, index: usize, confidence: f32) -> Vec<f32> {
        let p = (confidence / 100.0).clamp(1e-4, 1.0 - 1e-4);
        let others = (len.max(2) - 1) as f32;
        let peak = (p * others / (1.0 - p)).ln();
        (0..len).map(|i| if i == index { peak } else { 0.0 }).collect()
    }
}

impl ClassificationModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn forward(&self, frame: &Frame) -> Result<Vec<f32>, ModelError> {
        (self.pattern)(frame.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ml::transforms::confidences;

    fn tiny_weights(labels: usize, input_size: u32) -> LinearWeights {
        let input_len = 3 * (input_size * input_size) as usize;
        LinearWeights {
            name: "tiny".to_string(),
            input_size,
            labels: (0..labels).map(|i| format!("class{}", i)).collect(),
            weights: (0..labels)
                .map(|i| vec![if i == 0 { 0.01 } else { -0.01 }; input_len])
                .collect(),
            bias: vec![0.0; labels],
        }
    }

    #[test]
    fn test_linear_model_output_len() {
        let model = LinearModel::new(tiny_weights(3, 4)).unwrap();
        let frame = Frame::new(16, 16, vec![200; 16 * 16 * 3], 0, 1);
        let logits = model.forward(&frame).unwrap();
        assert_eq!(logits.len(), 3);
        // bright frame normalizes positive, so class0 wins
        assert!(logits[0] > logits[1]);
    }

    #[test]
    fn test_linear_model_is_deterministic() {
        let model = LinearModel::new(tiny_weights(2, 8)).unwrap();
        let frame = Frame::new(10, 10, (0..300).map(|v| v as u8).collect(), 0, 1);
        assert_eq!(model.forward(&frame).unwrap(), model.forward(&frame).unwrap());
    }

    #[test]
    fn test_linear_model_rejects_malformed_frame() {
        let model = LinearModel::new(tiny_weights(2, 4)).unwrap();
        let frame = Frame::new(16, 16, vec![0; 5], 0, 1);
        assert!(matches!(
            model.forward(&frame),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_weights_validation() {
        let mut weights = tiny_weights(3, 4);
        weights.bias.pop();
        assert!(matches!(
            weights.validate(),
            Err(ModelError::ShapeMismatch { .. })
        ));

        let mut weights = tiny_weights(3, 4);
        weights.weights[1].truncate(5);
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weights_json_file() {
        let path = std::env::temp_dir().join(format!("textile_weights_{}.json", std::process::id()));
        tiny_weights(2, 2).save_json(&path).unwrap();
        let loaded = LinearWeights::from_json_file(&path).unwrap();
        assert_eq!(loaded.labels, vec!["class0", "class1"]);
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            LinearWeights::from_json_file(&path),
            Err(ModelError::LoadWeights { .. })
        ));
    }

    #[test]
    fn test_mock_failing_at() {
        let model = MockModel::failing_at(vec![5], vec![1.0, 0.0]);
        let ok = Frame::new(1, 1, vec![0; 3], 0, 4);
        let bad = Frame::new(1, 1, vec![0; 3], 0, 5);
        assert!(model.forward(&ok).is_ok());
        assert!(model.forward(&bad).is_err());
    }

    #[test]
    fn test_peaked_logits() {
        let conf = confidences(&MockModel::peaked(7, 2, 90.0));
        assert!((conf[2] - 90.0).abs() < 1e-3);
        let rest: f32 = conf.iter().enumerate().filter(|(i, _)| *i != 2).map(|(_, c)| c).sum();
        assert!((rest - 10.0).abs() < 1e-3);
    }
}
