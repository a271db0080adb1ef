use std::sync::Arc;

use image::ImageError;
use ndarray::Array4;
use shared::{ClassLabel, Prediction};

use super::engine::{InferenceEngine, InferenceError};
use super::preprocess;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] ImageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub prediction: Prediction,
    pub confidence: f32,
    pub index: usize,
}

/// Picks the arg-max class, falling back to `Prediction::Unknown` when its
/// score is below `threshold`. Ties resolve to the lowest index.
pub fn decide(scores: &[f32], threshold: f32) -> Result<Decision, InferenceError> {
    let expected = ClassLabel::count();
    if scores.len() != expected {
        return Err(InferenceError::ShapeMismatch {
            expected,
            actual: scores.len(),
        });
    }
    if let Some(&bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        return Err(InferenceError::InvalidScore(bad));
    }

    let (index, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, scores[0]), |best, (i, score)| {
            if score > best.1 { (i, score) } else { best }
        });

    let prediction = if confidence < threshold {
        Prediction::Unknown
    } else {
        let label = ClassLabel::from_index(index).ok_or(InferenceError::ShapeMismatch {
            expected,
            actual: scores.len(),
        })?;
        Prediction::Label(label)
    };

    Ok(Decision {
        prediction,
        confidence,
        index,
    })
}

/// Decode, preprocess, score and decide for a single upload.
#[derive(Clone)]
pub struct Classifier {
    engine: Arc<dyn InferenceEngine>,
    threshold: f32,
}

impl Classifier {
    pub fn new(engine: Arc<dyn InferenceEngine>, threshold: f32) -> Self {
        Self { engine, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, data: &[u8]) -> Result<Decision, ClassifyError> {
        let tensor = preprocess::preprocess(data)?;
        let scores = self.engine.predict(&tensor)?;
        log::debug!("Model scores: {:?}", scores);
        Ok(decide(&scores, self.threshold)?)
    }

    /// Runs a blank image through the engine and checks the output width
    /// against the label set.
    pub fn self_check(&self) -> Result<(), InferenceError> {
        let side = preprocess::INPUT_SIZE as usize;
        let blank = Array4::<f32>::zeros((1, side, side, 3));
        let scores = self.engine.predict(&blank)?;
        if scores.len() != ClassLabel::count() {
            return Err(InferenceError::ShapeMismatch {
                expected: ClassLabel::count(),
                actual: scores.len(),
            });
        }
        Ok(())
    }
}
