use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use crate::common::Frame;
use crate::error::{InferenceError, ModelLoadError};
use crate::inference::{BoundingBox, Expressions, FaceDetection, FaceDetector, ModelKind, ModelLoader};

/// Expression labels in the order the expression classifier emits them.
pub const EXPRESSION_LABELS: [&str; 7] = [
    "neutral",
    "happy",
    "sad",
    "angry",
    "fearful",
    "disgusted",
    "surprised",
];

/// Pretends to fetch model weights, taking `latency` per model.
pub struct SimulatedModelLoader {
    latency: Duration,
    fail_on: Option<ModelKind>,
}

impl SimulatedModelLoader {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail_on: None,
        }
    }

    pub fn fail_on(mut self, kind: ModelKind) -> Self {
        self.fail_on = Some(kind);
        self
    }
}

#[async_trait]
impl ModelLoader for SimulatedModelLoader {
    async fn load_model(&self, kind: ModelKind, source_uri: &str) -> Result<(), ModelLoadError> {
        tokio::time::sleep(self.latency).await;
        if self.fail_on == Some(kind) {
            return Err(ModelLoadError::Fetch {
                kind,
                source_uri: source_uri.to_string(),
                reason: "manifest not found".to_string(),
            });
        }
        info!("Loaded {} from {}", kind, source_uri);
        Ok(())
    }
}

/// Reports one centred face whose dominant expression walks through `script`,
/// holding each mood for `frames_per_mood` detections.
pub struct ScriptedDetector {
    script: Vec<String>,
    frames_per_mood: usize,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<String>, frames_per_mood: usize) -> Self {
        Self {
            script,
            frames_per_mood: frames_per_mood.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    fn mood_at(&self, call: usize) -> Option<&str> {
        if self.script.is_empty() {
            return None;
        }
        let index = (call / self.frames_per_mood) % self.script.len();
        Some(self.script[index].as_str())
    }

    fn expressions_for(dominant: &str) -> Expressions {
        let mut rng = rand::rng();
        EXPRESSION_LABELS
            .iter()
            .map(|label| {
                let confidence = if *label == dominant {
                    rng.random_range(0.6..0.9)
                } else {
                    rng.random_range(0.0..0.05)
                };
                (label.to_string(), confidence)
            })
            .collect()
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        let script = ["neutral", "happy", "neutral", "sad", "surprised"]
            .into_iter()
            .map(String::from)
            .collect();
        Self::new(script, 20)
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceDetection>, InferenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(mood) = self.mood_at(call) else {
            return Ok(Vec::new());
        };
        debug!("Scripted detection {} on frame {}: {}", call, frame.frame_id(), mood);

        let (width, height) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![FaceDetection {
            bounding_box: BoundingBox {
                x: width * 0.25,
                y: height * 0.2,
                width: width * 0.5,
                height: height * 0.6,
            },
            expressions: Self::expressions_for(mood),
        }])
    }
}
