use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::Frame;
use crate::error::{InferenceError, ModelLoadError};

/// Expression label to confidence in `[0, 1]`, in the order the classifier reports them.
///
/// Insertion order is significant: it is the tie-break order used when picking the
/// dominant expression.
pub type Expressions = IndexMap<String, f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    TinyFaceDetector,
    FaceExpressionNet,
    FaceLandmark68Net,
}

impl ModelKind {
    /// Every model the affect pipeline needs before detection can run.
    pub const REQUIRED: [ModelKind; 3] = [
        ModelKind::TinyFaceDetector,
        ModelKind::FaceExpressionNet,
        ModelKind::FaceLandmark68Net,
    ];

    pub fn manifest_name(&self) -> &'static str {
        match self {
            ModelKind::TinyFaceDetector => "tiny_face_detector_model",
            ModelKind::FaceExpressionNet => "face_expression_model",
            ModelKind::FaceLandmark68Net => "face_landmark_68_model",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.manifest_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    pub expressions: Expressions,
}

/// Fetches and initialises one model's weights.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load_model(&self, kind: ModelKind, source_uri: &str) -> Result<(), ModelLoadError>;
}

/// Face detection plus expression classification over a single frame.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceDetection>, InferenceError>;
}
