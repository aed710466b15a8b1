pub mod detection_service;
pub mod detector;
pub mod model_registry;

pub use detection_service::{
    BoxedDetectionService, DetectionService, DetectionServiceBuilder, into_inference_error,
};
pub use detector::{BoundingBox, Expressions, FaceDetection, FaceDetector, ModelKind, ModelLoader};
pub use model_registry::{ModelRegistry, ModelState};
