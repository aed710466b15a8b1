//! In-process stand-ins for the camera, the model files, the face detector and the
//! language model, so the whole pipeline can run without hardware or network access.

pub mod camera;
pub mod completion;
pub mod detector;

pub use camera::SyntheticCamera;
pub use completion::CannedCompletion;
pub use detector::{ScriptedDetector, SimulatedModelLoader};
