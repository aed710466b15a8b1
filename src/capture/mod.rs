pub mod camera_session;
pub mod device;

pub use camera_session::{CameraSession, FrameSource};
pub use device::{CaptureConstraints, CaptureDevice, StreamHandle};
