use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::common::Frame;
use crate::config::CaptureConfiguration;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
        }
    }
}

impl From<&CaptureConfiguration> for CaptureConstraints {
    fn from(configuration: &CaptureConfiguration) -> Self {
        Self {
            width: configuration.width,
            height: configuration.height,
        }
    }
}

/// A live stream handed out by a [`CaptureDevice`].
///
/// The device keeps the sending half of `frames` and publishes the latest decoded frame
/// into it; `None` until the first frame has been produced.
#[derive(Debug)]
pub struct StreamHandle {
    pub id: Uuid,
    pub frames: watch::Receiver<Option<Frame>>,
}

/// Camera hardware (or anything that behaves like it).
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<StreamHandle, CaptureError>;

    /// Stops every track of the stream. Called exactly once per acquired stream.
    fn release_all(&self, stream: StreamHandle);
}
