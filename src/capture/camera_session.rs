use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::device::{CaptureConstraints, CaptureDevice, StreamHandle};
use crate::common::Frame;
use crate::error::CaptureError;

/// Exclusive ownership of an open camera stream.
///
/// The device is released when the handle is dropped, so every exit path that lets go of
/// the handle also lets go of the camera.
pub(crate) struct CaptureHandle {
    stream: Option<StreamHandle>,
    stream_id: Uuid,
    device: Arc<dyn CaptureDevice>,
    released: CancellationToken,
}

impl CaptureHandle {
    fn new(stream: StreamHandle, device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            stream_id: stream.id,
            stream: Some(stream),
            device,
            released: CancellationToken::new(),
        }
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    fn frame_source(&self) -> Option<FrameSource> {
        self.stream.as_ref().map(|stream| FrameSource {
            frames: stream.frames.clone(),
            released: self.released.clone(),
        })
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Readers holding a FrameSource stop seeing frames before the device goes away.
            self.released.cancel();
            self.device.release_all(stream);
            info!("Released camera stream {}", self.stream_id);
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read side of an open stream, cheap to clone into background tasks.
#[derive(Clone)]
pub struct FrameSource {
    frames: watch::Receiver<Option<Frame>>,
    released: CancellationToken,
}

impl FrameSource {
    /// The most recent non-empty frame, or `None` once the stream was released.
    pub fn latest(&self) -> Option<Frame> {
        if self.released.is_cancelled() {
            return None;
        }
        self.frames
            .borrow()
            .as_ref()
            .filter(|frame| !frame.is_empty())
            .cloned()
    }

    pub fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }
}

/// Owns the capture device and at most one open capture handle.
///
/// The handle never leaves the session; callers identify the stream by the id `start` returns.
pub struct CameraSession {
    device: Arc<dyn CaptureDevice>,
    handle: Option<CaptureHandle>,
}

impl CameraSession {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            handle: None,
        }
    }

    /// Opens the camera. Starting an already open session returns the current stream.
    pub async fn start(&mut self, constraints: &CaptureConstraints) -> Result<Uuid, CaptureError> {
        if let Some(handle) = &self.handle {
            debug!("Camera already open on stream {}", handle.stream_id());
            return Ok(handle.stream_id());
        }

        match self.device.acquire(constraints).await {
            Ok(stream) => {
                let handle = CaptureHandle::new(stream, self.device.clone());
                let stream_id = handle.stream_id();
                info!(
                    "Camera stream {} opened at {}x{}",
                    stream_id, constraints.width, constraints.height
                );
                self.handle = Some(handle);
                Ok(stream_id)
            }
            Err(e) => {
                warn!("Could not access camera: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stream_id(&self) -> Option<Uuid> {
        self.handle.as_ref().map(CaptureHandle::stream_id)
    }

    pub fn frame(&self) -> Option<Frame> {
        self.frame_source().and_then(|source| source.latest())
    }

    pub fn frame_source(&self) -> Option<FrameSource> {
        self.handle.as_ref().and_then(CaptureHandle::frame_source)
    }

    /// Releases the device. Safe to call any number of times, opened or not.
    pub fn stop(&mut self) {
        match self.handle.take() {
            Some(mut handle) => handle.release(),
            None => debug!("Camera stop requested with no open stream"),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}
