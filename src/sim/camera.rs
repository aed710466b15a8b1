use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, ImageBuffer, Rgb};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::{CaptureConstraints, CaptureDevice, StreamHandle};
use crate::common::Frame;
use crate::error::CaptureError;

/// Camera that paints solid frames at a fixed rate.
pub struct SyntheticCamera {
    frame_interval: Duration,
    streams: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl SyntheticCamera {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn paint(constraints: &CaptureConstraints, shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            constraints.width,
            constraints.height,
            Rgb([shade, shade / 2, 128]),
        ))
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<StreamHandle, CaptureError> {
        if constraints.width == 0 || constraints.height == 0 {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported resolution {}x{}",
                constraints.width, constraints.height
            )));
        }

        let id = Uuid::new_v4();
        let (frame_tx, frames) = watch::channel(None);
        let cancel_token = CancellationToken::new();
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel_token.clone());

        let constraints = *constraints;
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::spawn(async move {
            let mut shade: u8 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        shade = shade.wrapping_add(8);
                        let image = SyntheticCamera::paint(&constraints, shade);
                        frame_tx.send_replace(Some(Frame::new(id, image, Utc::now())));
                    }
                }
            }
            debug!("Synthetic stream {} stopped producing frames", id);
        });

        info!(
            "Synthetic camera opened stream {} at {}x{}",
            id, constraints.width, constraints.height
        );
        Ok(StreamHandle { id, frames })
    }

    fn release_all(&self, stream: StreamHandle) {
        let token = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&stream.id);
        if let Some(token) = token {
            token.cancel();
            info!("Synthetic camera closed stream {}", stream.id);
        }
    }
}
