use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::util::BoxService;
use tower::{BoxError, Service, ServiceBuilder};

use super::detector::FaceDetection;
use super::model_registry::ModelRegistry;
use crate::common::Frame;
use crate::error::InferenceError;

pub type BoxedDetectionService = BoxService<Frame, Vec<FaceDetection>, BoxError>;

/// Exposes [`ModelRegistry::detect`] as a `tower::Service` so it can be layered.
#[derive(Clone)]
pub struct DetectionService {
    registry: Arc<ModelRegistry>,
}

impl DetectionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

impl Service<Frame> for DetectionService {
    type Response = Vec<FaceDetection>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: Frame) -> Self::Future {
        let registry = self.registry.clone();
        Box::pin(async move { registry.detect(&frame).await.map_err(BoxError::from) })
    }
}

pub struct DetectionServiceBuilder {
    registry: Arc<ModelRegistry>,
    inference_timeout: Option<Duration>,
}

impl DetectionServiceBuilder {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            inference_timeout: None,
        }
    }

    pub fn inference_timeout(mut self, inference_timeout: Option<Duration>) -> Self {
        self.inference_timeout = inference_timeout;
        self
    }

    pub fn build(self) -> BoxedDetectionService {
        let service = ServiceBuilder::new()
            .option_layer(self.inference_timeout.map(TimeoutLayer::new))
            .service(DetectionService::new(self.registry));
        BoxService::new(service)
    }
}

/// Recovers the typed error from a layered service's boxed error.
pub fn into_inference_error(error: BoxError) -> InferenceError {
    if error.is::<Elapsed>() {
        return InferenceError::Timeout;
    }
    match error.downcast::<InferenceError>() {
        Ok(inference_error) => *inference_error,
        Err(other) => InferenceError::Detector(other.to_string()),
    }
}
