use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::detector::{FaceDetection, FaceDetector, ModelKind, ModelLoader};
use crate::common::Frame;
use crate::error::{InferenceError, ModelLoadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

type LoadOutcome = Option<Result<(), ModelLoadError>>;

/// Loads the face and expression models once and gates inference on their readiness.
///
/// `load` is single-flight: the first call starts one background load and every caller,
/// including later ones, waits on its outcome. A caller that stops waiting does not stop
/// the load. A failed load is final for the lifetime of the registry.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    detector: Arc<dyn FaceDetector>,
    base_uri: String,
    load_timeout: Option<Duration>,
    state: watch::Sender<ModelState>,
    outcome: watch::Sender<LoadOutcome>,
    started: AtomicBool,
}

impl ModelRegistry {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        detector: Arc<dyn FaceDetector>,
        base_uri: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        let (outcome, _) = watch::channel(None);
        Self {
            loader,
            detector,
            base_uri: base_uri.into(),
            load_timeout: None,
            state,
            outcome,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn state(&self) -> ModelState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state.subscribe()
    }

    pub async fn load(&self) -> Result<ModelState, ModelLoadError> {
        let mut outcome = self.outcome.subscribe();
        if !self.started.swap(true, Ordering::SeqCst) {
            self.state.send_replace(ModelState::Loading);
            tokio::spawn(self.load_job().run());
        }

        let finished = outcome
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        match finished {
            Ok(Some(result)) => result.map(|_| ModelState::Ready),
            _ => Err(ModelLoadError::Abandoned),
        }
    }

    fn load_job(&self) -> LoadJob {
        LoadJob {
            loader: self.loader.clone(),
            base_uri: self.base_uri.clone(),
            load_timeout: self.load_timeout,
            state: self.state.clone(),
            outcome: self.outcome.clone(),
        }
    }

    /// Runs face and expression detection on one frame.
    pub async fn detect(&self, frame: &Frame) -> Result<Vec<FaceDetection>, InferenceError> {
        if !self.is_ready() {
            return Err(InferenceError::ModelNotReady);
        }
        self.detector.detect(frame).await
    }
}

struct LoadJob {
    loader: Arc<dyn ModelLoader>,
    base_uri: String,
    load_timeout: Option<Duration>,
    state: watch::Sender<ModelState>,
    outcome: watch::Sender<LoadOutcome>,
}

impl LoadJob {
    async fn run(self) {
        info!(
            "Loading {} models from {}",
            ModelKind::REQUIRED.len(),
            self.base_uri
        );

        let loads = ModelKind::REQUIRED.iter().map(|kind| self.load_one(*kind));
        let result = match try_join_all(loads).await {
            Ok(_) => {
                self.state.send_replace(ModelState::Ready);
                info!("Models loaded successfully");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ModelState::Failed);
                error!("Error loading models: {}", e);
                Err(e)
            }
        };
        self.outcome.send_replace(Some(result));
    }

    async fn load_one(&self, kind: ModelKind) -> Result<(), ModelLoadError> {
        debug!("Loading {}", kind);
        let load = self.loader.load_model(kind, &self.base_uri);
        match self.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, load)
                .await
                .map_err(|_| ModelLoadError::Timeout(kind))?,
            None => load.await,
        }
    }
}
