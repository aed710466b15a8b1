use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, info, instrument, warn};

use super::metrics::DetectionStats;
use crate::capture::{CameraSession, FrameSource};
use crate::emotion::{AggregatedEmotion, EmotionAggregator};
use crate::inference::{
    BoxedDetectionService, DetectionServiceBuilder, FaceDetection, ModelRegistry,
    into_inference_error,
};

type InferenceFuture =
    Pin<Box<dyn Future<Output = Result<Vec<FaceDetection>, BoxError>> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

struct RunningDetection {
    cancel_token: CancellationToken,
    task: JoinHandle<DetectionStats>,
}

/// Periodically runs inference against the open camera and publishes the dominant emotion.
///
/// At most one inference is outstanding at a time; ticks that arrive while one is in
/// flight are dropped. After [`DetectionScheduler::end`] returns, the loop has exited and
/// nothing it spawned can touch the published emotion again.
pub struct DetectionScheduler {
    tick_interval: Duration,
    inference_timeout: Option<Duration>,
    emotion: watch::Sender<AggregatedEmotion>,
    running: Option<RunningDetection>,
}

impl DetectionScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        let (emotion, _) = watch::channel(AggregatedEmotion::default());
        Self {
            tick_interval,
            inference_timeout: None,
            emotion,
            running: None,
        }
    }

    pub fn with_inference_timeout(mut self, inference_timeout: Option<Duration>) -> Self {
        self.inference_timeout = inference_timeout;
        self
    }

    pub fn state(&self) -> SchedulerState {
        match self.running {
            Some(_) => SchedulerState::Running,
            None => SchedulerState::Idle,
        }
    }

    pub fn emotion(&self) -> AggregatedEmotion {
        self.emotion.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregatedEmotion> {
        self.emotion.subscribe()
    }

    /// Starts ticking if the models are ready and the camera is open; otherwise a no-op.
    pub fn begin(&mut self, registry: &Arc<ModelRegistry>, camera: &CameraSession) -> SchedulerState {
        if self.running.is_some() {
            debug!("Detection already running");
            return SchedulerState::Running;
        }
        if !registry.is_ready() {
            warn!(
                "Not starting detection, models are {:?}",
                registry.state()
            );
            return SchedulerState::Idle;
        }
        let Some(frames) = camera.frame_source() else {
            warn!("Not starting detection, camera is closed");
            return SchedulerState::Idle;
        };

        let cancel_token = CancellationToken::new();
        let tick_loop = TickLoop {
            service: DetectionServiceBuilder::new(registry.clone())
                .inference_timeout(self.inference_timeout)
                .build(),
            frames,
            aggregator: EmotionAggregator::resume(self.emotion()),
            emotion: self.emotion.clone(),
            stats: DetectionStats::default(),
        };
        let task = tokio::spawn(tick_loop.run(self.tick_interval, cancel_token.clone()));
        info!("Detection started, ticking every {:?}", self.tick_interval);

        self.running = Some(RunningDetection { cancel_token, task });
        SchedulerState::Running
    }

    /// Signals the loop to stop without waiting for it. Prefer [`Self::end`].
    pub fn cancel(&self) {
        if let Some(running) = &self.running {
            running.cancel_token.cancel();
        }
    }

    /// Stops the loop and waits until it has exited.
    pub async fn end(&mut self) -> Option<DetectionStats> {
        let running = self.running.take()?;
        running.cancel_token.cancel();
        match running.task.await {
            Ok(stats) => {
                info!(
                    "Detection stopped after {} ticks ({} inferences, {} failures, {} skipped busy)",
                    stats.ticks, stats.inferences, stats.failures, stats.skipped_busy
                );
                Some(stats)
            }
            Err(e) => {
                warn!("Detection task did not shut down cleanly: {}", e);
                None
            }
        }
    }
}

impl Drop for DetectionScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel_token.cancel();
            running.task.abort();
        }
    }
}

struct TickLoop {
    service: BoxedDetectionService,
    frames: FrameSource,
    aggregator: EmotionAggregator,
    emotion: watch::Sender<AggregatedEmotion>,
    stats: DetectionStats,
}

impl TickLoop {
    async fn run(mut self, tick_interval: Duration, cancel_token: CancellationToken) -> DetectionStats {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<InferenceFuture> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Detection loop cancelled");
                    break;
                }
                result = wait_in_flight(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.apply(result);
                }
                _ = ticker.tick() => {
                    self.stats.record_tick();
                    if in_flight.is_some() {
                        self.stats.record_busy_skip();
                        debug!("Previous inference still running, skipping tick");
                    } else {
                        in_flight = self.dispatch().await;
                    }
                }
            }
        }

        // dropping an unfinished inference here discards its result
        drop(in_flight);
        self.stats
    }

    async fn dispatch(&mut self) -> Option<InferenceFuture> {
        let Some(frame) = self.frames.latest() else {
            self.stats.record_missing_frame();
            return None;
        };
        match self.service.ready().await {
            Ok(service) => Some(service.call(frame)),
            Err(e) => {
                self.stats.record_inference(false);
                warn!("Detection service unavailable: {}", e);
                None
            }
        }
    }

    #[instrument(skip_all)]
    fn apply(&mut self, result: Result<Vec<FaceDetection>, BoxError>) {
        match result {
            Ok(detections) => {
                self.stats.record_inference(true);
                // only the first detected face drives the emotion
                let expressions = detections.first().map(|face| &face.expressions);
                if self.aggregator.update(expressions) {
                    self.stats.record_emotion_change();
                    let current = self.aggregator.current().clone();
                    debug!("Dominant emotion is now {}", current.display_label());
                    self.emotion.send_replace(current);
                }
            }
            Err(e) => {
                self.stats.record_inference(false);
                warn!("Error in detection loop: {}", into_inference_error(e));
            }
        }
    }
}

async fn wait_in_flight(
    in_flight: &mut Option<InferenceFuture>,
) -> Result<Vec<FaceDetection>, BoxError> {
    match in_flight {
        Some(inference) => inference.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConstraints;
    use crate::capture::camera_session::tests::ManualCamera;
    use crate::common::Frame;
    use crate::error::InferenceError;
    use crate::inference::model_registry::tests::CountingLoader;
    use crate::inference::{BoundingBox, Expressions, FaceDetector};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedFaces {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        fail_first: bool,
        expressions: Expressions,
    }

    impl ScriptedFaces {
        fn new(delay: Duration, expressions: &[(&str, f32)]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
                fail_first: false,
                expressions: expressions
                    .iter()
                    .map(|(label, confidence)| (label.to_string(), *confidence))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl FaceDetector for ScriptedFaces {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<FaceDetection>, InferenceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(InferenceError::Detector("corrupt frame".to_string()));
            }
            Ok(vec![FaceDetection {
                bounding_box: BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: 100.0,
                    height: 100.0,
                },
                expressions: self.expressions.clone(),
            }])
        }
    }

    async fn setup(
        detector: Arc<ScriptedFaces>,
    ) -> (Arc<ModelRegistry>, Arc<ManualCamera>, CameraSession) {
        let registry = Arc::new(ModelRegistry::new(
            Arc::new(CountingLoader::new()),
            detector,
            "/models",
        ));
        registry.load().await.unwrap();
        let device = Arc::new(ManualCamera::new());
        let mut camera = CameraSession::new(device.clone());
        camera.start(&CaptureConstraints::default()).await.unwrap();
        device.push_frame(320, 240);
        (registry, device, camera)
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_one_inference_in_flight() {
        let detector = Arc::new(ScriptedFaces::new(
            Duration::from_millis(250),
            &[("happy", 0.8)],
        ));
        let (registry, _device, camera) = setup(detector.clone()).await;
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));

        assert_eq!(scheduler.begin(&registry, &camera), SchedulerState::Running);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stats = scheduler.end().await.unwrap();

        assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(detector.calls.load(Ordering::SeqCst) >= 2);
        assert!(stats.skipped_busy > 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_effect_after_end() {
        let detector = Arc::new(ScriptedFaces::new(
            Duration::from_millis(50),
            &[("happy", 0.8), ("sad", 0.1)],
        ));
        let (registry, _device, camera) = setup(detector.clone()).await;
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));
        let mut emotion_rx = scheduler.subscribe();

        scheduler.begin(&registry, &camera);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // first inference is still outstanding when the scheduler ends
        scheduler.end().await;
        let calls = detector.calls.load(Ordering::SeqCst);
        emotion_rx.mark_unchanged();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(detector.calls.load(Ordering::SeqCst), calls);
        assert!(!emotion_rx.has_changed().unwrap());
        assert_eq!(scheduler.emotion(), AggregatedEmotion::default());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_the_dominant_emotion() {
        let detector = Arc::new(ScriptedFaces::new(
            Duration::from_millis(10),
            &[("happy", 0.8), ("sad", 0.1)],
        ));
        let (registry, _device, camera) = setup(detector).await;
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));

        scheduler.begin(&registry, &camera);
        tokio::time::sleep(Duration::from_millis(350)).await;
        scheduler.end().await;

        assert_eq!(
            scheduler.emotion(),
            AggregatedEmotion {
                label: "happy".to_string(),
                confidence: 0.8
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_inference_does_not_stop_the_loop() {
        let detector = Arc::new(ScriptedFaces {
            fail_first: true,
            ..ScriptedFaces::new(Duration::from_millis(10), &[("surprised", 0.7)])
        });
        let (registry, _device, camera) = setup(detector.clone()).await;
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));

        scheduler.begin(&registry, &camera);
        tokio::time::sleep(Duration::from_millis(550)).await;
        let stats = scheduler.end().await.unwrap();

        assert_eq!(stats.failures, 1);
        assert!(stats.inferences >= 1);
        assert_eq!(scheduler.emotion().label, "surprised");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_without_a_frame_are_skipped() {
        let detector = Arc::new(ScriptedFaces::new(Duration::from_millis(10), &[("happy", 0.8)]));
        let registry = Arc::new(ModelRegistry::new(
            Arc::new(CountingLoader::new()),
            detector.clone(),
            "/models",
        ));
        registry.load().await.unwrap();
        let mut camera = CameraSession::new(Arc::new(ManualCamera::new()));
        camera.start(&CaptureConstraints::default()).await.unwrap();
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));

        scheduler.begin(&registry, &camera);
        tokio::time::sleep(Duration::from_millis(450)).await;
        let stats = scheduler.end().await.unwrap();

        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.skipped_no_frame, stats.ticks);
    }

    #[tokio::test]
    async fn begin_is_a_no_op_without_ready_models_or_camera() {
        let detector = Arc::new(ScriptedFaces::new(Duration::ZERO, &[]));
        let registry = Arc::new(ModelRegistry::new(
            Arc::new(CountingLoader::new()),
            detector,
            "/models",
        ));
        let device = Arc::new(ManualCamera::new());
        let mut camera = CameraSession::new(device);
        let mut scheduler = DetectionScheduler::new(Duration::from_millis(100));

        camera.start(&CaptureConstraints::default()).await.unwrap();
        assert_eq!(scheduler.begin(&registry, &camera), SchedulerState::Idle);

        registry.load().await.unwrap();
        camera.stop();
        assert_eq!(scheduler.begin(&registry, &camera), SchedulerState::Idle);
        assert!(scheduler.end().await.is_none());
    }
}
