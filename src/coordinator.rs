use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::capture::{CameraSession, CaptureConstraints, CaptureDevice};
use crate::chat::{ChatSession, ChatSessionController, ChatSessionHandle, Message, Session};
use crate::completion::CompletionClient;
use crate::config::Configuration;
use crate::detection::{DetectionScheduler, DetectionStats, SchedulerState};
use crate::emotion::AggregatedEmotion;
use crate::error::{AppError, ConfigError, FormError, ModelLoadError, SessionError};
use crate::inference::{FaceDetector, ModelLoader, ModelRegistry, ModelState};
use crate::intake::IntakeForm;
use crate::report::{Report, ReportRequestOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    ModelsUnavailable,
    CameraUnavailable,
}

impl DegradedReason {
    /// Text shown to the user; the chat keeps working either way.
    pub fn user_message(&self) -> &'static str {
        match self {
            DegradedReason::ModelsUnavailable => "Failed to load emotion detection models.",
            DegradedReason::CameraUnavailable => {
                "Could not access camera. Please ensure you have granted camera permissions."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    Active,
    Degraded(DegradedReason),
}

/// Owns one intake session end to end: camera, models, detection loop, chat and report.
///
/// Detection is always stopped before the camera is released, so no tick can run against
/// a closed stream.
pub struct SessionCoordinator {
    registry: Arc<ModelRegistry>,
    camera: CameraSession,
    constraints: CaptureConstraints,
    scheduler: DetectionScheduler,
    chat_controller: ChatSessionController,
    chat: ChatSessionHandle,
    reports: ReportRequestOrchestrator,
}

impl SessionCoordinator {
    pub async fn prepare_models(&self) -> Result<ModelState, ModelLoadError> {
        self.registry.load().await
    }

    /// Loads the models, opens the camera and starts ticking.
    ///
    /// Failures degrade to a status the caller can show; they never end the session.
    pub async fn start_detection(&mut self) -> DetectionStatus {
        if let Err(e) = self.prepare_models().await {
            warn!("Detection unavailable: {}", e);
            return DetectionStatus::Degraded(DegradedReason::ModelsUnavailable);
        }
        if let Err(e) = self.camera.start(&self.constraints).await {
            warn!("Detection unavailable: {}", e);
            return DetectionStatus::Degraded(DegradedReason::CameraUnavailable);
        }
        match self.scheduler.begin(&self.registry, &self.camera) {
            SchedulerState::Running => DetectionStatus::Active,
            SchedulerState::Idle => DetectionStatus::Degraded(DegradedReason::CameraUnavailable),
        }
    }

    /// Stops the loop, waits for it to exit, then releases the camera.
    pub async fn stop_detection(&mut self) -> Option<DetectionStats> {
        let stats = self.scheduler.end().await;
        self.camera.stop();
        stats
    }

    pub fn is_detecting(&self) -> bool {
        self.scheduler.state() == SchedulerState::Running
    }

    pub fn emotion(&self) -> AggregatedEmotion {
        self.scheduler.emotion()
    }

    pub fn subscribe_emotion(&self) -> watch::Receiver<AggregatedEmotion> {
        self.scheduler.subscribe()
    }

    pub async fn submit_user_turn(&self, text: impl Into<String>) -> Result<Message, SessionError> {
        self.chat.submit_user_turn(text).await
    }

    pub async fn session(&self) -> Result<Session, SessionError> {
        self.chat.snapshot().await
    }

    /// Freezes the emotion, closes the conversation and asks for the report.
    ///
    /// Calling it again on an ended session only regenerates the report.
    pub async fn end_session(&mut self) -> Result<Report, AppError> {
        self.stop_detection().await;
        match self.chat.record_emotion(self.emotion()).await {
            Ok(()) | Err(SessionError::SessionEnded) => {}
            Err(e) => return Err(e.into()),
        }
        if !self.chat.end_session().await? {
            info!("Session already ended, regenerating report");
        }
        self.retry_report().await
    }

    pub async fn retry_report(&self) -> Result<Report, AppError> {
        let session = self.chat.snapshot().await?;
        Ok(self.reports.generate(&session).await?)
    }

    pub fn report(&self) -> Option<Report> {
        self.reports.latest()
    }

    pub async fn export_json(&self) -> Result<String, AppError> {
        Ok(self.chat.snapshot().await?.to_json()?)
    }

    /// Validates the form, stops detection and stamps the final emotion into it.
    ///
    /// An invalid form leaves detection running.
    pub async fn submit_form(&mut self, form: IntakeForm) -> Result<IntakeForm, FormError> {
        form.validate()?;
        self.stop_detection().await;
        form.submit(&self.emotion())
    }

    /// Stops detection and returns the conversation as it stands.
    pub async fn shutdown(mut self) -> Result<Session, SessionError> {
        self.stop_detection().await;
        self.chat.snapshot().await
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.camera.stop();
        self.chat_controller.abort();
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    camera: Option<Arc<dyn CaptureDevice>>,
    model_loader: Option<Arc<dyn ModelLoader>>,
    face_detector: Option<Arc<dyn FaceDetector>>,
    completion: Option<Arc<dyn CompletionClient>>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            camera: None,
            model_loader: None,
            face_detector: None,
            completion: None,
        }
    }

    pub fn camera(mut self, camera: Arc<dyn CaptureDevice>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn model_loader(mut self, model_loader: Arc<dyn ModelLoader>) -> Self {
        self.model_loader = Some(model_loader);
        self
    }

    pub fn face_detector(mut self, face_detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(face_detector);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(completion);
        self
    }

    // Overrides the tick interval from the configuration.
    pub fn tick_interval_ms(mut self, tick_interval_ms: u64) -> Self {
        self.configuration.detection.tick_interval_ms = tick_interval_ms;
        self
    }

    /// Spawns the chat controller, so this must run inside a tokio runtime.
    pub fn build(self) -> Result<SessionCoordinator, AppError> {
        self.configuration.validate()?;
        let camera = self.camera.ok_or_else(|| missing("camera"))?;
        let model_loader = self.model_loader.ok_or_else(|| missing("model loader"))?;
        let face_detector = self.face_detector.ok_or_else(|| missing("face detector"))?;
        let completion = self.completion.ok_or_else(|| missing("completion client"))?;

        let configuration = &self.configuration;
        let registry = ModelRegistry::new(model_loader, face_detector, &configuration.models.base_uri)
            .with_load_timeout(configuration.model_load_timeout());
        let scheduler = DetectionScheduler::new(configuration.tick_interval())
            .with_inference_timeout(configuration.inference_timeout());
        let (chat_controller, chat) =
            ChatSessionController::spawn(ChatSession::new(completion.clone(), &configuration.chat));

        Ok(SessionCoordinator {
            registry: Arc::new(registry),
            camera: CameraSession::new(camera),
            constraints: CaptureConstraints::from(&configuration.capture),
            scheduler,
            chat_controller,
            chat,
            reports: ReportRequestOrchestrator::new(completion),
        })
    }
}

fn missing(part: &str) -> ConfigError {
    ConfigError::Invalid(format!("coordinator needs a {}", part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::camera_session::tests::ManualCamera;
    use crate::chat::{SessionExport, SessionStatus};
    use crate::completion::client::tests::ScriptedCompletion;
    use crate::error::{CaptureError, CompletionError};
    use crate::inference::ModelKind;
    use crate::inference::model_registry::tests::CountingLoader;
    use crate::report::ReportStatus;
    use crate::sim::ScriptedDetector;
    use std::sync::atomic::Ordering;

    struct Fixture {
        camera: Arc<ManualCamera>,
        completion: Arc<ScriptedCompletion>,
        coordinator: SessionCoordinator,
    }

    fn fixture(
        camera: ManualCamera,
        loader: CountingLoader,
        answers: Vec<Result<String, CompletionError>>,
    ) -> Fixture {
        let camera = Arc::new(camera);
        let completion = Arc::new(ScriptedCompletion::new(answers));
        let coordinator = CoordinatorBuilder::new(Configuration::default())
            .camera(camera.clone())
            .model_loader(Arc::new(loader))
            .face_detector(Arc::new(ScriptedDetector::new(vec!["happy".to_string()], 1)))
            .completion(completion.clone())
            .build()
            .unwrap();
        Fixture {
            camera,
            completion,
            coordinator,
        }
    }

    #[tokio::test]
    async fn build_requires_every_backend() {
        let result = CoordinatorBuilder::new(Configuration::default())
            .camera(Arc::new(ManualCamera::new()))
            .build();
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn detection_publishes_emotion_and_releases_camera_on_stop() {
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(ManualCamera::new(), CountingLoader::new(), Vec::new());
        let mut emotion = coordinator.subscribe_emotion();

        assert_eq!(coordinator.start_detection().await, DetectionStatus::Active);
        camera.push_frame(320, 240);
        emotion.changed().await.unwrap();
        assert_eq!(coordinator.emotion().label, "happy");

        let stats = coordinator.stop_detection().await.unwrap();
        assert!(stats.inferences >= 1);
        assert!(!coordinator.is_detecting());
        assert_eq!(camera.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn model_failure_degrades_without_opening_the_camera() {
        let loader = CountingLoader {
            fail_on: Some(ModelKind::FaceExpressionNet),
            ..CountingLoader::new()
        };
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(ManualCamera::new(), loader, vec![Ok("Tell me more.".to_string())]);

        let status = coordinator.start_detection().await;

        assert_eq!(
            status,
            DetectionStatus::Degraded(DegradedReason::ModelsUnavailable)
        );
        assert_eq!(
            DegradedReason::ModelsUnavailable.user_message(),
            "Failed to load emotion detection models."
        );
        assert_eq!(camera.acquired.load(Ordering::SeqCst), 0);
        // chat is unaffected
        let reply = coordinator.submit_user_turn("hello").await.unwrap();
        assert_eq!(reply.text(), "Tell me more.");
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_degrades() {
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(
            ManualCamera::failing(CaptureError::PermissionDenied),
            CountingLoader::new(),
            Vec::new(),
        );

        assert_eq!(
            coordinator.start_detection().await,
            DetectionStatus::Degraded(DegradedReason::CameraUnavailable)
        );
        assert!(!coordinator.is_detecting());
        assert_eq!(camera.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_freezes_emotion_and_generates_report() {
        let Fixture {
            camera,
            completion,
            mut coordinator,
        } = fixture(
            ManualCamera::new(),
            CountingLoader::new(),
            vec![
                Ok("How long has that been going on?".to_string()),
                Ok("## Session Overview\nUpbeat.".to_string()),
            ],
        );
        coordinator.start_detection().await;
        let mut emotion = coordinator.subscribe_emotion();
        camera.push_frame(320, 240);
        emotion.changed().await.unwrap();

        coordinator.submit_user_turn("I feel great").await.unwrap();
        let report = coordinator.end_session().await.unwrap();

        assert_eq!(report.status, ReportStatus::Ready);
        assert_eq!(coordinator.report(), Some(report));
        assert!(!coordinator.is_detecting());
        assert_eq!(camera.released.load(Ordering::SeqCst), 1);

        let session = coordinator.session().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Ended);
        assert_eq!(session.final_emotion().label, "happy");
        assert!(completion.prompts()[1].contains("Facial affect observed during intake: happy"));

        let export: SessionExport =
            serde_json::from_str(&coordinator.export_json().await.unwrap()).unwrap();
        assert_eq!(export.final_emotion, "happy");
        assert_eq!(
            coordinator.submit_user_turn("one more thing").await,
            Err(SessionError::SessionEnded)
        );
    }

    #[tokio::test]
    async fn failed_report_can_be_retried() {
        let Fixture { coordinator, .. } = fixture(
            ManualCamera::new(),
            CountingLoader::new(),
            vec![
                Err(CompletionError::Timeout(30_000)),
                Ok("## Session Overview".to_string()),
            ],
        );
        let mut coordinator = coordinator;

        let report = coordinator.end_session().await.unwrap();
        assert_eq!(report.status, ReportStatus::Failed);

        let report = coordinator.retry_report().await.unwrap();
        assert_eq!(report.status, ReportStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_form_keeps_detection_running() {
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(ManualCamera::new(), CountingLoader::new(), Vec::new());
        coordinator.start_detection().await;

        let result = coordinator.submit_form(IntakeForm::default()).await;

        assert_eq!(result, Err(FormError::MissingField("name")));
        assert!(coordinator.is_detecting());
        assert_eq!(camera.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_form_carries_the_detected_emotion() {
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(ManualCamera::new(), CountingLoader::new(), Vec::new());
        coordinator.start_detection().await;
        let mut emotion = coordinator.subscribe_emotion();
        camera.push_frame(320, 240);
        emotion.changed().await.unwrap();

        let form = IntakeForm {
            name: "Ada".to_string(),
            age: "34".to_string(),
            sex: "female".to_string(),
            location: "Lisbon".to_string(),
            email: "ada@example.com".to_string(),
            consent: true,
            ..IntakeForm::default()
        };
        let submitted = coordinator.submit_form(form).await.unwrap();

        assert_eq!(submitted.emotion, "happy");
        assert!(!coordinator.is_detecting());
        assert_eq!(camera.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_coordinator_releases_the_camera() {
        let Fixture {
            camera,
            mut coordinator,
            ..
        } = fixture(ManualCamera::new(), CountingLoader::new(), Vec::new());
        coordinator.start_detection().await;

        drop(coordinator);

        assert_eq!(camera.released.load(Ordering::SeqCst), 1);
    }
}
