use thiserror::Error;

use crate::inference::ModelKind;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Capture Error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Model Load Error: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("Inference Error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Completion Error: {0}")]
    Completion(#[from] CompletionError),
    #[error("Session Error: {0}")]
    Session(#[from] SessionError),
    #[error("Report Error: {0}")]
    Report(#[from] ReportError),
    #[error("Form Error: {0}")]
    Form(#[from] FormError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

// Camera acquisition errors. Both leave the camera closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera access was denied")]
    PermissionDenied,
    #[error("No camera device is available: {0}")]
    DeviceUnavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("Failed to load {kind} from {source_uri}: {reason}")]
    Fetch {
        kind: ModelKind,
        source_uri: String,
        reason: String,
    },
    #[error("Loading {0} timed out")]
    Timeout(ModelKind),
    #[error("Model loading stopped before it finished")]
    Abandoned,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Inference requested before the models are ready")]
    ModelNotReady,
    #[error("Detector failed: {0}")]
    Detector(String),
    #[error("Inference timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Request(String),
    #[error("Completion endpoint answered with status {0}")]
    Status(u16),
    #[error("Completion response was malformed: {0}")]
    Malformed(String),
    #[error("Completion timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("The session has ended and no longer accepts messages")]
    SessionEnded,
    #[error("Message text is empty")]
    EmptyMessage,
    #[error("The chat session controller is no longer running")]
    ControllerClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("A report can only be generated once the session has ended")]
    SessionNotEnded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Field '{0}' is required")]
    MissingField(&'static str),
    #[error("Age must be a whole number, got '{0}'")]
    InvalidAge(String),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("Consent to data collection is required")]
    ConsentRequired,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
