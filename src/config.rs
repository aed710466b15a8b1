use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::Level;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub log_level: String,
    pub capture: CaptureConfiguration,
    pub detection: DetectionConfiguration,
    pub models: ModelConfiguration,
    pub completion: CompletionConfiguration,
    pub chat: ChatConfiguration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfiguration {
    pub tick_interval_ms: u64,
    pub inference_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfiguration {
    pub base_uri: String,
    pub load_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfiguration {
    /// Base URL of an OpenAI-compatible completion server. Unset means the canned backend.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfiguration {
    pub greeting: String,
    pub fallback_reply: String,
    pub closing_message: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            capture: CaptureConfiguration::default(),
            detection: DetectionConfiguration::default(),
            models: ModelConfiguration::default(),
            completion: CompletionConfiguration::default(),
            chat: ChatConfiguration::default(),
        }
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
        }
    }
}

impl Default for DetectionConfiguration {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            inference_timeout_ms: None,
        }
    }
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        Self {
            base_uri: "/models".to_string(),
            load_timeout_ms: None,
        }
    }
}

impl Default for CompletionConfiguration {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-3.5-turbo-instruct".to_string(),
            max_tokens: 1024,
            timeout_ms: 30_000,
        }
    }
}

impl Default for ChatConfiguration {
    fn default() -> Self {
        Self {
            greeting: "Hello! How can I assist you today?".to_string(),
            fallback_reply: "Got it! How else can I help?".to_string(),
            closing_message: "Thank you for talking with me today. Your session has ended and \
                              your summary is being prepared."
                .to_string(),
        }
    }
}

impl Configuration {
    const ENV_PREFIX: &'static str = "NEUROBUDDY";

    /// Layers an optional config file under `NEUROBUDDY_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let configuration: Configuration = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.max_log_level()?;

        if self.detection.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "Detection tick interval must be greater than 0".to_string(),
            ));
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(
                "Capture width and height must be greater than 0".to_string(),
            ));
        }

        if self.completion.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Completion timeout must be greater than 0".to_string(),
            ));
        }

        if self.detection.inference_timeout_ms == Some(0)
            || self.models.load_timeout_ms == Some(0)
        {
            return Err(ConfigError::Invalid(
                "Timeouts must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn max_log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Unknown log level '{}'", self.log_level)))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.detection.tick_interval_ms)
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.detection.inference_timeout_ms.map(Duration::from_millis)
    }

    pub fn model_load_timeout(&self) -> Option<Duration> {
        self.models.load_timeout_ms.map(Duration::from_millis)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion.timeout_ms)
    }
}
