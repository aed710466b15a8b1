use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use neurobuddy::completion::{CompletionClient, HttpCompletionClient, TimeoutCompletion};
use neurobuddy::config::Configuration;
use neurobuddy::error::AppError;
use neurobuddy::sim::{CannedCompletion, ScriptedDetector, SimulatedModelLoader, SyntheticCamera};
use neurobuddy::{CoordinatorBuilder, DetectionStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};

const END_COMMAND: &str = "/end";

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn completion_backend(configuration: &Configuration) -> Arc<dyn CompletionClient> {
    let inner: Arc<dyn CompletionClient> = match &configuration.completion.endpoint {
        Some(endpoint) => {
            let client = HttpCompletionClient::new(endpoint, &configuration.completion);
            info!("Using completion endpoint {}", client.url());
            Arc::new(client)
        }
        None => {
            info!("No completion endpoint configured, using canned replies");
            Arc::new(CannedCompletion::new())
        }
    };
    Arc::new(TimeoutCompletion::new(
        inner,
        configuration.completion_timeout(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let configuration = Configuration::load(config_path.as_deref())?;
    init_logging(configuration.max_log_level()?);

    let mut coordinator = CoordinatorBuilder::new(configuration.clone())
        .camera(Arc::new(SyntheticCamera::new(Duration::from_millis(33))))
        .model_loader(Arc::new(SimulatedModelLoader::new(Duration::from_millis(200))))
        .face_detector(Arc::new(ScriptedDetector::default()))
        .completion(completion_backend(&configuration))
        .build()?;

    match coordinator.start_detection().await {
        DetectionStatus::Active => info!("Emotion detection running"),
        DetectionStatus::Degraded(reason) => warn!("{}", reason.user_message()),
    }

    println!("assistant: {}", configuration.chat.greeting);
    println!("(type {} to finish the session)", END_COMMAND);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == END_COMMAND {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let reply = coordinator.submit_user_turn(line).await?;
        println!("assistant: {}    [{}]", reply.text(), coordinator.emotion().display_label());
    }

    let report = coordinator.end_session().await?;
    match &report.content {
        Some(content) => println!("\n{}", content),
        None => println!("\nReport generation failed ({:?}).", report.status),
    }
    println!("\n{}", coordinator.export_json().await?);

    coordinator.shutdown().await?;
    Ok(())
}
