use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::template::report_prompt;
use crate::chat::Session;
use crate::completion::CompletionClient;
use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: Uuid,
    pub status: ReportStatus,
    /// Generated markdown. Only meaningful when `status` is `Ready`.
    pub content: Option<String>,
}

impl Report {
    fn pending(session_id: Uuid) -> Self {
        Self {
            session_id,
            status: ReportStatus::Pending,
            content: None,
        }
    }

    fn ready(session_id: Uuid, content: String) -> Self {
        Self {
            session_id,
            status: ReportStatus::Ready,
            content: Some(content),
        }
    }

    fn failed(session_id: Uuid) -> Self {
        Self {
            session_id,
            status: ReportStatus::Failed,
            content: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReportStatus::Ready
    }
}

/// Turns an ended session into a markdown report via the completion capability.
///
/// There is no automatic retry; calling [`Self::generate`] again is the retry.
pub struct ReportRequestOrchestrator {
    completion: Arc<dyn CompletionClient>,
    latest: watch::Sender<Option<Report>>,
    generating: Mutex<()>,
}

impl ReportRequestOrchestrator {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            completion,
            latest,
            generating: Mutex::new(()),
        }
    }

    pub fn latest(&self) -> Option<Report> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Report>> {
        self.latest.subscribe()
    }

    /// Fails only on the precondition; a completion failure yields a `Failed` report.
    pub async fn generate(&self, session: &Session) -> Result<Report, ReportError> {
        if !session.is_ended() {
            warn!(
                "Report requested for session {} which is still collecting",
                session.id()
            );
            return Err(ReportError::SessionNotEnded);
        }

        // a retry issued while a request is outstanding waits for it
        let _generating = self.generating.lock().await;
        self.latest.send_replace(Some(Report::pending(session.id())));
        info!("Generating report for session {}", session.id());

        let report = match self.completion.complete(&report_prompt(session)).await {
            Ok(content) if !content.trim().is_empty() => {
                info!("Report ready for session {}", session.id());
                Report::ready(session.id(), content)
            }
            Ok(_) => {
                error!("Report for session {} came back empty", session.id());
                Report::failed(session.id())
            }
            Err(e) => {
                error!("Report generation failed for session {}: {}", session.id(), e);
                Report::failed(session.id())
            }
        };
        self.latest.send_replace(Some(report.clone()));
        Ok(report)
    }
}
