use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::completion::CompletionClient;
use crate::error::CompletionError;
use crate::report::template::REPORT_SECTIONS;

const CANNED_REPLIES: [&str; 3] = [
    "Thank you for sharing that. How long have you been feeling this way?",
    "I hear you. What usually helps when things feel like this?",
    "Got it! How else can I help?",
];

/// Offline stand-in for a language model. Report prompts get a skeleton report, anything
/// else gets the next canned reply.
#[derive(Default)]
pub struct CannedCompletion {
    turns: AtomicUsize,
}

impl CannedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    fn skeleton_report() -> String {
        REPORT_SECTIONS
            .iter()
            .map(|section| format!("## {}\nNo concerns noted in the offline summary.", section))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl CompletionClient for CannedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if REPORT_SECTIONS
            .iter()
            .all(|section| prompt.contains(&format!("## {}", section)))
        {
            debug!("Answering report prompt with the offline skeleton");
            return Ok(Self::skeleton_report());
        }
        let turn = self.turns.fetch_add(1, Ordering::SeqCst);
        Ok(CANNED_REPLIES[turn % CANNED_REPLIES.len()].to_string())
    }
}
