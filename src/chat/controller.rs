use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::Message;
use super::prompt::chat_prompt;
use super::session::Session;
use crate::completion::CompletionClient;
use crate::config::ChatConfiguration;
use crate::emotion::AggregatedEmotion;
use crate::error::SessionError;

pub enum ChatCommand {
    SubmitTurn {
        text: String,
        responder: oneshot::Sender<Result<Message, SessionError>>,
    },
    RecordEmotion {
        emotion: AggregatedEmotion,
        responder: oneshot::Sender<Result<(), SessionError>>,
    },
    EndSession {
        responder: oneshot::Sender<bool>,
    },
    Snapshot {
        responder: oneshot::Sender<Session>,
    },
}

/// Conversation state plus the assistant that answers it.
pub struct ChatSession {
    session: Session,
    completion: Arc<dyn CompletionClient>,
    fallback_reply: String,
    closing_message: String,
}

impl ChatSession {
    pub fn new(completion: Arc<dyn CompletionClient>, configuration: &ChatConfiguration) -> Self {
        Self {
            session: Session::with_greeting(&configuration.greeting),
            completion,
            fallback_reply: configuration.fallback_reply.clone(),
            closing_message: configuration.closing_message.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Appends the user's message and the assistant's answer, returning the answer.
    ///
    /// A failed completion is answered with the fixed fallback reply.
    pub async fn submit_user_turn(&mut self, text: &str) -> Result<Message, SessionError> {
        if self.session.is_ended() {
            warn!("Rejected a turn for ended session {}", self.session.id());
            return Err(SessionError::SessionEnded);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.session.append(Message::user(text))?;
        let prompt = chat_prompt(self.session.messages());

        let reply = match self.completion.complete(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => Message::assistant(reply.trim()),
            Ok(_) => {
                warn!("Completion returned an empty reply, using fallback");
                Message::assistant(self.fallback_reply.as_str())
            }
            Err(e) => {
                error!("Completion failed, using fallback: {}", e);
                Message::assistant(self.fallback_reply.as_str())
            }
        };
        self.session.append(reply.clone())?;
        debug!(
            "Session {} now has {} messages",
            self.session.id(),
            self.session.messages().len()
        );
        Ok(reply)
    }

    pub fn record_emotion(&mut self, emotion: AggregatedEmotion) -> Result<(), SessionError> {
        self.session.record_emotion(emotion)
    }

    pub fn end_session(&mut self) -> bool {
        self.session.end(&self.closing_message)
    }

    pub async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::SubmitTurn { text, responder } => {
                let result = self.submit_user_turn(&text).await;
                let _ = responder.send(result);
            }
            ChatCommand::RecordEmotion { emotion, responder } => {
                let _ = responder.send(self.record_emotion(emotion));
            }
            ChatCommand::EndSession { responder } => {
                let _ = responder.send(self.end_session());
            }
            ChatCommand::Snapshot { responder } => {
                let _ = responder.send(self.session.clone());
            }
        }
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Runs a [`ChatSession`] on its own task. Commands are handled strictly in the order they
/// were sent, so a turn submitted while another is pending waits for it.
pub struct ChatSessionController {
    task: JoinHandle<Session>,
}

#[derive(Clone)]
pub struct ChatSessionHandle {
    command_tx: mpsc::Sender<ChatCommand>,
}

impl ChatSessionController {
    const COMMAND_BUFFER: usize = 32;

    pub fn spawn(mut chat: ChatSession) -> (Self, ChatSessionHandle) {
        let (command_tx, mut command_rx) = mpsc::channel(Self::COMMAND_BUFFER);
        let task = tokio::spawn(async move {
            info!("Chat session {} started", chat.session().id());
            while let Some(command) = command_rx.recv().await {
                chat.handle_command(command).await;
            }
            debug!("Chat session {} controller stopped", chat.session().id());
            chat.into_session()
        });
        (Self { task }, ChatSessionHandle { command_tx })
    }

    /// Waits for every handle to be dropped and returns the final session.
    pub async fn join(self) -> Option<Session> {
        match self.task.await {
            Ok(session) => Some(session),
            Err(e) => {
                error!("Chat session task died: {}", e);
                None
            }
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl ChatSessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ChatCommand,
    ) -> Result<T, SessionError> {
        let (responder, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(responder))
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        response_rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    pub async fn submit_user_turn(&self, text: impl Into<String>) -> Result<Message, SessionError> {
        let text = text.into();
        self.request(|responder| ChatCommand::SubmitTurn { text, responder })
            .await?
    }

    pub async fn record_emotion(&self, emotion: AggregatedEmotion) -> Result<(), SessionError> {
        self.request(|responder| ChatCommand::RecordEmotion { emotion, responder })
            .await?
    }

    /// Ends the session. `Ok(false)` means it had already ended.
    pub async fn end_session(&self) -> Result<bool, SessionError> {
        self.request(|responder| ChatCommand::EndSession { responder })
            .await
    }

    pub async fn snapshot(&self) -> Result<Session, SessionError> {
        self.request(|responder| ChatCommand::Snapshot { responder })
            .await
    }
}
