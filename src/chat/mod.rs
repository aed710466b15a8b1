pub mod controller;
pub mod message;
pub mod prompt;
pub mod session;

pub use controller::{ChatCommand, ChatSession, ChatSessionController, ChatSessionHandle};
pub use message::{Message, Sender};
pub use session::{ExportedMessage, Session, SessionExport, SessionStatus};
