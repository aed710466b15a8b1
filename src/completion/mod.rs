pub mod client;
pub mod http;

pub use client::{CompletionClient, TimeoutCompletion};
pub use http::HttpCompletionClient;
