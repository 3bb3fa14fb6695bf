//! Completion provider abstraction and HTTP client.

mod completion;

pub use completion::{CompletionClient, CompletionError, CompletionProvider};
