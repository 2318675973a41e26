pub mod backend;
pub mod chat;
pub mod config;
pub mod documents;
pub mod error;
pub mod render;
pub mod state;

// Re-export main types for convenience
pub use backend::{check_health, Backend, HealthStatus, HttpBackend, RawResponse};
pub use chat::{ChatSession, ChatState, SendOutcome, FALLBACK_NOTICE};
pub use config::Config;
pub use documents::{
    deliver, DirectorySaver, DocumentGenerator, DocumentKind, DownloadedFile, GenerationOutcome,
    SaveTarget,
};
pub use error::ClientError;
pub use render::{plain_text, segment, segment_message, RenderToken, Segments};
pub use state::{ChatMessage, ChatRole, Conversation};
