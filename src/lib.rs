// Re-export needed modules for testing
pub mod config;
pub mod conversation; // Ephemeral message lifecycle
pub mod models;
pub mod names;
pub mod notepad;
pub mod power_exit;
pub mod seed;
pub mod session;
pub mod storage;
pub mod timer;

// Re-export main types for convenience
pub use conversation::{Conversation, ConversationConfig, PumpReport, Visibility};
pub use models::*;
pub use timer::{Clock, ManualClock, SystemClock};
