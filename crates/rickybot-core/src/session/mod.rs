//! Per-conversation session engines and the registry that owns them.

pub mod engine;
pub mod registry;

pub use engine::{ChatSessionEngine, EngineConfig, ResponseCallback};
pub use registry::SessionRegistry;
