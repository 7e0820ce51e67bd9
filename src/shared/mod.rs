pub mod fs_atomic;
pub mod ids;
pub mod logging;

pub use ids::ConversationId;
pub use logging::{now_secs, EngineLog};
