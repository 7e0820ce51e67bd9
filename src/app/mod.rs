pub mod chat;
pub mod cli;

pub use chat::{build_catalog, build_router, run_chat, SqliteRouter};
pub use cli::run_cli;
