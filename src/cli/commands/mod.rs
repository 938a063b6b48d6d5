//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod list;
mod process;
mod remove;
mod serve;
mod topics;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use list::run_list;
pub use process::run_process;
pub use remove::run_remove;
pub use serve::{router, run_serve};
pub use topics::run_topics;
