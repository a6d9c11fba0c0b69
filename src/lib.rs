// Library crate: the orchestration layer plus everything the CLI and the
// integration tests need.

pub mod client;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod enrichment;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod normalize;
pub mod state;
pub mod store;
pub mod testing;
