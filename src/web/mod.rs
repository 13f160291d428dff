//! Web interface for taskmind.
//!
//! A local HTTP server with a task list page, a JSON task API, status
//! toggling, and the insights page backed by the local model.

mod pages;
mod server;

pub use server::{AppState, DEFAULT_PORT, ListQuery, build_router, start_server};
