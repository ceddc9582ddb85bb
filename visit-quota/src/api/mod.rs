//! REST API module for visit-quota
//!
//! Lets the host platform run the gate and manage settings over HTTP

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{router, ApiServer};
