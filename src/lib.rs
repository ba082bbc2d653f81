pub mod analysis;
pub mod classify;
pub mod gemini;
pub mod models;
pub mod service;
pub mod upload;

pub use service::{AppState, build_router, create_app};
pub use models::*;
