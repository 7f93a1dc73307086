//! HTTP API handlers for ambr-pipeline
//!
//! Thin plumbing over the orchestrator: accept books, report status, serve
//! the playback timeline and reading progress, stream progress events.

pub mod books;
pub mod health;
pub mod progress;
pub mod scenes;
pub mod sse;

pub use books::book_routes;
pub use health::health_routes;
pub use progress::progress_routes;
pub use scenes::scene_routes;
pub use sse::event_stream;
