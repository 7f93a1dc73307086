//! # Ambr Common Library
//!
//! Shared code for the ambient reading services including:
//! - Domain models (books, pages, scenes, soundscapes, reading progress)
//! - Event types (AmbrEvent enum) and the EventBus progress channel
//! - SQLite persistence
//! - Configuration loading
//! - Fade curve definitions used by the player

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod models;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
