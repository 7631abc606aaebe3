//! Data layer module
//!
//! Handles all persistence:
//! - SQLite database operations
//! - Data models

mod database;
mod models;

pub use database::{
    ConversationChoice, Database, MaterializedRows, NewCustomEmoji, NewMediaAttachment, NewStatus,
};
pub use models::*;
