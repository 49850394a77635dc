//! stellar: terminal chat with streamed replies, optional voice and a SQLite
//! conversation log.

pub mod chat;
pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod stream;
pub mod ui;
pub mod voice;

pub use error::{Error, Result};
