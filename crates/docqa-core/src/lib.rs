pub mod chunker;
pub mod config;
pub mod cost;
pub mod error;
pub mod retry;
pub mod source;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
