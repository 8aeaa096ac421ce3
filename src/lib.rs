pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;

pub use commands::board::{Board, SharedBoard};
pub use error::{KodoError, Result};
