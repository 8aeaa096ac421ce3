pub mod board;
pub mod history;
pub mod settings;
