pub mod board;
pub mod history;
pub mod item;
pub mod settings;
