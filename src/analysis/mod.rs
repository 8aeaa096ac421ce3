pub mod git;
pub mod history;
pub mod patterns;
pub mod persist;
pub mod rewriter;
pub mod scanner;
