pub mod base;
pub mod errors;
pub mod ollama;
