pub mod chunker;
pub mod config;
pub mod embedding;
pub mod llm;
