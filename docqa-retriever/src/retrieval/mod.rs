pub mod answer;
pub mod chunking_strategy;
pub mod extract;
pub mod knowledge_base;
pub mod scanner;
pub mod watcher;
