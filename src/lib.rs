pub mod cli;
pub mod config;
pub mod demand;
pub mod filter;
pub mod ingestor;
pub mod logging;
pub mod observer;
pub mod parser;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
