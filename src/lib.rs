pub mod agent;
pub mod bridge;
pub mod config;
pub mod credential;
pub mod docstore;
pub mod error;
pub mod http;
pub mod logger;
pub mod manager;
pub mod session;
pub mod telemetry;
pub mod tool;
pub mod upstream;
