//! WebSocket subscriber transport
//!
//! Each accepted TCP connection is upgraded to a WebSocket. Its write half
//! becomes a [`WsSink`] registered with the pipeline's connection manager;
//! its read half is only watched for close.

pub mod config;
pub mod listener;
pub mod sink;

pub use config::ServerConfig;
pub use listener::TelemetryServer;
pub use sink::WsSink;
