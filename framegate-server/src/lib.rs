//! # framegate-server
//!
//! TCP server for framegate.
//!
//! This crate provides:
//! - The accept loop and per-connection tasks
//! - The per-connection decoding pipeline with protocol auto-commit
//! - Request routing (PING/echo) and response write-back
//! - Configuration, idle timeout and graceful shutdown

pub mod config;
pub mod error;
pub mod pipeline;
pub mod router;
pub mod server;

pub use config::{Config, ConfigError, FramingMode, TcpConfig};
pub use error::ServerError;
pub use pipeline::{ConnectionPipeline, Inbound};
pub use router::RequestRouter;
pub use server::{Server, ServerStats};
