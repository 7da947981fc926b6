//! Library crate for scanboard-rs: scan submission, report fan-out, severity filtering and export.
pub mod aggregate;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod server;
pub mod types;
pub mod view;
