//! Helper library for native applications speaking MoQT.
//!
//! Makes it easy to establish connections over:
//! - WebTransport (via HTTP/3)
//! - raw QUIC (via the `moq-00` ALPN)
//!
//! Includes TLS provisioning, optional logging, and configuration.

mod client;
mod crypto;
mod log;
mod quic;
mod server;
mod web;

pub use client::*;
pub use log::*;
pub use quic::*;
pub use server::*;
pub use web::*;

// Re-export these crates.
pub use moqt;
pub use rustls;
pub use web_transport_quinn;
