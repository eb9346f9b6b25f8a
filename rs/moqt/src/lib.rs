//! # moqt: Media over QUIC Transport
//!
//! A publish/subscribe transport for real-time media, built on QUIC or
//! WebTransport streams. Broadcasts are identified by absolute paths and carry
//! named tracks; a track is a sequence of groups and a group is a sequence of
//! frames, each group delivered on its own unidirectional stream.
//!
//! ## API
//!
//! The API is built around writer/reader pairs:
//! - [TrackMux]: routes broadcast paths to handlers and fans announcements out to watchers.
//! - [Session]: one connection, speaking both the publisher and subscriber roles.
//! - [model::Track]: a named sequence of groups within a broadcast.
//! - [model::GroupWriter] / [model::GroupReader]: ordered frames within one group.
//!
//! To publish:
//! - [TrackMux::publish] (or [Session::publish]) to register a handler and announce the path.
//! - The handler receives a [model::TrackWriter] per subscription.
//! - [model::TrackWriter::append_group] per group of pictures, then
//!   [model::GroupWriter::write_frame] for each encoded frame.
//!
//! To consume:
//! - [Session::announced] to discover broadcasts matching a [TrackPattern].
//! - [Session::subscribe] to get a [model::TrackReader].
//! - [model::TrackReader::accept_group] then [model::GroupReader::read_frame].
//!
//! Relays combine both roles, using [TrackRelay] so any number of downstream
//! subscribers share a single upstream subscription.

pub mod coding;
pub mod message;
pub mod model;
pub mod transport;

mod error;
mod mux;
mod path;
mod relay;
mod session;

pub use error::*;
pub use mux::*;
pub use path::*;
pub use relay::*;
pub use session::*;
