use std::sync::Arc;

use crate::coding::DecodeError;

/// An error that can be sent across threads and shared.
pub trait SendSyncError: std::error::Error + Send + Sync {}
impl<T: std::error::Error + Send + Sync> SendSyncError for T {}

/// Everything that can go wrong within a session.
///
/// The same taxonomy is used at every layer; each error knows its wire code in
/// the three code spaces: session close, stream reset/stop, and subscribe reject.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	/// The underlying transport failed: connection closed, stream reset, handshake failed.
	#[error("transport error: {0}")]
	Transport(Arc<dyn SendSyncError>),

	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	/// Version negotiation failed during setup.
	#[error("unsupported versions")]
	Version,

	/// The peer broke a protocol rule; fatal to the session.
	#[error("protocol violation")]
	ProtocolViolation,

	/// A stream started with an unknown kind tag.
	#[error("unexpected stream")]
	UnexpectedStream,

	#[error("track not found")]
	NotFound,

	#[error("unauthorized")]
	Unauthorized,

	/// A subscribe id or group sequence was reused.
	#[error("duplicate")]
	Duplicate,

	/// A subscribe update tried to widen the requested range.
	#[error("invalid range")]
	InvalidRange,

	#[error("invalid announce pattern")]
	InvalidPattern,

	#[error("invalid broadcast path")]
	InvalidPath,

	/// The group was evicted because a newer group started.
	#[error("expired group")]
	Expired,

	/// The other side is no longer interested.
	#[error("cancelled")]
	Cancel,

	#[error("timeout")]
	Timeout,

	#[error("session closed")]
	SessionClosed,

	/// The session is draining after a GoAway; no new subscriptions.
	#[error("going away")]
	GoingAway,

	#[error("not supported")]
	Unsupported,

	#[error("internal error")]
	Internal,

	/// An application-provided rejection code.
	#[error("application error code={0}")]
	App(u64),
}

impl Error {
	/// The code used when closing the whole connection.
	pub fn to_session_code(&self) -> u32 {
		match self {
			Self::Cancel | Self::SessionClosed => 0x0,
			Self::ProtocolViolation
			| Self::UnexpectedStream
			| Self::Duplicate
			| Self::InvalidRange
			| Self::Decode(_) => 0x2,
			Self::Version => 0x3,
			Self::Unauthorized => 0x4,
			Self::Timeout | Self::GoingAway => 0x5,
			_ => 0x1,
		}
	}

	/// The code used when resetting or stopping a group stream.
	pub fn to_stream_code(&self) -> u32 {
		match self {
			Self::ProtocolViolation | Self::Decode(_) => 0x2,
			Self::Expired => 0x3,
			Self::Cancel | Self::SessionClosed | Self::GoingAway => 0x4,
			Self::App(code) => (*code as u32).saturating_add(0x10),
			_ => 0x0,
		}
	}

	/// Decode a group stream reset/stop code.
	pub fn from_stream_code(code: u32) -> Self {
		match code {
			0x0 => Self::Internal,
			0x2 => Self::ProtocolViolation,
			0x3 => Self::Expired,
			0x4 => Self::Cancel,
			code if code >= 0x10 => Self::App((code - 0x10) as u64),
			_ => Self::Internal,
		}
	}

	/// The code carried in a SubscribeError or AnnounceError message.
	pub fn to_reject_code(&self) -> u64 {
		match self {
			Self::InvalidRange => 0x1,
			Self::Duplicate => 0x2,
			Self::NotFound => 0x3,
			Self::Unauthorized => 0x4,
			Self::Timeout => 0x5,
			Self::GoingAway => 0x6,
			Self::InvalidPattern => 0x7,
			Self::Unsupported => 0x8,
			Self::App(code) => *code,
			_ => 0x0,
		}
	}

	/// Decode a SubscribeError or AnnounceError code.
	pub fn from_reject_code(code: u64) -> Self {
		match code {
			0x0 => Self::Internal,
			0x1 => Self::InvalidRange,
			0x2 => Self::Duplicate,
			0x3 => Self::NotFound,
			0x4 => Self::Unauthorized,
			0x5 => Self::Timeout,
			0x6 => Self::GoingAway,
			0x7 => Self::InvalidPattern,
			0x8 => Self::Unsupported,
			code => Self::App(code),
		}
	}

	/// Convert a transport error into an [Error], decoding stream reset codes.
	pub fn from_transport(err: impl crate::transport::StreamError) -> Self {
		if let Some(code) = err.reset_code() {
			return Self::from_stream_code(code);
		}

		Self::Transport(Arc::new(err))
	}

	/// Whether the error is fatal to the whole session.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Self::ProtocolViolation | Self::UnexpectedStream | Self::Version | Self::Decode(_)
		)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
