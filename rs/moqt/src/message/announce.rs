use crate::coding::{Decode, DecodeError, Encode};
use crate::{BroadcastPath, TrackPattern};

/// Opens an announce stream, filtering announcements by pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAnnounces {
	pub pattern: TrackPattern,
}

impl Decode for SubscribeAnnounces {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			pattern: TrackPattern::decode(buf)?,
		})
	}
}

impl Encode for SubscribeAnnounces {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.pattern.encode(w);
	}
}

/// The pattern was accepted; announcements follow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeAnnouncesOk {}

impl Decode for SubscribeAnnouncesOk {
	fn decode<B: bytes::Buf>(_buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {})
	}
}

impl Encode for SubscribeAnnouncesOk {
	fn encode<W: bytes::BufMut>(&self, _w: &mut W) {}
}

/// The pattern was rejected; the stream is closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAnnouncesError {
	pub code: u64,
	pub reason: String,
}

impl Decode for SubscribeAnnouncesError {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			code: u64::decode(buf)?,
			reason: String::decode(buf)?,
		})
	}
}

impl Encode for SubscribeAnnouncesError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.code.encode(w);
		self.reason.encode(w);
	}
}

/// Stop receiving announcements; the stream is closing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeAnnounces {}

impl Decode for UnsubscribeAnnounces {
	fn decode<B: bytes::Buf>(_buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {})
	}
}

impl Encode for UnsubscribeAnnounces {
	fn encode<W: bytes::BufMut>(&self, _w: &mut W) {}
}

/// A broadcast at this path is now active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
	pub path: BroadcastPath,
}

impl Decode for Announce {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
		})
	}
}

impl Encode for Announce {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
	}
}

/// The broadcast at this path has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unannounce {
	pub path: BroadcastPath,
}

impl Decode for Unannounce {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
		})
	}
}

impl Encode for Unannounce {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
	}
}

/// Acknowledges an [Announce]; unused by this implementation but kept on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceOk {
	pub path: BroadcastPath,
}

impl Decode for AnnounceOk {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
		})
	}
}

impl Encode for AnnounceOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
	}
}

/// Rejects an [Announce]; unused by this implementation but kept on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceError {
	pub path: BroadcastPath,
	pub code: u64,
	pub reason: String,
}

impl Decode for AnnounceError {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
			code: u64::decode(buf)?,
			reason: String::decode(buf)?,
		})
	}
}

impl Encode for AnnounceError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
		self.code.encode(w);
		self.reason.encode(w);
	}
}
