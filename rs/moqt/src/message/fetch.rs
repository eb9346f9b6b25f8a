use crate::coding::{Decode, DecodeError, Encode};
use crate::message::GroupOrder;
use crate::BroadcastPath;

/// Request a past range of a track.
///
/// Decoded for wire compatibility; this implementation always replies
/// [FetchError] with a "not supported" code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
	pub path: BroadcastPath,
	pub name: String,
	pub priority: i8,
	/// The group sequence to start from.
	pub group: u64,
	/// The frame index within that group to start from.
	pub frame: u64,
}

impl Decode for Fetch {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
			name: String::decode(buf)?,
			priority: i8::decode(buf)?,
			group: u64::decode(buf)?,
			frame: u64::decode(buf)?,
		})
	}
}

impl Encode for Fetch {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
		self.name.encode(w);
		self.priority.encode(w);
		self.group.encode(w);
		self.frame.encode(w);
	}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchCancel {}

impl Decode for FetchCancel {
	fn decode<B: bytes::Buf>(_buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {})
	}
}

impl Encode for FetchCancel {
	fn encode<W: bytes::BufMut>(&self, _w: &mut W) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOk {
	pub order: GroupOrder,
}

impl Decode for FetchOk {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			order: GroupOrder::decode(buf)?,
		})
	}
}

impl Encode for FetchOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.order.encode(w);
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
	pub code: u64,
	pub reason: String,
}

impl Decode for FetchError {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			code: u64::decode(buf)?,
			reason: String::decode(buf)?,
		})
	}
}

impl Encode for FetchError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.code.encode(w);
		self.reason.encode(w);
	}
}
