use crate::coding::{Decode, DecodeError, Encode};
use crate::BroadcastPath;

/// The delivery order of groups within a track.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum GroupOrder {
	#[default]
	Ascending = 0x1,
	Descending = 0x2,
}

impl Decode for GroupOrder {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		match u8::decode(buf)? {
			// 0x0 is "publisher default" on the wire.
			0x0 => Ok(Self::Ascending),
			v => Self::try_from(v).map_err(|_| DecodeError::InvalidValue),
		}
	}
}

impl Encode for GroupOrder {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(*self).encode(w)
	}
}

/// A track's advertised state: carried by SubscribeOk and TrackStatus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Info {
	pub priority: i8,
	/// The most recent group sequence, or 0 if no group was produced yet.
	pub latest: u64,
	pub order: GroupOrder,
}

impl Decode for Info {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: i8::decode(buf)?,
			latest: u64::decode(buf)?,
			order: GroupOrder::decode(buf)?,
		})
	}
}

impl Encode for Info {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.priority.encode(w);
		self.latest.encode(w);
		self.order.encode(w);
	}
}

/// Ask for the current [Info] of a track without subscribing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStatusRequest {
	pub path: BroadcastPath,
	pub name: String,
}

impl Decode for TrackStatusRequest {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			path: BroadcastPath::decode(buf)?,
			name: String::decode(buf)?,
		})
	}
}

impl Encode for TrackStatusRequest {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.path.encode(w);
		self.name.encode(w);
	}
}

/// The reply to a [TrackStatusRequest].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackStatus {
	pub info: Info,
}

impl Decode for TrackStatus {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			info: Info::decode(buf)?,
		})
	}
}

impl Encode for TrackStatus {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.info.encode(w);
	}
}
