use crate::coding::{Decode, DecodeError, Encode};

/// The first varint on every bidirectional stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u64)]
pub enum BiStreamKind {
	/// Exactly one per session, opened by the dialer.
	Control = 0x0,
	Announce = 0x1,
	Subscribe = 0x2,
	Fetch = 0x3,
	Info = 0x4,
}

impl Decode for BiStreamKind {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let v = u64::decode(buf)?;
		Self::try_from(v).map_err(|_| DecodeError::InvalidMessage(v))
	}
}

impl Encode for BiStreamKind {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u64::from(*self).encode(w)
	}
}

/// The first varint on every unidirectional stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u64)]
pub enum UniStreamKind {
	Group = 0x0,
}

impl Decode for UniStreamKind {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let v = u64::decode(buf)?;
		Self::try_from(v).map_err(|_| DecodeError::InvalidMessage(v))
	}
}

impl Encode for UniStreamKind {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u64::from(*self).encode(w)
	}
}

/// The header following the kind tag on every group stream, and at the start
/// of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
	/// The subscription this group belongs to.
	pub subscribe_id: u64,
	pub sequence: u64,
	pub priority: i8,
}

impl Decode for GroupHeader {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(buf)?,
			sequence: u64::decode(buf)?,
			priority: i8::decode(buf)?,
		})
	}
}

impl Encode for GroupHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.subscribe_id.encode(w);
		self.sequence.encode(w);
		self.priority.encode(w);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn group_header_round_trip() {
		let header = GroupHeader {
			subscribe_id: 9,
			sequence: 1 << 40,
			priority: -128,
		};
		let buf = header.encode_bytes();
		let mut cursor = std::io::Cursor::new(buf.as_ref());
		assert_eq!(GroupHeader::decode(&mut cursor).unwrap(), header);
	}

	#[test]
	fn unknown_kind() {
		let mut buf = Vec::new();
		0x9u64.encode(&mut buf);
		let mut cursor = std::io::Cursor::new(buf.as_slice());
		assert!(matches!(
			BiStreamKind::decode(&mut cursor),
			Err(DecodeError::InvalidMessage(0x9))
		));
	}
}
