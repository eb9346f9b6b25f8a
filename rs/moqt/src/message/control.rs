use crate::coding::{Decode, DecodeError, Encode};

/// Ask the peer to reconnect elsewhere; the session starts draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAway {
	/// Where to reconnect, or empty to reuse the original URI.
	pub uri: String,
}

impl Decode for GoAway {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			uri: String::decode(buf)?,
		})
	}
}

impl Encode for GoAway {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.uri.encode(w);
	}
}

/// Raise the ceiling on subscribe ids the peer may allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxSubscribeId {
	pub max: u64,
}

impl Decode for MaxSubscribeId {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			max: u64::decode(buf)?,
		})
	}
}

impl Encode for MaxSubscribeId {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.max.encode(w);
	}
}

/// The sender wants to subscribe but has exhausted its id allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeBlocked {
	/// The ceiling the sender is blocked on.
	pub max: u64,
}

impl Decode for SubscribeBlocked {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			max: u64::decode(buf)?,
		})
	}
}

impl Encode for SubscribeBlocked {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.max.encode(w);
	}
}
