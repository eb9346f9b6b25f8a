use crate::coding::{Decode, DecodeError, Encode};
use crate::message::{GroupOrder, Info, Parameters};
use crate::BroadcastPath;

/// Opens a subscription; the first message on a subscribe stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
	/// Unique within the session, allocated by the subscriber.
	pub id: u64,
	pub path: BroadcastPath,
	/// The track name; empty denotes the default track.
	pub name: String,
	pub priority: i8,
	pub order: GroupOrder,
	/// The first group sequence of interest; 0 = unbounded.
	pub min: u64,
	/// The last group sequence of interest; 0 = unbounded.
	pub max: u64,
	pub parameters: Parameters,
}

impl Decode for Subscribe {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			id: u64::decode(buf)?,
			path: BroadcastPath::decode(buf)?,
			name: String::decode(buf)?,
			priority: i8::decode(buf)?,
			order: GroupOrder::decode(buf)?,
			min: u64::decode(buf)?,
			max: u64::decode(buf)?,
			parameters: Parameters::decode(buf)?,
		})
	}
}

impl Encode for Subscribe {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.id.encode(w);
		self.path.encode(w);
		self.name.encode(w);
		self.priority.encode(w);
		self.order.encode(w);
		self.min.encode(w);
		self.max.encode(w);
		self.parameters.encode(w);
	}
}

/// The publisher accepted the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOk {
	pub info: Info,
}

impl Decode for SubscribeOk {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			info: Info::decode(buf)?,
		})
	}
}

impl Encode for SubscribeOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.info.encode(w);
	}
}

/// The publisher rejected the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeError {
	pub code: u64,
	pub reason: String,
}

impl Decode for SubscribeError {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			code: u64::decode(buf)?,
			reason: String::decode(buf)?,
		})
	}
}

impl Encode for SubscribeError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.code.encode(w);
		self.reason.encode(w);
	}
}

/// Narrow the subscribed range or change its priority.
///
/// Widening either bound is a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeUpdate {
	pub priority: i8,
	pub min: u64,
	pub max: u64,
}

impl Decode for SubscribeUpdate {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: i8::decode(buf)?,
			min: u64::decode(buf)?,
			max: u64::decode(buf)?,
		})
	}
}

impl Encode for SubscribeUpdate {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.priority.encode(w);
		self.min.encode(w);
		self.max.encode(w);
	}
}

/// The subscriber is no longer interested; the stream is closing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Unsubscribe {}

impl Decode for Unsubscribe {
	fn decode<B: bytes::Buf>(_buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {})
	}
}

impl Encode for Unsubscribe {
	fn encode<W: bytes::BufMut>(&self, _w: &mut W) {}
}

/// The publisher will open no more groups for this subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeDone {
	pub code: u64,
	pub reason: String,
}

impl Decode for SubscribeDone {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			code: u64::decode(buf)?,
			reason: String::decode(buf)?,
		})
	}
}

impl Encode for SubscribeDone {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.code.encode(w);
		self.reason.encode(w);
	}
}
