use crate::coding::{Decode, DecodeError, Encode};

/// A protocol version, negotiated during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Version {
	/// The current development version.
	pub const CURRENT: Version = Version(0xffffff01);
}

/// The versions supported by this implementation, in preference order.
pub const VERSIONS: [Version; 1] = [Version::CURRENT];

impl Decode for Version {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self(u64::decode(buf)?))
	}
}

impl Encode for Version {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}

impl Decode for Vec<Version> {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let count = usize::decode(buf)?;

		let mut vs = Vec::with_capacity(count.min(64));
		for _ in 0..count {
			vs.push(Version::decode(buf)?);
		}

		Ok(vs)
	}
}

impl Encode for Vec<Version> {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.as_slice().encode(w)
	}
}

impl From<u64> for Version {
	fn from(v: u64) -> Self {
		Self(v)
	}
}

impl std::fmt::Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "0x{:x}", self.0)
	}
}
