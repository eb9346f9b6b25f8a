use std::collections::BTreeMap;

use bytes::Bytes;

use crate::coding::{Decode, DecodeError, Encode, Version};

/// Setup parameter keys recognized by this implementation.
///
/// Unknown keys are carried opaquely and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u64)]
pub enum SetupParameter {
	/// The advertised role: 0x1 publisher, 0x2 subscriber, 0x3 both.
	Role = 0x0,
	/// The application path, for raw QUIC where there is no URL.
	Path = 0x1,
	/// The initial ceiling for subscribe ids allocated by the peer.
	MaxSubscribeId = 0x2,
}

/// An extensible key-value bag carried by both setup messages.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters(BTreeMap<u64, Bytes>);

impl Parameters {
	pub fn set_varint<K: Into<u64>>(&mut self, key: K, value: u64) {
		self.0.insert(key.into(), value.encode_bytes());
	}

	pub fn get_varint<K: Into<u64>>(&self, key: K) -> Option<u64> {
		let mut buf = self.0.get(&key.into())?.clone();
		u64::decode(&mut buf).ok()
	}

	pub fn set_bytes<K: Into<u64>>(&mut self, key: K, value: Bytes) {
		self.0.insert(key.into(), value);
	}

	pub fn get_bytes<K: Into<u64>>(&self, key: K) -> Option<Bytes> {
		self.0.get(&key.into()).cloned()
	}

	pub fn set_str<K: Into<u64>>(&mut self, key: K, value: &str) {
		self.0.insert(key.into(), Bytes::copy_from_slice(value.as_bytes()));
	}

	pub fn get_str<K: Into<u64>>(&self, key: K) -> Option<String> {
		let bytes = self.0.get(&key.into())?;
		String::from_utf8(bytes.to_vec()).ok()
	}
}

impl Decode for Parameters {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let count = usize::decode(buf)?;
		if count > 64 {
			return Err(DecodeError::TooMany);
		}

		let mut parameters = BTreeMap::new();
		for _ in 0..count {
			let key = u64::decode(buf)?;
			let value = Bytes::decode(buf)?;
			parameters.insert(key, value);
		}

		Ok(Self(parameters))
	}
}

impl Encode for Parameters {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.len().encode(w);
		for (key, value) in &self.0 {
			key.encode(w);
			value.encode(w);
		}
	}
}

/// Sent by the dialer on the control stream to start the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSetup {
	/// Supported versions, in preference order.
	pub versions: Vec<Version>,
	pub parameters: Parameters,
}

impl Decode for ClientSetup {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			versions: Vec::<Version>::decode(buf)?,
			parameters: Parameters::decode(buf)?,
		})
	}
}

impl Encode for ClientSetup {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.versions.encode(w);
		self.parameters.encode(w);
	}
}

/// The listener's reply, committing to a single version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSetup {
	pub version: Version,
	pub parameters: Parameters,
}

impl Decode for ServerSetup {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Ok(Self {
			version: Version::decode(buf)?,
			parameters: Parameters::decode(buf)?,
		})
	}
}

impl Encode for ServerSetup {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.version.encode(w);
		self.parameters.encode(w);
	}
}
