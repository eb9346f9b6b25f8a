use std::string::FromUtf8Error;
use thiserror::Error;

/// Read a value from the buffer.
///
/// If [DecodeError::Short] is returned, the caller should try again with more data.
pub trait Decode: Sized {
	/// Decode the value from the given buffer.
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError>;
}

/// A decode error.
#[derive(Error, Debug, Clone)]
pub enum DecodeError {
	#[error("short buffer")]
	Short,

	#[error("invalid string")]
	InvalidString(#[from] FromUtf8Error),

	#[error("invalid message: {0:?}")]
	InvalidMessage(u64),

	#[error("invalid value")]
	InvalidValue,

	#[error("too many")]
	TooMany,

	#[error("bounds exceeded")]
	BoundsExceeded,

	#[error("expected end")]
	ExpectedEnd,
}

impl Decode for u64 {
	/// Decode a varint (RFC 9000 Section 16).
	///
	/// The two most significant bits of the first byte select a 1, 2, 4, or 8 byte encoding.
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::Short);
		}

		let first = buf.chunk()[0];
		let size = 1usize << (first >> 6);
		if buf.remaining() < size {
			return Err(DecodeError::Short);
		}

		let mut v = (buf.get_u8() & 0b0011_1111) as u64;
		for _ in 1..size {
			v = (v << 8) | buf.get_u8() as u64;
		}

		Ok(v)
	}
}

impl Decode for usize {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let v = u64::decode(buf)?;
		v.try_into().map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl Decode for bool {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		match u8::decode(buf)? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(DecodeError::InvalidValue),
		}
	}
}

impl Decode for u8 {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		match buf.has_remaining() {
			true => Ok(buf.get_u8()),
			false => Err(DecodeError::Short),
		}
	}
}

impl Decode for String {
	/// Decode a string with a varint length prefix.
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let v = Vec::<u8>::decode(buf)?;
		let str = String::from_utf8(v)?;

		Ok(str)
	}
}

impl Decode for Vec<u8> {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let size = usize::decode(buf)?;

		if buf.remaining() < size {
			return Err(DecodeError::Short);
		}

		let bytes = buf.copy_to_bytes(size);
		Ok(bytes.to_vec())
	}
}

impl Decode for i8 {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		if !buf.has_remaining() {
			return Err(DecodeError::Short);
		}

		// Priorities are carried shifted by 128 so the wire byte stays unsigned
		// while a default of 0 remains ergonomic for the user.
		Ok(((buf.get_u8() as i16) - 128) as i8)
	}
}

impl Decode for bytes::Bytes {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let len = usize::decode(buf)?;
		if buf.remaining() < len {
			return Err(DecodeError::Short);
		}
		let bytes = buf.copy_to_bytes(len);
		Ok(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coding::Encode;

	#[test]
	fn varint_boundaries() {
		// The four encoding widths and their edges.
		for v in [
			0u64,
			63,
			64,
			16383,
			16384,
			1_073_741_823,
			1_073_741_824,
			4_611_686_018_427_387_903,
		] {
			let mut buf = Vec::new();
			v.encode(&mut buf);
			let mut cursor = std::io::Cursor::new(&buf);
			assert_eq!(u64::decode(&mut cursor).unwrap(), v);
			assert_eq!(cursor.position() as usize, buf.len());
		}
	}

	#[test]
	fn varint_widths() {
		let widths = [(0u64, 1), (63, 1), (64, 2), (16383, 2), (16384, 4), (1 << 30, 8)];
		for (v, expected) in widths {
			let mut buf = Vec::new();
			v.encode(&mut buf);
			assert_eq!(buf.len(), expected, "width of {v}");
		}
	}

	#[test]
	fn varint_round_trip() {
		// Every power of two in range, plus its neighbors.
		for shift in 0..62u32 {
			let base = 1u64 << shift;
			for v in [base - 1, base, base + 1] {
				if v >= (1 << 62) {
					continue;
				}
				let mut buf = Vec::new();
				v.encode(&mut buf);
				let mut cursor = std::io::Cursor::new(&buf);
				assert_eq!(u64::decode(&mut cursor).unwrap(), v);
			}
		}
	}

	#[test]
	fn varint_short() {
		let mut buf = Vec::new();
		16384u64.encode(&mut buf);
		buf.truncate(2);
		let mut cursor = std::io::Cursor::new(&buf);
		assert!(matches!(u64::decode(&mut cursor), Err(DecodeError::Short)));
	}

	#[test]
	fn priority_round_trip() {
		for v in [i8::MIN, -1, 0, 1, i8::MAX] {
			let mut buf = Vec::new();
			v.encode(&mut buf);
			let mut cursor = std::io::Cursor::new(&buf);
			assert_eq!(i8::decode(&mut cursor).unwrap(), v);
		}
	}

	#[test]
	fn string_round_trip() {
		let s = "/room/alice".to_string();
		let mut buf = Vec::new();
		s.encode(&mut buf);
		let mut cursor = std::io::Cursor::new(&buf);
		assert_eq!(String::decode(&mut cursor).unwrap(), s);
	}
}
