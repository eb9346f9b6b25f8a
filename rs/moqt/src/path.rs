use std::fmt;

use crate::coding::{Decode, DecodeError, Encode};
use crate::Error;

/// An absolute, slash-delimited path identifying a broadcast, e.g. `/room/alice`.
///
/// A valid path starts with `/`, has at least one segment, and contains no
/// empty, `.`, or `..` segments.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct BroadcastPath(String);

impl BroadcastPath {
	pub fn new<T: Into<String>>(path: T) -> Result<Self, Error> {
		let path = path.into();
		if !Self::is_valid(&path) {
			return Err(Error::InvalidPath);
		}
		Ok(Self(path))
	}

	pub fn is_valid(path: &str) -> bool {
		let Some(rest) = path.strip_prefix('/') else {
			return false;
		};
		if rest.is_empty() {
			return false;
		}
		rest.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub(crate) fn segments(&self) -> impl Iterator<Item = &str> {
		self.0[1..].split('/')
	}
}

impl std::ops::Deref for BroadcastPath {
	type Target = str;

	fn deref(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for BroadcastPath {
	type Error = Error;

	fn try_from(path: String) -> Result<Self, Error> {
		Self::new(path)
	}
}

impl TryFrom<&str> for BroadcastPath {
	type Error = Error;

	fn try_from(path: &str) -> Result<Self, Error> {
		Self::new(path)
	}
}

impl From<BroadcastPath> for String {
	fn from(path: BroadcastPath) -> String {
		path.0
	}
}

impl fmt::Display for BroadcastPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for BroadcastPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", self.0)
	}
}

impl Decode for BroadcastPath {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let path = String::decode(buf)?;
		if !Self::is_valid(&path) {
			return Err(DecodeError::InvalidValue);
		}
		Ok(Self(path))
	}
}

impl Encode for BroadcastPath {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}

/// A glob-like pattern filtering broadcast paths for announcements.
///
/// - `/` matches every path.
/// - A trailing `**` segment matches any non-empty suffix: `/foo/**` matches
///   `/foo/bar` and `/foo/bar/baz` but not `/foo`.
/// - A `*` segment matches exactly one segment.
/// - All other segments match literally.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct TrackPattern(String);

impl TrackPattern {
	pub fn new<T: Into<String>>(pattern: T) -> Result<Self, Error> {
		let pattern = pattern.into();
		if !Self::is_valid(&pattern) {
			return Err(Error::InvalidPattern);
		}
		Ok(Self(pattern))
	}

	pub fn is_valid(pattern: &str) -> bool {
		if pattern == "/" {
			return true;
		}
		let Some(rest) = pattern.strip_prefix('/') else {
			return false;
		};
		if rest.is_empty() {
			return false;
		}

		let segments: Vec<&str> = rest.split('/').collect();
		for (i, segment) in segments.iter().enumerate() {
			match *segment {
				"" | "." | ".." => return false,
				// `**` is only allowed as the final segment.
				"**" if i + 1 != segments.len() => return false,
				_ => {}
			}
		}
		true
	}

	/// Whether the given path matches this pattern.
	pub fn matches(&self, path: &BroadcastPath) -> bool {
		if self.0 == "/" {
			return true;
		}

		let mut segments = path.segments();
		let pattern: Vec<&str> = self.0[1..].split('/').collect();

		for (i, expected) in pattern.iter().enumerate() {
			match *expected {
				"**" => {
					debug_assert_eq!(i + 1, pattern.len());
					// At least one more segment must remain.
					return segments.next().is_some();
				}
				"*" => {
					if segments.next().is_none() {
						return false;
					}
				}
				literal => {
					if segments.next() != Some(literal) {
						return false;
					}
				}
			}
		}

		// Every segment must be consumed.
		segments.next().is_none()
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for TrackPattern {
	type Error = Error;

	fn try_from(pattern: String) -> Result<Self, Error> {
		Self::new(pattern)
	}
}

impl TryFrom<&str> for TrackPattern {
	type Error = Error;

	fn try_from(pattern: &str) -> Result<Self, Error> {
		Self::new(pattern)
	}
}

impl From<TrackPattern> for String {
	fn from(pattern: TrackPattern) -> String {
		pattern.0
	}
}

impl fmt::Display for TrackPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for TrackPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", self.0)
	}
}

impl Decode for TrackPattern {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let pattern = String::decode(buf)?;
		if !Self::is_valid(&pattern) {
			return Err(DecodeError::InvalidValue);
		}
		Ok(Self(pattern))
	}
}

impl Encode for TrackPattern {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn path(s: &str) -> BroadcastPath {
		BroadcastPath::new(s).unwrap()
	}

	fn pattern(s: &str) -> TrackPattern {
		TrackPattern::new(s).unwrap()
	}

	#[test]
	fn valid_paths() {
		for p in ["/a", "/room/alice", "/interop/server"] {
			assert!(BroadcastPath::is_valid(p), "{p}");
		}
	}

	#[test]
	fn invalid_paths() {
		for p in ["", "/", "a/b", "/a//b", "/a/", "/../a", "/a/.", "//"] {
			assert!(!BroadcastPath::is_valid(p), "{p}");
		}
	}

	#[test]
	fn match_everything() {
		for p in ["/a", "/a/b", "/room/alice/video"] {
			assert!(pattern("/").matches(&path(p)), "{p}");
			assert!(pattern("/**").matches(&path(p)), "{p}");
		}
	}

	#[test]
	fn match_single_segment() {
		assert!(pattern("/a/*").matches(&path("/a/b")));
		assert!(!pattern("/a/*").matches(&path("/a/b/c")));
		assert!(!pattern("/a/*").matches(&path("/a")));
	}

	#[test]
	fn match_prefix() {
		assert!(!pattern("/a/**").matches(&path("/a")));
		assert!(pattern("/a/**").matches(&path("/a/x")));
		assert!(pattern("/a/**").matches(&path("/a/x/y")));
		assert!(!pattern("/a/**").matches(&path("/b/x")));
	}

	#[test]
	fn match_literal() {
		assert!(pattern("/a/b").matches(&path("/a/b")));
		assert!(!pattern("/a/b").matches(&path("/a/c")));
		assert!(!pattern("/a/b").matches(&path("/a/b/c")));
	}

	#[test]
	fn invalid_patterns() {
		for p in ["", "a", "/a//b", "/**/b", "/a/**/c", "/a/", "/../**"] {
			assert!(!TrackPattern::is_valid(p), "{p}");
		}
	}
}
