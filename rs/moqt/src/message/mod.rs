//! Control and stream-header messages.
//!
//! Every message is a varint type tag followed by per-type fields; each field
//! is a varint, a length-prefixed byte string, or a varint-counted group.

mod announce;
mod control;
mod fetch;
mod info;
mod setup;
mod stream;
mod subscribe;

pub use announce::*;
pub use control::*;
pub use fetch::*;
pub use info::*;
pub use setup::*;
pub use stream::*;
pub use subscribe::*;

use crate::coding::{Decode, DecodeError, Encode};

/// Any control message, dispatched by its type tag.
///
/// Streams decode this and reject variants that are not allowed in their
/// context as a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
	SubscribeUpdate(SubscribeUpdate),
	Subscribe(Subscribe),
	SubscribeOk(SubscribeOk),
	SubscribeError(SubscribeError),
	Announce(Announce),
	AnnounceOk(AnnounceOk),
	AnnounceError(AnnounceError),
	Unannounce(Unannounce),
	Unsubscribe(Unsubscribe),
	SubscribeDone(SubscribeDone),
	TrackStatusRequest(TrackStatusRequest),
	TrackStatus(TrackStatus),
	GoAway(GoAway),
	SubscribeAnnounces(SubscribeAnnounces),
	SubscribeAnnouncesOk(SubscribeAnnouncesOk),
	SubscribeAnnouncesError(SubscribeAnnouncesError),
	UnsubscribeAnnounces(UnsubscribeAnnounces),
	MaxSubscribeId(MaxSubscribeId),
	Fetch(Fetch),
	FetchCancel(FetchCancel),
	FetchOk(FetchOk),
	FetchError(FetchError),
	SubscribeBlocked(SubscribeBlocked),
	ClientSetup(ClientSetup),
	ServerSetup(ServerSetup),
}

impl ControlMessage {
	pub fn tag(&self) -> u64 {
		match self {
			Self::SubscribeUpdate(_) => 0x02,
			Self::Subscribe(_) => 0x03,
			Self::SubscribeOk(_) => 0x04,
			Self::SubscribeError(_) => 0x05,
			Self::Announce(_) => 0x06,
			Self::AnnounceOk(_) => 0x07,
			Self::AnnounceError(_) => 0x08,
			Self::Unannounce(_) => 0x09,
			Self::Unsubscribe(_) => 0x0a,
			Self::SubscribeDone(_) => 0x0b,
			Self::TrackStatusRequest(_) => 0x0d,
			Self::TrackStatus(_) => 0x0e,
			Self::GoAway(_) => 0x10,
			Self::SubscribeAnnounces(_) => 0x11,
			Self::SubscribeAnnouncesOk(_) => 0x12,
			Self::SubscribeAnnouncesError(_) => 0x13,
			Self::UnsubscribeAnnounces(_) => 0x14,
			Self::MaxSubscribeId(_) => 0x15,
			Self::Fetch(_) => 0x16,
			Self::FetchCancel(_) => 0x17,
			Self::FetchOk(_) => 0x18,
			Self::FetchError(_) => 0x19,
			Self::SubscribeBlocked(_) => 0x1a,
			Self::ClientSetup(_) => 0x40,
			Self::ServerSetup(_) => 0x41,
		}
	}
}

impl Decode for ControlMessage {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let tag = u64::decode(buf)?;
		Ok(match tag {
			0x02 => Self::SubscribeUpdate(SubscribeUpdate::decode(buf)?),
			0x03 => Self::Subscribe(Subscribe::decode(buf)?),
			0x04 => Self::SubscribeOk(SubscribeOk::decode(buf)?),
			0x05 => Self::SubscribeError(SubscribeError::decode(buf)?),
			0x06 => Self::Announce(Announce::decode(buf)?),
			0x07 => Self::AnnounceOk(AnnounceOk::decode(buf)?),
			0x08 => Self::AnnounceError(AnnounceError::decode(buf)?),
			0x09 => Self::Unannounce(Unannounce::decode(buf)?),
			0x0a => Self::Unsubscribe(Unsubscribe::decode(buf)?),
			0x0b => Self::SubscribeDone(SubscribeDone::decode(buf)?),
			0x0d => Self::TrackStatusRequest(TrackStatusRequest::decode(buf)?),
			0x0e => Self::TrackStatus(TrackStatus::decode(buf)?),
			0x10 => Self::GoAway(GoAway::decode(buf)?),
			0x11 => Self::SubscribeAnnounces(SubscribeAnnounces::decode(buf)?),
			0x12 => Self::SubscribeAnnouncesOk(SubscribeAnnouncesOk::decode(buf)?),
			0x13 => Self::SubscribeAnnouncesError(SubscribeAnnouncesError::decode(buf)?),
			0x14 => Self::UnsubscribeAnnounces(UnsubscribeAnnounces::decode(buf)?),
			0x15 => Self::MaxSubscribeId(MaxSubscribeId::decode(buf)?),
			0x16 => Self::Fetch(Fetch::decode(buf)?),
			0x17 => Self::FetchCancel(FetchCancel::decode(buf)?),
			0x18 => Self::FetchOk(FetchOk::decode(buf)?),
			0x19 => Self::FetchError(FetchError::decode(buf)?),
			0x1a => Self::SubscribeBlocked(SubscribeBlocked::decode(buf)?),
			0x40 => Self::ClientSetup(ClientSetup::decode(buf)?),
			0x41 => Self::ServerSetup(ServerSetup::decode(buf)?),
			tag => return Err(DecodeError::InvalidMessage(tag)),
		})
	}
}

impl Encode for ControlMessage {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.tag().encode(w);
		match self {
			Self::SubscribeUpdate(msg) => msg.encode(w),
			Self::Subscribe(msg) => msg.encode(w),
			Self::SubscribeOk(msg) => msg.encode(w),
			Self::SubscribeError(msg) => msg.encode(w),
			Self::Announce(msg) => msg.encode(w),
			Self::AnnounceOk(msg) => msg.encode(w),
			Self::AnnounceError(msg) => msg.encode(w),
			Self::Unannounce(msg) => msg.encode(w),
			Self::Unsubscribe(msg) => msg.encode(w),
			Self::SubscribeDone(msg) => msg.encode(w),
			Self::TrackStatusRequest(msg) => msg.encode(w),
			Self::TrackStatus(msg) => msg.encode(w),
			Self::GoAway(msg) => msg.encode(w),
			Self::SubscribeAnnounces(msg) => msg.encode(w),
			Self::SubscribeAnnouncesOk(msg) => msg.encode(w),
			Self::SubscribeAnnouncesError(msg) => msg.encode(w),
			Self::UnsubscribeAnnounces(msg) => msg.encode(w),
			Self::MaxSubscribeId(msg) => msg.encode(w),
			Self::Fetch(msg) => msg.encode(w),
			Self::FetchCancel(msg) => msg.encode(w),
			Self::FetchOk(msg) => msg.encode(w),
			Self::FetchError(msg) => msg.encode(w),
			Self::SubscribeBlocked(msg) => msg.encode(w),
			Self::ClientSetup(msg) => msg.encode(w),
			Self::ServerSetup(msg) => msg.encode(w),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coding::Version;

	fn round_trip(msg: ControlMessage) {
		let buf = msg.encode_bytes();
		let mut cursor = std::io::Cursor::new(buf.as_ref());
		let decoded = ControlMessage::decode(&mut cursor).unwrap();
		assert_eq!(decoded, msg);
		assert_eq!(cursor.position() as usize, buf.len(), "{msg:?} left trailing bytes");
	}

	fn path(s: &str) -> crate::BroadcastPath {
		s.try_into().unwrap()
	}

	#[test]
	fn every_message_round_trips() {
		let mut parameters = Parameters::default();
		parameters.set_varint(SetupParameter::MaxSubscribeId, 1024);
		parameters.set_bytes(SetupParameter::Path, b"/relay".to_vec().into());

		let info = Info {
			priority: -3,
			latest: 42,
			order: GroupOrder::Descending,
		};

		for msg in [
			ControlMessage::SubscribeUpdate(SubscribeUpdate {
				priority: 1,
				min: 5,
				max: 10,
			}),
			ControlMessage::Subscribe(Subscribe {
				id: 7,
				path: path("/room/alice"),
				name: "video".to_string(),
				priority: -1,
				order: GroupOrder::Ascending,
				min: 0,
				max: 0,
				parameters: parameters.clone(),
			}),
			ControlMessage::SubscribeOk(SubscribeOk { info }),
			ControlMessage::SubscribeError(SubscribeError {
				code: 0x3,
				reason: "track not found".to_string(),
			}),
			ControlMessage::Announce(Announce {
				path: path("/room/alice"),
			}),
			ControlMessage::AnnounceOk(AnnounceOk {
				path: path("/room/alice"),
			}),
			ControlMessage::AnnounceError(AnnounceError {
				path: path("/room/alice"),
				code: 0x1,
				reason: "nope".to_string(),
			}),
			ControlMessage::Unannounce(Unannounce {
				path: path("/room/alice"),
			}),
			ControlMessage::Unsubscribe(Unsubscribe {}),
			ControlMessage::SubscribeDone(SubscribeDone {
				code: 0,
				reason: "done".to_string(),
			}),
			ControlMessage::TrackStatusRequest(TrackStatusRequest {
				path: path("/room/alice"),
				name: "".to_string(),
			}),
			ControlMessage::TrackStatus(TrackStatus { info }),
			ControlMessage::GoAway(GoAway {
				uri: "https://relay2.example".to_string(),
			}),
			ControlMessage::SubscribeAnnounces(SubscribeAnnounces {
				pattern: "/room/**".try_into().unwrap(),
			}),
			ControlMessage::SubscribeAnnouncesOk(SubscribeAnnouncesOk {}),
			ControlMessage::SubscribeAnnouncesError(SubscribeAnnouncesError {
				code: 0x7,
				reason: "invalid pattern".to_string(),
			}),
			ControlMessage::UnsubscribeAnnounces(UnsubscribeAnnounces {}),
			ControlMessage::MaxSubscribeId(MaxSubscribeId { max: 1 << 20 }),
			ControlMessage::Fetch(Fetch {
				path: path("/room/alice"),
				name: "video".to_string(),
				priority: 0,
				group: 3,
				frame: 14,
			}),
			ControlMessage::FetchCancel(FetchCancel {}),
			ControlMessage::FetchOk(FetchOk {
				order: GroupOrder::Ascending,
			}),
			ControlMessage::FetchError(FetchError {
				code: 0x8,
				reason: "not supported".to_string(),
			}),
			ControlMessage::SubscribeBlocked(SubscribeBlocked { max: 64 }),
			ControlMessage::ClientSetup(ClientSetup {
				versions: vec![Version::CURRENT, Version(0xffffff00)],
				parameters: parameters.clone(),
			}),
			ControlMessage::ServerSetup(ServerSetup {
				version: Version::CURRENT,
				parameters,
			}),
		] {
			round_trip(msg);
		}
	}

	#[test]
	fn unknown_tag() {
		let mut buf = Vec::new();
		0x3fu64.encode(&mut buf);
		let mut cursor = std::io::Cursor::new(buf.as_slice());
		assert!(matches!(
			ControlMessage::decode(&mut cursor),
			Err(DecodeError::InvalidMessage(0x3f))
		));
	}
}
