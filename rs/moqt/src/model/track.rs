use std::collections::VecDeque;
use std::fmt;

use tokio::sync::watch;

use crate::message::{GroupOrder, Info};
use crate::model::{group, GroupReader, GroupWriter, GROUP_SEQUENCE_FIRST};
use crate::{BroadcastPath, Error};

/// A track identity plus its publisher defaults.
#[derive(Debug, Clone)]
pub struct Track {
	pub path: BroadcastPath,
	/// Empty denotes the default track of the broadcast.
	pub name: String,
	pub priority: i8,
	pub order: GroupOrder,
}

impl Track {
	pub fn new<N: Into<String>>(path: BroadcastPath, name: N) -> Self {
		Self {
			path,
			name: name.into(),
			priority: 0,
			order: GroupOrder::default(),
		}
	}

	pub fn with_priority(mut self, priority: i8) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_order(mut self, order: GroupOrder) -> Self {
		self.order = order;
		self
	}

	/// Create a connected writer/reader pair for this track.
	pub fn produce(self) -> (TrackWriter, TrackReader) {
		let (state, watch) = watch::channel(TrackState {
			queue: VecDeque::new(),
			latest: 0,
			closed: None,
			unsubscribed: false,
		});

		let writer = TrackWriter {
			track: self.clone(),
			state: state.clone(),
			watch: watch.clone(),
		};
		let reader = TrackReader {
			track: self,
			state,
			watch,
		};

		(writer, reader)
	}
}

struct TrackState {
	queue: VecDeque<GroupReader>,
	latest: u64,
	closed: Option<Result<(), Error>>,
	unsubscribed: bool,
}

/// The publisher's handle: opens groups for one subscription.
///
/// Handed to a registered track handler; its lifetime is the subscription,
/// not the session.
pub struct TrackWriter {
	track: Track,
	state: watch::Sender<TrackState>,
	watch: watch::Receiver<TrackState>,
}

impl TrackWriter {
	pub fn track(&self) -> &Track {
		&self.track
	}

	/// Open the group with the given sequence.
	///
	/// Sequences must be strictly increasing, starting at [GROUP_SEQUENCE_FIRST];
	/// reuse fails with [Error::Duplicate].
	pub fn open_group(&mut self, sequence: u64) -> Result<GroupWriter, Error> {
		if sequence == 0 {
			return Err(Error::InvalidRange);
		}

		{
			let state = self.state.borrow();
			if let Some(closed) = &state.closed {
				return Err(closed.clone().err().unwrap_or(Error::Cancel));
			}
			if state.unsubscribed {
				return Err(Error::Cancel);
			}
			if sequence <= state.latest {
				return Err(Error::Duplicate);
			}
		}

		let (writer, reader) = group(sequence);
		self.state.send_modify(|state| {
			state.latest = sequence;
			state.queue.push_back(reader);
		});

		Ok(writer)
	}

	/// Open the next group in sequence.
	pub fn append_group(&mut self) -> Result<GroupWriter, Error> {
		let next = match self.state.borrow().latest {
			0 => GROUP_SEQUENCE_FIRST,
			latest => latest + 1,
		};
		self.open_group(next)
	}

	/// The most recent group sequence, or 0 before the first group.
	pub fn latest(&self) -> u64 {
		self.state.borrow().latest
	}

	pub fn info(&self) -> Info {
		Info {
			priority: self.track.priority,
			latest: self.latest(),
			order: self.track.order,
		}
	}

	/// End the track cleanly; the reader drains any queued groups.
	pub fn close(mut self) {
		self.close_inner(Ok(()));
	}

	/// End the track with an error.
	pub fn close_with_error(mut self, err: Error) {
		self.close_inner(Err(err));
	}

	fn close_inner(&mut self, closed: Result<(), Error>) {
		self.state.send_if_modified(|state| {
			if state.closed.is_some() {
				return false;
			}
			state.closed = Some(closed.clone());
			true
		});
	}

	/// Resolves once the reader unsubscribed or went away.
	pub async fn unused(&mut self) {
		let _ = self
			.watch
			.wait_for(|state| state.unsubscribed || matches!(state.closed, Some(Err(_))))
			.await;
	}
}

impl Drop for TrackWriter {
	fn drop(&mut self) {
		self.close_inner(Ok(()));
	}
}

impl fmt::Debug for TrackWriter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackWriter").field("track", &self.track).finish_non_exhaustive()
	}
}

/// The subscriber's handle: accepts groups in the order the publisher opened them.
pub struct TrackReader {
	track: Track,
	state: watch::Sender<TrackState>,
	watch: watch::Receiver<TrackState>,
}

impl TrackReader {
	pub fn track(&self) -> &Track {
		&self.track
	}

	/// The next group, or None once the publisher closed the track.
	pub async fn accept_group(&mut self) -> Result<Option<GroupReader>, Error> {
		let state = self
			.watch
			.wait_for(|state| !state.queue.is_empty() || state.closed.is_some())
			.await
			.map_err(|_| Error::Cancel)?;

		if state.queue.is_empty() {
			return match state.closed.as_ref() {
				Some(Ok(())) => Ok(None),
				Some(Err(err)) => Err(err.clone()),
				None => unreachable!(),
			};
		}
		drop(state);

		let mut group = None;
		self.state.send_modify(|state| group = state.queue.pop_front());
		Ok(group)
	}

	/// The most recent group sequence, or 0 before the first group.
	pub fn latest(&self) -> u64 {
		self.state.borrow().latest
	}

	pub fn info(&self) -> Info {
		Info {
			priority: self.track.priority,
			latest: self.latest(),
			order: self.track.order,
		}
	}

	/// Unsubscribe: the writer observes it and stops opening groups.
	pub fn close(mut self) {
		self.close_inner();
	}

	fn close_inner(&mut self) {
		self.state.send_if_modified(|state| {
			if state.unsubscribed {
				return false;
			}
			state.unsubscribed = true;
			// Queued groups are abandoned, cancelling their writers.
			state.queue.clear();
			true
		});
	}
}

impl Drop for TrackReader {
	fn drop(&mut self) {
		self.close_inner();
	}
}

impl fmt::Debug for TrackReader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackReader").field("track", &self.track).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	fn track() -> Track {
		Track::new("/room/alice".try_into().unwrap(), "video")
	}

	#[tokio::test]
	async fn groups_in_open_order() {
		let (mut writer, mut reader) = track().produce();

		let g1 = writer.open_group(1).unwrap();
		let g5 = writer.open_group(5).unwrap();
		g1.close();
		g5.close();
		writer.close();

		assert_eq!(reader.accept_group().await.unwrap().unwrap().sequence(), 1);
		assert_eq!(reader.accept_group().await.unwrap().unwrap().sequence(), 5);
		assert!(reader.accept_group().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn duplicate_group() {
		let (mut writer, _reader) = track().produce();

		let _g = writer.open_group(3).unwrap();
		assert!(matches!(writer.open_group(3), Err(Error::Duplicate)));
		// Sequences may skip but never regress.
		assert!(matches!(writer.open_group(2), Err(Error::Duplicate)));
		assert!(writer.open_group(4).is_ok());
	}

	#[tokio::test]
	async fn sequence_zero_reserved() {
		let (mut writer, _reader) = track().produce();
		assert!(matches!(writer.open_group(0), Err(Error::InvalidRange)));
	}

	#[tokio::test]
	async fn append_group_sequences() {
		let (mut writer, _reader) = track().produce();
		assert_eq!(writer.append_group().unwrap().sequence(), GROUP_SEQUENCE_FIRST);
		assert_eq!(writer.append_group().unwrap().sequence(), 2);
	}

	#[tokio::test]
	async fn unsubscribe_stops_writer() {
		let (mut writer, reader) = track().produce();
		reader.close();

		writer.unused().await;
		assert!(matches!(writer.open_group(1), Err(Error::Cancel)));
	}

	#[tokio::test]
	async fn frames_flow_end_to_end() {
		let (mut writer, mut reader) = track().produce();

		let mut gw = writer.append_group().unwrap();
		gw.write_frame(Bytes::from_static(b"HELLO")).unwrap();
		gw.close();

		let mut gr = reader.accept_group().await.unwrap().unwrap();
		assert_eq!(gr.read_frame().await.unwrap().unwrap().as_ref(), b"HELLO");
		assert!(gr.read_frame().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn writer_error_reaches_reader() {
		let (writer, mut reader) = track().produce();
		writer.close_with_error(Error::Unauthorized);

		assert!(matches!(reader.accept_group().await, Err(Error::Unauthorized)));
	}
}
