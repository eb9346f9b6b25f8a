//! Fan one upstream subscription out to many downstream tracks.
//!
//! A subscriber joining while a group is in flight receives every frame of
//! that group from its start: the cache replays what it has buffered, then
//! hands the writer over to live forwarding under the same lock.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::model::{GroupReader, GroupWriter, TrackReader, TrackWriter};
use crate::Error;

struct CacheState {
	frames: Vec<Bytes>,
	writers: Vec<GroupWriter>,
	closed: Option<Result<(), Error>>,
}

/// The frames of the current upstream group plus every downstream group
/// writer fed from it.
pub struct GroupCache {
	sequence: u64,
	state: Mutex<CacheState>,
}

impl GroupCache {
	pub fn new(sequence: u64) -> Self {
		Self {
			sequence,
			state: Mutex::new(CacheState {
				frames: Vec::new(),
				writers: Vec::new(),
				closed: None,
			}),
		}
	}

	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	/// Cache a frame and forward it to every attached writer.
	///
	/// A writer that fails is detached; the others are unaffected.
	pub fn append(&self, frame: Bytes) {
		let mut writers = {
			let mut state = self.state.lock().unwrap();
			if state.closed.is_some() {
				return;
			}
			state.frames.push(frame.clone());
			// Forward outside the lock; a late add_writer catches up on its own.
			std::mem::take(&mut state.writers)
		};

		writers.retain_mut(|writer| writer.write_frame(frame.clone()).is_ok());
		self.state.lock().unwrap().writers.append(&mut writers);
	}

	/// Attach a writer, replaying every cached frame before going live.
	pub fn add_writer(&self, mut writer: GroupWriter) {
		let mut index = 0;
		loop {
			let frame = {
				let mut state = self.state.lock().unwrap();
				match state.frames.get(index) {
					Some(frame) => frame.clone(),
					// Caught up; register under the same lock so no frame is missed.
					None => match state.closed.clone() {
						None => {
							state.writers.push(writer);
							return;
						}
						Some(result) => {
							drop(state);
							match result {
								Ok(()) => writer.close(),
								Err(err) => writer.cancel_write(err),
							}
							return;
						}
					},
				}
			};

			if writer.write_frame(frame).is_err() {
				return;
			}
			index += 1;
		}
	}

	/// End the group for every attached writer.
	pub fn close(&self, result: Result<(), Error>) {
		let writers = {
			let mut state = self.state.lock().unwrap();
			if state.closed.is_some() {
				return;
			}
			state.closed = Some(result.clone());
			std::mem::take(&mut state.writers)
		};

		for writer in writers {
			match &result {
				Ok(()) => writer.close(),
				Err(err) => writer.cancel_write(err.clone()),
			}
		}
	}
}

struct RelayState {
	destinations: Vec<TrackWriter>,
	cache: Option<Arc<GroupCache>>,
	closed: Option<Result<(), Error>>,
}

/// Copies one upstream [TrackReader] to any number of downstream tracks.
///
/// Destinations may attach at any time; one joining mid-group receives the
/// current group from its first frame. When every destination is gone the
/// relay stops and the upstream unsubscribes; attach to a fresh relay after
/// re-subscribing.
#[derive(Clone)]
pub struct TrackRelay {
	state: Arc<Mutex<RelayState>>,
}

impl Default for TrackRelay {
	fn default() -> Self {
		Self::new()
	}
}

impl TrackRelay {
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(RelayState {
				destinations: Vec::new(),
				cache: None,
				closed: None,
			})),
		}
	}

	/// Attach a downstream track.
	///
	/// Once the relay has ended the writer is handed back; the caller then
	/// re-subscribes upstream and attaches it to a fresh relay.
	pub fn add_destination(&self, mut writer: TrackWriter) -> Result<(), TrackWriter> {
		let mut state = self.state.lock().unwrap();

		if state.closed.is_some() {
			return Err(writer);
		}

		// Joining mid-group: open the current sequence and catch up.
		if let Some(cache) = &state.cache {
			if let Ok(group) = writer.open_group(cache.sequence()) {
				cache.add_writer(group);
			}
		}

		state.destinations.push(writer);
		Ok(())
	}

	/// Pump the upstream until it ends or the last destination leaves.
	///
	/// Returns [Error::Cancel] in the latter case, after dropping the
	/// upstream reader so the subscription is released.
	pub async fn run(&self, mut upstream: TrackReader) -> Result<(), Error> {
		loop {
			match upstream.accept_group().await {
				Ok(Some(group)) => {
					let cache = Arc::new(GroupCache::new(group.sequence()));
					{
						let mut state = self.state.lock().unwrap();

						// The previous group rotates out of the cache; its pump task
						// still closes its writers once the upstream group ends.
						state.cache = Some(cache.clone());

						// Dead destinations are pruned here, the rest join the new group.
						state.destinations.retain_mut(|dest| match dest.open_group(cache.sequence()) {
							Ok(writer) => {
								cache.add_writer(writer);
								true
							}
							Err(_) => false,
						});

						if state.destinations.is_empty() {
							state.cache = None;
							state.closed = Some(Ok(()));
							tracing::debug!("last destination left; releasing upstream");
							return Err(Error::Cancel);
						}
					}

					web_async::spawn(pump_group(group, cache));
				}
				Ok(None) => {
					self.finish(Ok(()));
					return Ok(());
				}
				Err(err) => {
					self.finish(Err(err.clone()));
					return Err(err);
				}
			}
		}
	}

	fn finish(&self, result: Result<(), Error>) {
		let destinations = {
			let mut state = self.state.lock().unwrap();
			state.closed = Some(result.clone());
			state.cache = None;
			std::mem::take(&mut state.destinations)
		};

		// In-flight groups keep draining; their pump tasks close them.
		for dest in destinations {
			match &result {
				Ok(()) => dest.close(),
				Err(err) => dest.close_with_error(err.clone()),
			}
		}
	}
}

async fn pump_group(mut group: GroupReader, cache: Arc<GroupCache>) {
	loop {
		match group.read_frame().await {
			Ok(Some(frame)) => cache.append(frame),
			Ok(None) => {
				cache.close(Ok(()));
				return;
			}
			Err(err) => {
				cache.close(Err(err));
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::Track;

	fn track() -> Track {
		Track::new("/relay/source".try_into().unwrap(), "video")
	}

	#[tokio::test]
	async fn late_joiners_get_every_frame() {
		let (mut upstream_writer, upstream_reader) = track().produce();
		let relay = TrackRelay::new();

		let runner = {
			let relay = relay.clone();
			tokio::spawn(async move { relay.run(upstream_reader).await })
		};

		let mut readers = Vec::new();
		let (writer, reader) = track().produce();
		assert!(relay.add_destination(writer).is_ok());
		readers.push(reader);

		let mut group = upstream_writer.open_group(1).unwrap();
		for i in 0..10u8 {
			// Two more subscribers join while the group is in flight.
			if i == 3 || i == 7 {
				tokio::task::yield_now().await;
				let (writer, reader) = track().produce();
				assert!(relay.add_destination(writer).is_ok());
				readers.push(reader);
			}
			group.write_frame(vec![i]).unwrap();
		}
		group.close();
		upstream_writer.close();

		assert!(runner.await.unwrap().is_ok());

		for mut reader in readers {
			let mut group = reader.accept_group().await.unwrap().unwrap();
			assert_eq!(group.sequence(), 1);
			for i in 0..10u8 {
				let frame = group.read_frame().await.unwrap().unwrap();
				assert_eq!(frame.as_ref(), &[i]);
			}
			assert!(group.read_frame().await.unwrap().is_none());
			assert!(reader.accept_group().await.unwrap().is_none());
		}
	}

	#[tokio::test]
	async fn overlapping_groups_rotate_without_loss() {
		let (mut upstream_writer, upstream_reader) = track().produce();
		let relay = TrackRelay::new();

		let runner = {
			let relay = relay.clone();
			tokio::spawn(async move { relay.run(upstream_reader).await })
		};

		let (writer, mut reader) = track().produce();
		assert!(relay.add_destination(writer).is_ok());

		let mut first = upstream_writer.open_group(1).unwrap();
		first.write_frame(&b"one"[..]).unwrap();

		let mut second = upstream_writer.open_group(2).unwrap();
		second.write_frame(&b"two"[..]).unwrap();
		second.close();
		drop(first);
		upstream_writer.close();

		assert!(runner.await.unwrap().is_ok());

		let mut group = reader.accept_group().await.unwrap().unwrap();
		assert_eq!(group.sequence(), 1);
		assert_eq!(group.read_frame().await.unwrap().unwrap().as_ref(), b"one");
		// The rotated-out group still ends cleanly once the upstream ends it.
		assert!(group.read_frame().await.unwrap().is_none());

		let mut group = reader.accept_group().await.unwrap().unwrap();
		assert_eq!(group.sequence(), 2);
		assert_eq!(group.read_frame().await.unwrap().unwrap().as_ref(), b"two");
	}

	#[tokio::test]
	async fn last_destination_releases_upstream() {
		let (mut upstream_writer, upstream_reader) = track().produce();
		let relay = TrackRelay::new();

		let runner = {
			let relay = relay.clone();
			tokio::spawn(async move { relay.run(upstream_reader).await })
		};

		let (writer, reader) = track().produce();
		assert!(relay.add_destination(writer).is_ok());
		drop(reader);

		// The dead destination is noticed at the next rotation.
		upstream_writer.open_group(1).unwrap().close();

		assert!(matches!(runner.await.unwrap(), Err(Error::Cancel)));
		assert!(matches!(upstream_writer.open_group(2), Err(Error::Cancel)));

		// A new destination is told to re-establish the relay.
		let (writer, _reader) = track().produce();
		assert!(relay.add_destination(writer).is_err());
	}
}
