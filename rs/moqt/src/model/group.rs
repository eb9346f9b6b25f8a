use bytes::Bytes;
use tokio::sync::watch;

use crate::Error;

/// Sequence 0 is reserved; the first real group is 1.
pub const GROUP_SEQUENCE_FIRST: u64 = 1;

struct GroupState {
	frames: Vec<Bytes>,
	closed: Option<Result<(), Error>>,
	readers: usize,
}

/// Create a connected writer/reader pair for one group.
pub(crate) fn group(sequence: u64) -> (GroupWriter, GroupReader) {
	let (state, watch) = watch::channel(GroupState {
		frames: Vec::new(),
		closed: None,
		readers: 1,
	});

	let writer = GroupWriter {
		state: state.clone(),
		sequence,
	};
	let reader = GroupReader {
		state,
		watch,
		sequence,
		index: 0,
	};

	(writer, reader)
}

/// Writes frames into one group.
///
/// Dropping the writer closes the group cleanly; use [Self::cancel_write] to
/// signal an error instead.
pub struct GroupWriter {
	state: watch::Sender<GroupState>,
	sequence: u64,
}

impl GroupWriter {
	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	/// Append a frame to the group.
	///
	/// Fails if the reader cancelled or went away.
	pub fn write_frame<F: Into<Bytes>>(&mut self, frame: F) -> Result<(), Error> {
		{
			let state = self.state.borrow();
			if let Some(closed) = &state.closed {
				return Err(match closed {
					Ok(()) => Error::Cancel,
					Err(err) => err.clone(),
				});
			}
			if state.readers == 0 {
				return Err(Error::Cancel);
			}
		}

		let frame = frame.into();
		self.state.send_modify(|state| state.frames.push(frame));
		Ok(())
	}

	/// The number of frames written so far.
	pub fn len(&self) -> usize {
		self.state.borrow().frames.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// End the group cleanly; readers drain the remaining frames.
	pub fn close(mut self) {
		self.close_inner(Ok(()));
	}

	/// Abandon the group with an error.
	pub fn cancel_write(mut self, err: Error) {
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

	/// Resolves once the reader cancelled or went away.
	pub async fn unused(&self) {
		let mut watch = self.state.subscribe();
		// An error here means every reader is gone, which also counts.
		let _ = watch
			.wait_for(|state| state.readers == 0 || matches!(state.closed, Some(Err(_))))
			.await;
	}
}

impl Drop for GroupWriter {
	fn drop(&mut self) {
		self.close_inner(Ok(()));
	}
}

/// Reads frames from one group, in write order.
///
/// Cloning yields an independent cursor over the same frames.
pub struct GroupReader {
	state: watch::Sender<GroupState>,
	watch: watch::Receiver<GroupState>,
	sequence: u64,
	index: usize,
}

impl GroupReader {
	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	/// The next frame, or None at the clean end of the group.
	pub async fn read_frame(&mut self) -> Result<Option<Bytes>, Error> {
		let index = self.index;
		let state = self
			.watch
			.wait_for(|state| state.frames.len() > index || state.closed.is_some())
			.await
			.map_err(|_| Error::Cancel)?;

		if state.frames.len() > index {
			let frame = state.frames[index].clone();
			drop(state);
			self.index += 1;
			return Ok(Some(frame));
		}

		match state.closed.as_ref() {
			Some(Ok(())) => Ok(None),
			Some(Err(err)) => Err(err.clone()),
			None => unreachable!(),
		}
	}

	/// Tell the writer to stop; [GroupWriter::write_frame] fails afterwards.
	pub fn cancel_read(mut self, err: Error) {
		self.cancel_inner(err);
	}

	fn cancel_inner(&mut self, err: Error) {
		self.state.send_if_modified(|state| {
			if state.closed.is_some() {
				return false;
			}
			state.closed = Some(Err(err.clone()));
			true
		});
	}
}

impl Clone for GroupReader {
	fn clone(&self) -> Self {
		self.state.send_modify(|state| state.readers += 1);
		Self {
			state: self.state.clone(),
			watch: self.watch.clone(),
			sequence: self.sequence,
			index: self.index,
		}
	}
}

impl Drop for GroupReader {
	fn drop(&mut self) {
		self.state.send_modify(|state| state.readers -= 1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn write_read() {
		let (mut writer, mut reader) = group(1);

		writer.write_frame(Bytes::from_static(b"one")).unwrap();
		writer.write_frame(Bytes::from_static(b"two")).unwrap();
		writer.close();

		assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"one");
		assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"two");
		assert!(reader.read_frame().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn cancel_read_surfaces_to_writer() {
		let (mut writer, reader) = group(1);

		writer.write_frame(Bytes::from_static(b"one")).unwrap();
		reader.cancel_read(Error::Internal);

		assert!(matches!(
			writer.write_frame(Bytes::from_static(b"two")),
			Err(Error::Internal)
		));
	}

	#[tokio::test]
	async fn reader_drop_cancels() {
		let (mut writer, reader) = group(1);
		drop(reader);

		assert!(matches!(
			writer.write_frame(Bytes::from_static(b"one")),
			Err(Error::Cancel)
		));
	}

	#[tokio::test]
	async fn cancel_write_surfaces_to_reader() {
		let (mut writer, mut reader) = group(1);

		writer.write_frame(Bytes::from_static(b"one")).unwrap();
		writer.cancel_write(Error::Expired);

		// Buffered frames drain first, then the error.
		assert!(reader.read_frame().await.unwrap().is_some());
		assert!(matches!(reader.read_frame().await, Err(Error::Expired)));
	}

	#[tokio::test]
	async fn clone_replays_from_start() {
		let (mut writer, mut reader) = group(1);

		writer.write_frame(Bytes::from_static(b"one")).unwrap();
		writer.write_frame(Bytes::from_static(b"two")).unwrap();

		assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"one");

		// A late clone of the original cursor still sees everything it hasn't read.
		let mut late = reader.clone();
		writer.write_frame(Bytes::from_static(b"three")).unwrap();
		writer.close();

		assert_eq!(late.read_frame().await.unwrap().unwrap().as_ref(), b"two");
		assert_eq!(late.read_frame().await.unwrap().unwrap().as_ref(), b"three");
		assert!(late.read_frame().await.unwrap().is_none());
	}
}
