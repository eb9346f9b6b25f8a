use std::fmt::Debug;

use crate::{coding::*, transport, Error};

/// A wrapper around a [transport::SendStream] that will reset on Drop.
pub struct Writer<S: transport::SendStream> {
	stream: Option<S>,
	buffer: bytes::BytesMut,
}

impl<S: transport::SendStream> Writer<S> {
	pub fn new(stream: S) -> Self {
		Self {
			stream: Some(stream),
			buffer: Default::default(),
		}
	}

	/// Encode the given message to the stream.
	pub async fn encode<T: Encode + Debug>(&mut self, msg: &T) -> Result<(), Error> {
		self.buffer.clear();
		msg.encode(&mut self.buffer);

		while !self.buffer.is_empty() {
			// Borrow the field directly so the buffer can be the write source.
			self.stream
				.as_mut()
				.unwrap()
				.write_buf(&mut self.buffer)
				.await
				.map_err(Error::from_transport)?;
		}

		Ok(())
	}

	// Not public to avoid accidental partial writes.
	async fn write<B: bytes::Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Error> {
		self.stream().write_buf(buf).await.map_err(Error::from_transport)
	}

	/// Write the entire [bytes::Buf] to the stream.
	///
	/// NOTE: This can avoid performing a copy when using [bytes::Bytes].
	pub async fn write_all<B: bytes::Buf + Send>(&mut self, buf: &mut B) -> Result<(), Error> {
		while buf.has_remaining() {
			self.write(buf).await?;
		}
		Ok(())
	}

	/// Mark the stream as finished, consuming the writer so Drop won't reset it.
	pub fn finish(mut self) -> Result<(), Error> {
		let mut stream = self.stream.take().unwrap();
		stream.finish().map_err(Error::from_transport)
	}

	/// Abort the stream with the given error.
	pub fn abort(mut self, err: &Error) {
		self.stream.take().unwrap().reset(err.to_stream_code());
	}

	/// Wait for the stream to be stopped by the peer.
	pub async fn closed(&mut self) -> Result<(), Error> {
		self.stream().closed().await.map_err(Error::from_transport)?;
		Ok(())
	}

	/// Set the priority of the stream.
	pub fn set_priority(&mut self, priority: u8) {
		self.stream().set_priority(priority);
	}

	fn stream(&mut self) -> &mut S {
		// Only None after finish/abort, which consume self.
		self.stream.as_mut().unwrap()
	}
}

impl<S: transport::SendStream> Drop for Writer<S> {
	fn drop(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			// Unlike the transport default, we abort the stream on drop.
			stream.reset(Error::Cancel.to_stream_code());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::{mock, Session};
	use bytes::Bytes;

	#[tokio::test]
	async fn encode_flushes_the_whole_buffer() {
		let (a, b) = mock::pair();
		let (send, recv) = tokio::join!(a.open_uni(), b.accept_uni());
		let mut writer = Writer::new(send.unwrap());
		let mut reader = Reader::new(recv.unwrap());

		let frame = Bytes::from(vec![0xAB; 100_000]);
		writer.encode(&frame).await.unwrap();
		writer.finish().unwrap();

		assert_eq!(reader.decode::<Bytes>().await.unwrap(), frame);
		assert!(reader.decode_maybe::<Bytes>().await.unwrap().is_none());
	}
}
