//! Raw QUIC as a [moqt::transport::Session], without the HTTP/3 handshake.

use bytes::{Buf, BufMut, Bytes};

/// Everything quinn can report, folded into one stream-aware error.
#[derive(thiserror::Error, Debug)]
pub enum QuicError {
	#[error("connection error: {0}")]
	Connection(#[from] quinn::ConnectionError),

	#[error("write error: {0}")]
	Write(#[from] quinn::WriteError),

	#[error("read error: {0}")]
	Read(#[from] quinn::ReadError),

	#[error("datagram error: {0}")]
	Datagram(#[from] quinn::SendDatagramError),

	#[error("closed stream")]
	ClosedStream(#[from] quinn::ClosedStream),
}

impl moqt::transport::StreamError for QuicError {
	fn reset_code(&self) -> Option<u32> {
		match self {
			Self::Write(quinn::WriteError::Stopped(code)) => Some(code.into_inner() as u32),
			Self::Read(quinn::ReadError::Reset(code)) => Some(code.into_inner() as u32),
			_ => None,
		}
	}
}

/// A raw QUIC connection speaking the protocol directly over its streams.
#[derive(Clone)]
pub struct QuicSession(quinn::Connection);

impl QuicSession {
	pub fn new(connection: quinn::Connection) -> Self {
		Self(connection)
	}
}

impl moqt::transport::Session for QuicSession {
	type SendStream = QuicSendStream;
	type RecvStream = QuicRecvStream;
	type Error = QuicError;

	async fn open_bi(&self) -> Result<(QuicSendStream, QuicRecvStream), QuicError> {
		let (send, recv) = self.0.open_bi().await?;
		Ok((QuicSendStream(send), QuicRecvStream(recv)))
	}

	async fn accept_bi(&self) -> Result<(QuicSendStream, QuicRecvStream), QuicError> {
		let (send, recv) = self.0.accept_bi().await?;
		Ok((QuicSendStream(send), QuicRecvStream(recv)))
	}

	async fn open_uni(&self) -> Result<QuicSendStream, QuicError> {
		Ok(QuicSendStream(self.0.open_uni().await?))
	}

	async fn accept_uni(&self) -> Result<QuicRecvStream, QuicError> {
		Ok(QuicRecvStream(self.0.accept_uni().await?))
	}

	async fn send_datagram(&self, payload: Bytes) -> Result<(), QuicError> {
		self.0.send_datagram(payload)?;
		Ok(())
	}

	async fn recv_datagram(&self) -> Result<Bytes, QuicError> {
		Ok(self.0.read_datagram().await?)
	}

	fn close(&self, code: u32, reason: &str) {
		self.0.close(quinn::VarInt::from_u32(code), reason.as_bytes());
	}

	async fn closed(&self) -> QuicError {
		self.0.closed().await.into()
	}
}

pub struct QuicSendStream(quinn::SendStream);

impl moqt::transport::SendStream for QuicSendStream {
	type Error = QuicError;

	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, QuicError> {
		let size = self.0.write(buf.chunk()).await?;
		buf.advance(size);
		Ok(size)
	}

	fn finish(&mut self) -> Result<(), QuicError> {
		Ok(self.0.finish()?)
	}

	fn reset(&mut self, code: u32) {
		let _ = self.0.reset(quinn::VarInt::from_u32(code));
	}

	fn set_priority(&mut self, priority: u8) {
		let _ = self.0.set_priority(priority as i32);
	}

	async fn closed(&mut self) -> Result<(), QuicError> {
		match self.0.stopped().await {
			Ok(Some(code)) => Err(quinn::WriteError::Stopped(code).into()),
			Ok(None) => Ok(()),
			Err(quinn::StoppedError::ConnectionLost(err)) => Err(err.into()),
			Err(quinn::StoppedError::ZeroRttRejected) => Err(quinn::WriteError::ZeroRttRejected.into()),
		}
	}
}

pub struct QuicRecvStream(quinn::RecvStream);

impl moqt::transport::RecvStream for QuicRecvStream {
	type Error = QuicError;

	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, QuicError> {
		use moqt::transport::RecvStream;

		match self.read_chunk(buf.remaining_mut()).await? {
			Some(chunk) => {
				let size = chunk.len();
				buf.put(chunk);
				Ok(Some(size))
			}
			None => Ok(None),
		}
	}

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, QuicError> {
		Ok(self.0.read_chunk(max, true).await?.map(|chunk| chunk.bytes))
	}

	fn stop(&mut self, code: u32) {
		let _ = self.0.stop(quinn::VarInt::from_u32(code));
	}
}
