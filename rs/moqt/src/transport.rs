//! The connection capability set required from the underlying transport.
//!
//! QUIC and WebTransport both provide it: bidirectional and unidirectional
//! streams, unreliable datagrams, and an error-coded close. Adapters implement
//! these traits once; everything else in the crate is generic over [Session].

use std::future::Future;

use bytes::{Buf, BufMut, Bytes};

/// A transport-level error, shared by the session and its streams.
pub trait StreamError: std::error::Error + Send + Sync + 'static {
	/// The application code if the peer reset or stopped the stream.
	fn reset_code(&self) -> Option<u32>;
}

/// An established connection offering streams and datagrams.
pub trait Session: Clone + Send + Sync + 'static {
	type SendStream: SendStream<Error = Self::Error>;
	type RecvStream: RecvStream<Error = Self::Error>;
	type Error: StreamError;

	fn open_bi(&self) -> impl Future<Output = Result<(Self::SendStream, Self::RecvStream), Self::Error>> + Send;
	fn accept_bi(&self) -> impl Future<Output = Result<(Self::SendStream, Self::RecvStream), Self::Error>> + Send;
	fn open_uni(&self) -> impl Future<Output = Result<Self::SendStream, Self::Error>> + Send;
	fn accept_uni(&self) -> impl Future<Output = Result<Self::RecvStream, Self::Error>> + Send;

	fn send_datagram(&self, payload: Bytes) -> impl Future<Output = Result<(), Self::Error>> + Send;
	fn recv_datagram(&self) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;

	/// Close the connection with an application code and reason.
	fn close(&self, code: u32, reason: &str);

	/// Resolves once the connection is closed, by either side.
	fn closed(&self) -> impl Future<Output = Self::Error> + Send;
}

/// The write half of a stream.
pub trait SendStream: Send + 'static {
	type Error: StreamError;

	/// Write as much of the buffer as possible, advancing it.
	fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> impl Future<Output = Result<usize, Self::Error>> + Send;

	/// Mark the stream as cleanly finished.
	fn finish(&mut self) -> Result<(), Self::Error>;

	/// Abandon the stream, signalling the code to the peer.
	fn reset(&mut self, code: u32);

	/// Hint the relative transmission priority to the transport.
	fn set_priority(&mut self, priority: u8);

	/// Resolves when the peer stops the stream or acknowledges the FIN.
	fn closed(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// The read half of a stream.
pub trait RecvStream: Send + 'static {
	type Error: StreamError;

	/// Read a chunk into the buffer, returning the size or None at the end of the stream.
	fn read_buf<B: BufMut + Send>(
		&mut self,
		buf: &mut B,
	) -> impl Future<Output = Result<Option<usize>, Self::Error>> + Send;

	/// Read up to `max` bytes, returning None at the end of the stream.
	fn read_chunk(&mut self, max: usize) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send;

	/// Tell the peer to stop sending, signalling the code.
	fn stop(&mut self, code: u32);
}

#[cfg(test)]
pub mod mock {
	//! An in-memory [Session] used by the test suite.
	//!
	//! Both halves of [pair] behave like the two endpoints of a real connection:
	//! streams are ordered byte pipes with FIN/reset/stop, datagrams are a lossless
	//! queue, and closing one side closes both.

	use std::{
		cmp,
		sync::{Arc, Mutex},
	};

	use bytes::{Buf, BufMut, Bytes, BytesMut};
	use tokio::sync::{mpsc, Notify};

	use super::{RecvStream, SendStream, Session, StreamError};

	#[derive(thiserror::Error, Debug, Clone)]
	pub enum MockError {
		#[error("connection closed: code={0}")]
		Closed(u32),

		#[error("stream reset: code={0}")]
		Reset(u32),

		#[error("stream stopped: code={0}")]
		Stopped(u32),
	}

	impl StreamError for MockError {
		fn reset_code(&self) -> Option<u32> {
			match self {
				Self::Reset(code) | Self::Stopped(code) => Some(*code),
				_ => None,
			}
		}
	}

	#[derive(Default)]
	struct PipeState {
		buffer: BytesMut,
		fin: bool,
		reset: Option<u32>,
		stopped: Option<u32>,
	}

	#[derive(Clone, Default)]
	struct Pipe {
		state: Arc<Mutex<PipeState>>,
		notify: Arc<Notify>,
	}

	impl Pipe {
		fn pair() -> (MockSendStream, MockRecvStream) {
			let pipe = Pipe::default();
			(
				MockSendStream { pipe: pipe.clone() },
				MockRecvStream { pipe },
			)
		}
	}

	#[derive(Default)]
	struct Closed {
		code: Mutex<Option<u32>>,
		notify: Notify,
	}

	impl Closed {
		fn set(&self, code: u32) {
			let mut state = self.code.lock().unwrap();
			if state.is_none() {
				*state = Some(code);
			}
			drop(state);
			self.notify.notify_waiters();
		}

		async fn wait(&self) -> u32 {
			loop {
				let notified = self.notify.notified();
				if let Some(code) = *self.code.lock().unwrap() {
					return code;
				}
				notified.await;
			}
		}
	}

	type BiQueue = mpsc::UnboundedReceiver<(MockSendStream, MockRecvStream)>;
	type UniQueue = mpsc::UnboundedReceiver<MockRecvStream>;

	/// One endpoint of an in-memory connection.
	#[derive(Clone)]
	pub struct MockSession {
		closed: Arc<Closed>,
		accept_bi: Arc<tokio::sync::Mutex<BiQueue>>,
		accept_uni: Arc<tokio::sync::Mutex<UniQueue>>,
		accept_datagrams: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>>,
		peer_bi: mpsc::UnboundedSender<(MockSendStream, MockRecvStream)>,
		peer_uni: mpsc::UnboundedSender<MockRecvStream>,
		peer_datagrams: mpsc::UnboundedSender<Bytes>,
	}

	/// Create a connected pair of in-memory sessions.
	pub fn pair() -> (MockSession, MockSession) {
		let closed = Arc::new(Closed::default());

		let (bi_a, bi_a_rx) = mpsc::unbounded_channel();
		let (bi_b, bi_b_rx) = mpsc::unbounded_channel();
		let (uni_a, uni_a_rx) = mpsc::unbounded_channel();
		let (uni_b, uni_b_rx) = mpsc::unbounded_channel();
		let (dg_a, dg_a_rx) = mpsc::unbounded_channel();
		let (dg_b, dg_b_rx) = mpsc::unbounded_channel();

		let a = MockSession {
			closed: closed.clone(),
			accept_bi: Arc::new(tokio::sync::Mutex::new(bi_a_rx)),
			accept_uni: Arc::new(tokio::sync::Mutex::new(uni_a_rx)),
			accept_datagrams: Arc::new(tokio::sync::Mutex::new(dg_a_rx)),
			peer_bi: bi_b,
			peer_uni: uni_b,
			peer_datagrams: dg_b,
		};

		let b = MockSession {
			closed,
			accept_bi: Arc::new(tokio::sync::Mutex::new(bi_b_rx)),
			accept_uni: Arc::new(tokio::sync::Mutex::new(uni_b_rx)),
			accept_datagrams: Arc::new(tokio::sync::Mutex::new(dg_b_rx)),
			peer_bi: bi_a,
			peer_uni: uni_a,
			peer_datagrams: dg_a,
		};

		(a, b)
	}

	impl MockSession {
		fn check_closed(&self) -> Result<(), MockError> {
			match *self.closed.code.lock().unwrap() {
				Some(code) => Err(MockError::Closed(code)),
				None => Ok(()),
			}
		}
	}

	impl Session for MockSession {
		type SendStream = MockSendStream;
		type RecvStream = MockRecvStream;
		type Error = MockError;

		async fn open_bi(&self) -> Result<(MockSendStream, MockRecvStream), MockError> {
			self.check_closed()?;
			let (local_send, remote_recv) = Pipe::pair();
			let (remote_send, local_recv) = Pipe::pair();
			self.peer_bi
				.send((remote_send, remote_recv))
				.map_err(|_| MockError::Closed(0))?;
			Ok((local_send, local_recv))
		}

		async fn accept_bi(&self) -> Result<(MockSendStream, MockRecvStream), MockError> {
			let mut queue = self.accept_bi.lock().await;
			tokio::select! {
				stream = queue.recv() => stream.ok_or(MockError::Closed(0)),
				code = self.closed.wait() => Err(MockError::Closed(code)),
			}
		}

		async fn open_uni(&self) -> Result<MockSendStream, MockError> {
			self.check_closed()?;
			let (send, recv) = Pipe::pair();
			self.peer_uni.send(recv).map_err(|_| MockError::Closed(0))?;
			Ok(send)
		}

		async fn accept_uni(&self) -> Result<MockRecvStream, MockError> {
			let mut queue = self.accept_uni.lock().await;
			tokio::select! {
				stream = queue.recv() => stream.ok_or(MockError::Closed(0)),
				code = self.closed.wait() => Err(MockError::Closed(code)),
			}
		}

		async fn send_datagram(&self, payload: Bytes) -> Result<(), MockError> {
			self.check_closed()?;
			self.peer_datagrams.send(payload).map_err(|_| MockError::Closed(0))
		}

		async fn recv_datagram(&self) -> Result<Bytes, MockError> {
			let mut queue = self.accept_datagrams.lock().await;
			tokio::select! {
				datagram = queue.recv() => datagram.ok_or(MockError::Closed(0)),
				code = self.closed.wait() => Err(MockError::Closed(code)),
			}
		}

		fn close(&self, code: u32, _reason: &str) {
			self.closed.set(code);
		}

		async fn closed(&self) -> MockError {
			MockError::Closed(self.closed.wait().await)
		}
	}

	pub struct MockSendStream {
		pipe: Pipe,
	}

	impl SendStream for MockSendStream {
		type Error = MockError;

		async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, MockError> {
			let chunk = buf.copy_to_bytes(buf.remaining());
			let mut state = self.pipe.state.lock().unwrap();
			if let Some(code) = state.stopped {
				return Err(MockError::Stopped(code));
			}
			state.buffer.extend_from_slice(&chunk);
			drop(state);
			self.pipe.notify.notify_waiters();
			Ok(chunk.len())
		}

		fn finish(&mut self) -> Result<(), MockError> {
			let mut state = self.pipe.state.lock().unwrap();
			if let Some(code) = state.stopped {
				return Err(MockError::Stopped(code));
			}
			state.fin = true;
			drop(state);
			self.pipe.notify.notify_waiters();
			Ok(())
		}

		fn reset(&mut self, code: u32) {
			let mut state = self.pipe.state.lock().unwrap();
			if !state.fin && state.reset.is_none() {
				state.reset = Some(code);
				state.buffer.clear();
			}
			drop(state);
			self.pipe.notify.notify_waiters();
		}

		fn set_priority(&mut self, _priority: u8) {}

		async fn closed(&mut self) -> Result<(), MockError> {
			loop {
				let notified = self.pipe.notify.notified();
				{
					let state = self.pipe.state.lock().unwrap();
					if let Some(code) = state.stopped {
						return Err(MockError::Stopped(code));
					}
					if state.fin {
						return Ok(());
					}
				}
				notified.await;
			}
		}
	}

	impl Drop for MockSendStream {
		fn drop(&mut self) {
			// An abandoned stream counts as a reset, like the real transports.
			self.reset(0);
		}
	}

	pub struct MockRecvStream {
		pipe: Pipe,
	}

	impl RecvStream for MockRecvStream {
		type Error = MockError;

		async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, MockError> {
			let max = buf.remaining_mut();
			match self.read_chunk(max).await? {
				Some(chunk) => {
					let size = chunk.len();
					buf.put(chunk);
					Ok(Some(size))
				}
				None => Ok(None),
			}
		}

		async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, MockError> {
			loop {
				let notified = self.pipe.notify.notified();
				{
					let mut state = self.pipe.state.lock().unwrap();
					if let Some(code) = state.reset {
						return Err(MockError::Reset(code));
					}
					if !state.buffer.is_empty() {
						let size = cmp::min(max, state.buffer.len());
						return Ok(Some(state.buffer.split_to(size).freeze()));
					}
					if state.fin {
						return Ok(None);
					}
				}
				notified.await;
			}
		}

		fn stop(&mut self, code: u32) {
			let mut state = self.pipe.state.lock().unwrap();
			if state.stopped.is_none() {
				state.stopped = Some(code);
				state.buffer.clear();
			}
			drop(state);
			self.pipe.notify.notify_waiters();
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[tokio::test]
		async fn stream_round_trip() {
			let (a, b) = pair();

			let (mut send, _recv) = a.open_bi().await.unwrap();
			let (_peer_send, mut peer_recv) = b.accept_bi().await.unwrap();

			let mut data = Bytes::from_static(b"hello");
			send.write_buf(&mut data).await.unwrap();
			send.finish().unwrap();

			let chunk = peer_recv.read_chunk(usize::MAX).await.unwrap().unwrap();
			assert_eq!(chunk.as_ref(), b"hello");
			assert!(peer_recv.read_chunk(usize::MAX).await.unwrap().is_none());
		}

		#[tokio::test]
		async fn stop_surfaces_to_writer() {
			let (a, b) = pair();

			let mut send = a.open_uni().await.unwrap();
			let mut recv = b.accept_uni().await.unwrap();

			recv.stop(4);
			assert!(matches!(send.closed().await, Err(MockError::Stopped(4))));

			let mut data = Bytes::from_static(b"late");
			assert!(send.write_buf(&mut data).await.is_err());
		}

		#[tokio::test]
		async fn close_wakes_accept() {
			let (a, b) = pair();

			let accept = tokio::spawn(async move { b.accept_bi().await });
			a.close(2, "bye");

			assert!(matches!(accept.await.unwrap(), Err(MockError::Closed(2))));
		}
	}
}
