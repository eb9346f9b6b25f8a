//! Bridge any WebTransport implementation onto [moqt::transport].

use bytes::{Buf, BufMut, Bytes};
use web_transport_trait::{RecvStream as _, SendStream as _, Session as _};

type SendError<S> = <<S as web_transport_trait::Session>::SendStream as web_transport_trait::SendStream>::Error;
type RecvError<S> = <<S as web_transport_trait::Session>::RecvStream as web_transport_trait::RecvStream>::Error;

/// A WebTransport error, opaque to the protocol layer.
///
/// The three stream halves carry their own error types; this folds them into
/// the single type the session layer expects.
pub enum WebError<S: web_transport_trait::Session> {
	Session(S::Error),
	Write(SendError<S>),
	Read(RecvError<S>),
}

impl<S: web_transport_trait::Session> std::fmt::Debug for WebError<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Session(err) => write!(f, "WebError::Session({err:?})"),
			Self::Write(err) => write!(f, "WebError::Write({err:?})"),
			Self::Read(err) => write!(f, "WebError::Read({err:?})"),
		}
	}
}

impl<S: web_transport_trait::Session> std::fmt::Display for WebError<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Session(err) => write!(f, "session error: {err}"),
			Self::Write(err) => write!(f, "write error: {err}"),
			Self::Read(err) => write!(f, "read error: {err}"),
		}
	}
}

impl<S: web_transport_trait::Session> std::error::Error for WebError<S> {}

impl<S: web_transport_trait::Session + 'static> moqt::transport::StreamError for WebError<S> {
	fn reset_code(&self) -> Option<u32> {
		// WebTransport error codes are not surfaced; cancellations show up as
		// transport errors instead.
		None
	}
}

/// A WebTransport session speaking the protocol over its streams.
#[derive(Clone)]
pub struct WebSession<S: web_transport_trait::Session>(S);

impl<S: web_transport_trait::Session> WebSession<S> {
	pub fn new(session: S) -> Self {
		Self(session)
	}
}

impl<S: web_transport_trait::Session + 'static> moqt::transport::Session for WebSession<S> {
	type SendStream = WebSendStream<S>;
	type RecvStream = WebRecvStream<S>;
	type Error = WebError<S>;

	async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), Self::Error> {
		let (send, recv) = self.0.open_bi().await.map_err(WebError::Session)?;
		Ok((WebSendStream(send), WebRecvStream(recv)))
	}

	async fn accept_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), Self::Error> {
		let (send, recv) = self.0.accept_bi().await.map_err(WebError::Session)?;
		Ok((WebSendStream(send), WebRecvStream(recv)))
	}

	async fn open_uni(&self) -> Result<Self::SendStream, Self::Error> {
		Ok(WebSendStream(self.0.open_uni().await.map_err(WebError::Session)?))
	}

	async fn accept_uni(&self) -> Result<Self::RecvStream, Self::Error> {
		Ok(WebRecvStream(self.0.accept_uni().await.map_err(WebError::Session)?))
	}

	async fn send_datagram(&self, payload: Bytes) -> Result<(), Self::Error> {
		self.0.send_datagram(payload).map_err(WebError::Session)
	}

	async fn recv_datagram(&self) -> Result<Bytes, Self::Error> {
		self.0.recv_datagram().await.map_err(WebError::Session)
	}

	fn close(&self, code: u32, reason: &str) {
		self.0.close(code, reason);
	}

	async fn closed(&self) -> Self::Error {
		WebError::Session(self.0.closed().await)
	}
}

pub struct WebSendStream<S: web_transport_trait::Session>(S::SendStream);

impl<S: web_transport_trait::Session + 'static> moqt::transport::SendStream for WebSendStream<S> {
	type Error = WebError<S>;

	async fn write_buf<B: Buf + Send>(&mut self, buf: &mut B) -> Result<usize, Self::Error> {
		self.0.write_buf(buf).await.map_err(WebError::Write)
	}

	fn finish(&mut self) -> Result<(), Self::Error> {
		self.0.finish().map_err(WebError::Write)
	}

	fn reset(&mut self, code: u32) {
		self.0.reset(code);
	}

	fn set_priority(&mut self, priority: u8) {
		self.0.set_priority(priority);
	}

	async fn closed(&mut self) -> Result<(), Self::Error> {
		self.0.closed().await.map_err(WebError::Write)
	}
}

pub struct WebRecvStream<S: web_transport_trait::Session>(S::RecvStream);

impl<S: web_transport_trait::Session + 'static> moqt::transport::RecvStream for WebRecvStream<S> {
	type Error = WebError<S>;

	async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> Result<Option<usize>, Self::Error> {
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

	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, Self::Error> {
		self.0.read_chunk(max).await.map_err(WebError::Read)
	}

	fn stop(&mut self, code: u32) {
		self.0.stop(code);
	}
}
