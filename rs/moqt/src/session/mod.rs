mod publisher;
mod subscriber;

pub use subscriber::{AnnounceReader, SubscribeOptions};

use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	time::Duration,
};

use tokio::sync::{mpsc, oneshot, watch};

use crate::coding::{DecodeError, Reader, Stream, Writer, VERSIONS};
use crate::message::{
	BiStreamKind, ClientSetup, ControlMessage, GoAway, GroupHeader, Info, Parameters, ServerSetup, SetupParameter,
	UniStreamKind,
};
use crate::model::{Track, TrackReader, TrackWriter};
use crate::mux::{Publication, TrackHandler, TrackMux};
use crate::{transport, BroadcastPath, Error, TrackPattern};

/// How long the setup exchange may take, end to end.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a closing session may spend flushing its farewell.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// The ALPN string for raw QUIC connections.
pub const ALPN: &str = "moq-00";

/// The session-level lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Setup exchanged; ordinary operation.
	Open,
	/// GoAway sent or received; existing subscriptions drain.
	GoingAway,
	/// Transport closed; all handles fail with [Error::SessionClosed].
	Closed,
}

pub(crate) enum Command {
	Subscribe {
		track: Track,
		options: SubscribeOptions,
		reply: oneshot::Sender<Result<TrackReader, Error>>,
	},
	Announced {
		pattern: TrackPattern,
		reply: oneshot::Sender<Result<AnnounceReader, Error>>,
	},
	GoAway {
		uri: String,
	},
	Close {
		err: Error,
	},
}

/// Outgoing control-stream traffic, drained by a dedicated writer task.
pub(crate) enum ControlSend {
	Message(ControlMessage),
	/// Close the transport once everything before it is flushed.
	CloseAfter(Error),
}

/// Track state advertised to Info requests, keyed by (path, name).
pub(crate) type ServeRegistry = Arc<Mutex<std::collections::HashMap<(BroadcastPath, String), Info>>>;

/// A transport connection running the protocol.
///
/// Both roles are always available: publish via the mux, subscribe and watch
/// announcements via the peer.
#[derive(Clone)]
pub struct Session {
	inner: Arc<dyn SessionInner>,
	commands: mpsc::UnboundedSender<Command>,
	state: watch::Receiver<SessionState>,
	mux: TrackMux,
	peer_parameters: Parameters,
}

impl Session {
	/// Perform the handshake as the dialer.
	///
	/// Uses [TrackMux::global] when no mux is given.
	pub async fn connect<S: transport::Session>(transport: S, mux: impl Into<Option<TrackMux>>) -> Result<Self, Error> {
		Self::connect_with(transport, mux, Parameters::default()).await
	}

	/// Perform the handshake as the dialer with extra setup parameters,
	/// e.g. the path for raw QUIC.
	pub async fn connect_with<S: transport::Session>(
		transport: S,
		mux: impl Into<Option<TrackMux>>,
		mut parameters: Parameters,
	) -> Result<Self, Error> {
		let mux = mux.into().unwrap_or_else(|| TrackMux::global().clone());

		let setup = async {
			let mut stream = Stream::open(&transport).await?;
			stream.writer.encode(&BiStreamKind::Control).await?;

			parameters.set_varint(SetupParameter::MaxSubscribeId, u32::MAX as u64);

			let client = ClientSetup {
				versions: VERSIONS.to_vec(),
				parameters,
			};
			tracing::trace!(?client, "sending client setup");
			stream.writer.encode(&ControlMessage::ClientSetup(client)).await?;

			let server = match stream.reader.decode().await? {
				ControlMessage::ServerSetup(server) => server,
				_ => return Err(Error::ProtocolViolation),
			};
			tracing::trace!(?server, "received server setup");

			if !VERSIONS.contains(&server.version) {
				return Err(Error::Version);
			}

			Ok((stream, server.version, server.parameters))
		};

		let (stream, version, peer_parameters) = match tokio::time::timeout(SETUP_TIMEOUT, setup).await {
			Ok(Ok(setup)) => setup,
			Ok(Err(err)) => {
				transport.close(err.to_session_code(), &err.to_string());
				return Err(err);
			}
			Err(_) => {
				transport.close(Error::Timeout.to_session_code(), "setup timeout");
				return Err(Error::Timeout);
			}
		};

		tracing::debug!(%version, "connected");
		Ok(Self::start(transport, stream, mux, peer_parameters))
	}

	/// Perform the handshake as the listener.
	pub async fn accept<S: transport::Session>(transport: S, mux: impl Into<Option<TrackMux>>) -> Result<Self, Error> {
		let mux = mux.into().unwrap_or_else(|| TrackMux::global().clone());

		let setup = async {
			let mut stream = Stream::accept(&transport).await?;

			match stream.reader.decode().await? {
				BiStreamKind::Control => {}
				_ => return Err(Error::UnexpectedStream),
			}

			let client = match stream.reader.decode().await? {
				ControlMessage::ClientSetup(client) => client,
				_ => return Err(Error::ProtocolViolation),
			};
			tracing::trace!(?client, "received client setup");

			// Intersection, preferring the highest version.
			let version = client
				.versions
				.iter()
				.filter(|version| VERSIONS.contains(version))
				.max()
				.copied()
				.ok_or(Error::Version)?;

			let mut parameters = Parameters::default();
			parameters.set_varint(SetupParameter::MaxSubscribeId, u32::MAX as u64);

			let server = ServerSetup { version, parameters };
			tracing::trace!(?server, "sending server setup");
			stream.writer.encode(&ControlMessage::ServerSetup(server)).await?;

			Ok((stream, version, client.parameters))
		};

		let (stream, version, peer_parameters) = match tokio::time::timeout(SETUP_TIMEOUT, setup).await {
			Ok(Ok(setup)) => setup,
			Ok(Err(err)) => {
				transport.close(err.to_session_code(), &err.to_string());
				return Err(err);
			}
			Err(_) => {
				transport.close(Error::Timeout.to_session_code(), "setup timeout");
				return Err(Error::Timeout);
			}
		};

		tracing::debug!(%version, "accepted");
		Ok(Self::start(transport, stream, mux, peer_parameters))
	}

	fn start<S: transport::Session>(
		transport: S,
		control: Stream<S>,
		mux: TrackMux,
		peer_parameters: Parameters,
	) -> Self {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(SessionState::Open);

		Driver::start(transport.clone(), mux.clone(), state_tx, &peer_parameters, control, commands_rx);

		Self {
			inner: Arc::new(transport),
			commands: commands_tx,
			state: state_rx,
			mux,
			peer_parameters,
		}
	}

	/// Register a handler on this session's mux, announcing the path.
	///
	/// The broadcast stays active until the returned guard is dropped.
	pub fn publish(&self, path: BroadcastPath, handler: Arc<dyn TrackHandler>) -> Publication {
		self.mux.publish(path, handler)
	}

	/// Register a closure on this session's mux; see [Self::publish].
	pub fn publish_func<F, Fut>(&self, path: BroadcastPath, handler: F) -> Publication
	where
		F: Fn(TrackWriter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), Error>> + Send + 'static,
	{
		self.mux.publish_func(path, handler)
	}

	/// Subscribe to a track published by the peer.
	pub async fn subscribe<N: Into<String>>(&self, path: BroadcastPath, name: N) -> Result<TrackReader, Error> {
		self.subscribe_with(path, name, SubscribeOptions::default()).await
	}

	/// Subscribe with an explicit priority, order, and group range.
	pub async fn subscribe_with<N: Into<String>>(
		&self,
		path: BroadcastPath,
		name: N,
		options: SubscribeOptions,
	) -> Result<TrackReader, Error> {
		let track = Track::new(path, name)
			.with_priority(options.priority)
			.with_order(options.order);

		let (reply, response) = oneshot::channel();
		self.commands
			.send(Command::Subscribe { track, options, reply })
			.map_err(|_| Error::SessionClosed)?;
		response.await.map_err(|_| Error::SessionClosed)?
	}

	/// Watch the peer's announcements matching the pattern.
	pub async fn announced(&self, pattern: TrackPattern) -> Result<AnnounceReader, Error> {
		let (reply, response) = oneshot::channel();
		self.commands
			.send(Command::Announced { pattern, reply })
			.map_err(|_| Error::SessionClosed)?;
		response.await.map_err(|_| Error::SessionClosed)?
	}

	/// Ask the peer to reconnect elsewhere and start draining.
	pub fn go_away<U: Into<String>>(&self, uri: U) {
		let _ = self.commands.send(Command::GoAway { uri: uri.into() });
	}

	/// Flush a GoAway (best effort) and close the transport.
	pub fn close(&self, err: Error) {
		if self.commands.send(Command::Close { err: err.clone() }).is_err() {
			// The driver is already gone; close the transport directly.
			self.inner.close(err.to_session_code(), &err.to_string());
		}
	}

	/// The current lifecycle state.
	pub fn state(&self) -> SessionState {
		*self.state.borrow()
	}

	/// Wait until the session reaches the given state.
	pub async fn wait_state(&self, target: SessionState) -> Result<(), Error> {
		let mut state = self.state.clone();
		state
			.wait_for(|state| *state == target)
			.await
			.map_err(|_| Error::SessionClosed)?;
		Ok(())
	}

	/// The setup parameters advertised by the peer.
	pub fn peer_parameters(&self) -> &Parameters {
		&self.peer_parameters
	}

	/// The mux serving this session's publisher role.
	pub fn mux(&self) -> &TrackMux {
		&self.mux
	}

	/// Block until the transport session is closed.
	pub async fn closed(&self) -> Error {
		self.inner.closed().await
	}
}

// A dyn-compatible wrapper to erase the transport generic from [Session].
trait SessionInner: Send + Sync {
	fn close(&self, code: u32, reason: &str);
	fn closed(&self) -> Pin<Box<dyn Future<Output = Error> + Send + '_>>;
}

impl<S: transport::Session> SessionInner for S {
	fn close(&self, code: u32, reason: &str) {
		S::close(self, code, reason);
	}

	fn closed(&self) -> Pin<Box<dyn Future<Output = Error> + Send + '_>> {
		Box::pin(async move { Error::Transport(Arc::new(S::closed(self).await)) })
	}
}

/// Runs one session: accepts streams, routes control messages, executes commands.
struct Driver<S: transport::Session> {
	transport: S,
	mux: TrackMux,
	state: watch::Sender<SessionState>,
	control: mpsc::UnboundedSender<ControlSend>,
	fatal: mpsc::UnboundedSender<Error>,
	registry: ServeRegistry,
	subscriber: subscriber::Subscriber<S>,
	publisher: publisher::Publisher,
}

impl<S: transport::Session> Driver<S> {
	fn start(
		transport: S,
		mux: TrackMux,
		state: watch::Sender<SessionState>,
		peer: &Parameters,
		control: Stream<S>,
		commands: mpsc::UnboundedReceiver<Command>,
	) {
		let (control_tx, control_rx) = mpsc::unbounded_channel();
		let (fatal, fatal_rx) = mpsc::unbounded_channel();

		// Absent means the peer imposes no limit.
		let max_subscribe_id = peer.get_varint(SetupParameter::MaxSubscribeId).unwrap_or(u64::MAX);

		let driver = Self {
			subscriber: subscriber::Subscriber::new(max_subscribe_id, control_tx.clone()),
			publisher: publisher::Publisher::new(u32::MAX as u64),
			transport,
			mux,
			state,
			control: control_tx,
			fatal,
			registry: Default::default(),
		};

		web_async::spawn(driver.run(control, commands, control_rx, fatal_rx));
	}

	async fn run(
		self,
		control: Stream<S>,
		mut commands: mpsc::UnboundedReceiver<Command>,
		control_rx: mpsc::UnboundedReceiver<ControlSend>,
		mut fatal_rx: mpsc::UnboundedReceiver<Error>,
	) {
		let Stream {
			writer: control_writer,
			reader: mut control_reader,
		} = control;

		web_async::spawn(Self::run_control_writer(
			self.transport.clone(),
			control_writer,
			control_rx,
		));

		// All session handles may drop while the peer is still served.
		let mut commands_open = true;

		let err = loop {
			tokio::select! {
				command = commands.recv(), if commands_open => match command {
					Some(command) => self.handle_command(command),
					None => commands_open = false,
				},
				message = control_reader.decode_maybe::<ControlMessage>() => match message {
					Ok(Some(message)) => {
						if let Err(err) = self.handle_control(message) {
							break err;
						}
					}
					// Closing the control stream terminates the session.
					Ok(None) => break Error::SessionClosed,
					Err(err) => break err,
				},
				stream = Stream::accept(&self.transport) => match stream {
					Ok(stream) => self.accept_bi(stream),
					Err(err) => break err,
				},
				stream = self.transport.accept_uni() => match stream {
					Ok(stream) => self.accept_uni(stream),
					Err(err) => break Error::from_transport(err),
				},
				datagram = self.transport.recv_datagram() => match datagram {
					Ok(datagram) => self.subscriber.dispatch_datagram(datagram),
					Err(err) => break Error::from_transport(err),
				},
				Some(err) = fatal_rx.recv() => break err,
			}
		};

		tracing::debug!(%err, "session closed");
		self.transport.close(err.to_session_code(), &err.to_string());
		self.state.send_replace(SessionState::Closed);
	}

	async fn run_control_writer(
		transport: S,
		mut writer: Writer<S::SendStream>,
		mut queue: mpsc::UnboundedReceiver<ControlSend>,
	) {
		while let Some(send) = queue.recv().await {
			match send {
				ControlSend::Message(message) => {
					if writer.encode(&message).await.is_err() {
						return;
					}
				}
				ControlSend::CloseAfter(err) => {
					transport.close(err.to_session_code(), &err.to_string());
					return;
				}
			}
		}
	}

	fn handle_command(&self, command: Command) {
		match command {
			Command::Subscribe { track, options, reply } => {
				if *self.state.borrow() != SessionState::Open {
					let _ = reply.send(Err(Error::GoingAway));
					return;
				}
				self.subscriber
					.subscribe(&self.transport, track, options, reply, &self.fatal);
			}
			Command::Announced { pattern, reply } => {
				if *self.state.borrow() == SessionState::Closed {
					let _ = reply.send(Err(Error::SessionClosed));
					return;
				}
				subscriber::run_announced(&self.transport, pattern, reply, &self.fatal);
			}
			Command::GoAway { uri } => {
				self.state.send_replace(SessionState::GoingAway);
				let _ = self
					.control
					.send(ControlSend::Message(ControlMessage::GoAway(GoAway { uri })));
			}
			Command::Close { err } => {
				self.state.send_replace(SessionState::Closed);
				let _ = self
					.control
					.send(ControlSend::Message(ControlMessage::GoAway(GoAway {
						uri: String::new(),
					})));
				let _ = self.control.send(ControlSend::CloseAfter(err.clone()));

				// The writer task may be stuck behind a backed-up control
				// stream; close the transport once the deadline passes anyway.
				let transport = self.transport.clone();
				web_async::spawn(async move {
					tokio::time::sleep(CLOSE_TIMEOUT).await;
					transport.close(err.to_session_code(), &err.to_string());
				});
			}
		}
	}

	fn handle_control(&self, message: ControlMessage) -> Result<(), Error> {
		match message {
			ControlMessage::GoAway(goaway) => {
				tracing::debug!(uri = %goaway.uri, "received goaway");
				self.state.send_replace(SessionState::GoingAway);
				Ok(())
			}
			ControlMessage::MaxSubscribeId(max) => {
				self.subscriber.update_max(max.max);
				Ok(())
			}
			ControlMessage::SubscribeBlocked(blocked) => {
				tracing::warn!(max = blocked.max, "peer is blocked on subscribe ids");
				Ok(())
			}
			_ => Err(Error::ProtocolViolation),
		}
	}

	fn accept_bi(&self, stream: Stream<S>) {
		let handles = self.handles();
		web_async::spawn(async move {
			let mut stream = stream;
			let kind = match stream.reader.decode::<BiStreamKind>().await {
				Ok(kind) => kind,
				Err(Error::Decode(DecodeError::InvalidMessage(_))) => {
					stream.reader.abort(&Error::ProtocolViolation);
					let _ = handles.fatal.send(Error::UnexpectedStream);
					return;
				}
				Err(_) => return,
			};

			let result = match kind {
				// The control stream was already accepted during setup.
				BiStreamKind::Control => Err(Error::ProtocolViolation),
				BiStreamKind::Announce => publisher::run_announce(stream, &handles).await,
				BiStreamKind::Subscribe => publisher::run_subscribe(stream, &handles).await,
				BiStreamKind::Info => publisher::run_info(stream, &handles).await,
				BiStreamKind::Fetch => publisher::run_fetch(stream).await,
			};

			if let Err(err) = result {
				if err.is_fatal() {
					let _ = handles.fatal.send(err);
				}
			}
		});
	}

	fn accept_uni(&self, stream: S::RecvStream) {
		let subscriber = self.subscriber.clone();
		let fatal = self.fatal.clone();
		web_async::spawn(async move {
			let mut reader = Reader::new(stream);

			match reader.decode::<UniStreamKind>().await {
				Ok(UniStreamKind::Group) => {}
				Err(Error::Decode(DecodeError::InvalidMessage(_))) => {
					reader.abort(&Error::ProtocolViolation);
					let _ = fatal.send(Error::UnexpectedStream);
					return;
				}
				Err(_) => return,
			}

			let header = match reader.decode::<GroupHeader>().await {
				Ok(header) => header,
				Err(_) => {
					reader.abort(&Error::ProtocolViolation);
					return;
				}
			};

			subscriber.dispatch_group(header, reader);
		});
	}

	fn handles(&self) -> publisher::Handles<S> {
		publisher::Handles {
			transport: self.transport.clone(),
			mux: self.mux.clone(),
			state: self.state.subscribe(),
			fatal: self.fatal.clone(),
			registry: self.registry.clone(),
			publisher: self.publisher.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::{Fetch, GroupOrder, Subscribe};
	use crate::transport::mock::{self, MockError, MockSession};
	use bytes::Bytes;

	fn path(s: &str) -> BroadcastPath {
		s.try_into().unwrap()
	}

	fn pattern(s: &str) -> TrackPattern {
		s.try_into().unwrap()
	}

	async fn connected() -> (Session, Session) {
		let (a, b) = mock::pair();
		let (client, server) = tokio::join!(
			Session::connect(a, TrackMux::new()),
			Session::accept(b, TrackMux::new()),
		);
		(client.unwrap(), server.unwrap())
	}

	/// Speak the setup exchange by hand, for wire-level tests.
	async fn raw_connect(transport: &MockSession) -> Stream<MockSession> {
		let mut stream = Stream::open(transport).await.unwrap();
		stream.writer.encode(&BiStreamKind::Control).await.unwrap();
		stream
			.writer
			.encode(&ControlMessage::ClientSetup(ClientSetup {
				versions: VERSIONS.to_vec(),
				parameters: Default::default(),
			}))
			.await
			.unwrap();

		match stream.reader.decode().await.unwrap() {
			ControlMessage::ServerSetup(_) => stream,
			message => panic!("expected server setup, got {message:?}"),
		}
	}

	#[tokio::test]
	async fn setup_happy_path() {
		let (client, server) = connected().await;

		assert_eq!(client.state(), SessionState::Open);
		assert_eq!(server.state(), SessionState::Open);
		assert_eq!(
			client.peer_parameters().get_varint(SetupParameter::MaxSubscribeId),
			Some(u32::MAX as u64)
		);
	}

	#[tokio::test]
	async fn announce_then_subscribe() {
		let (client, server) = connected().await;

		let _publication = server.publish_func(path("/room/alice"), |mut track| async move {
			let mut group = track.append_group()?;
			group.write_frame(Bytes::from_static(b"HELLO"))?;
			group.close();
			Ok(())
		});

		let mut announced = client.announced(pattern("/room/**")).await.unwrap();
		let event = announced.next().await.unwrap().unwrap();
		assert_eq!(event.path.as_str(), "/room/alice");
		assert!(event.active);

		let mut track = client.subscribe(path("/room/alice"), "video").await.unwrap();
		let mut group = track.accept_group().await.unwrap().unwrap();
		assert_eq!(group.sequence(), 1);
		assert_eq!(group.read_frame().await.unwrap().unwrap().as_ref(), b"HELLO");
		assert!(group.read_frame().await.unwrap().is_none());
		assert!(track.accept_group().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn unannounce_on_publication_drop() {
		let (client, server) = connected().await;

		let publication = server.publish_func(path("/room/bob"), |_track| async { Ok(()) });

		let mut announced = client.announced(pattern("/room/*")).await.unwrap();
		assert!(announced.next().await.unwrap().unwrap().active);

		publication.end();
		let event = announced.next().await.unwrap().unwrap();
		assert_eq!(event.path.as_str(), "/room/bob");
		assert!(!event.active);
	}

	#[tokio::test]
	async fn subscribe_unknown_path_rejected() {
		let (client, _server) = connected().await;

		let err = client.subscribe(path("/nobody/home"), "").await.unwrap_err();
		assert!(matches!(err, Error::NotFound));
	}

	#[tokio::test]
	async fn duplicate_subscribe_id_closes_session() {
		let (a, b) = mock::pair();
		let accept = tokio::spawn(Session::accept(b, TrackMux::new()));
		let _control = raw_connect(&a).await;
		let _server = accept.await.unwrap().unwrap();

		// Keep the streams alive so resets don't race the reads.
		let mut streams = Vec::new();
		for _ in 0..2 {
			let mut stream = Stream::open(&a).await.unwrap();
			stream.writer.encode(&BiStreamKind::Subscribe).await.unwrap();
			stream
				.writer
				.encode(&ControlMessage::Subscribe(Subscribe {
					id: 7,
					path: path("/room/alice"),
					name: String::new(),
					priority: 0,
					order: GroupOrder::default(),
					min: 0,
					max: 0,
					parameters: Default::default(),
				}))
				.await
				.unwrap();
			streams.push(stream);
		}

		assert!(matches!(transport::Session::closed(&a).await, MockError::Closed(0x2)));
	}

	#[tokio::test]
	async fn closing_control_stream_terminates_session() {
		let (a, b) = mock::pair();
		let accept = tokio::spawn(Session::accept(b, TrackMux::new()));
		let control = raw_connect(&a).await;
		let server = accept.await.unwrap().unwrap();

		let Stream { writer, reader: _reader } = control;
		writer.finish().unwrap();

		assert!(matches!(transport::Session::closed(&a).await, MockError::Closed(0x0)));
		server.wait_state(SessionState::Closed).await.unwrap();
	}

	#[tokio::test]
	async fn fetch_is_always_rejected() {
		let (a, b) = mock::pair();
		let accept = tokio::spawn(Session::accept(b, TrackMux::new()));
		let _control = raw_connect(&a).await;
		let _server = accept.await.unwrap().unwrap();

		let mut stream = Stream::open(&a).await.unwrap();
		stream.writer.encode(&BiStreamKind::Fetch).await.unwrap();
		stream
			.writer
			.encode(&ControlMessage::Fetch(Fetch {
				path: path("/room/alice"),
				name: "video".to_string(),
				priority: 0,
				group: 1,
				frame: 0,
			}))
			.await
			.unwrap();

		match stream.reader.decode().await.unwrap() {
			ControlMessage::FetchError(err) => {
				assert_eq!(err.code, Error::Unsupported.to_reject_code());
			}
			message => panic!("expected fetch error, got {message:?}"),
		}
	}

	#[tokio::test]
	async fn cancel_mid_group_then_next_group() {
		let (client, server) = connected().await;

		let _publication = server.publish_func(path("/cam/front"), |mut track| async move {
			let mut group = track.append_group()?;
			// Keep writing until the subscriber loses interest.
			while group.write_frame(Bytes::from_static(b"stale")).is_ok() {
				tokio::time::sleep(Duration::from_millis(1)).await;
			}

			let mut group = track.append_group()?;
			group.write_frame(Bytes::from_static(b"fresh"))?;
			group.close();
			Ok(())
		});

		let mut track = client.subscribe(path("/cam/front"), "").await.unwrap();

		let mut group = track.accept_group().await.unwrap().unwrap();
		assert_eq!(group.read_frame().await.unwrap().unwrap().as_ref(), b"stale");
		group.cancel_read(Error::App(1));

		let mut next = track.accept_group().await.unwrap().unwrap();
		assert_eq!(next.sequence(), 2);
		assert_eq!(next.read_frame().await.unwrap().unwrap().as_ref(), b"fresh");
	}

	#[test]
	fn alpn_identifier() {
		assert_eq!(ALPN, "moq-00");
	}

	#[tokio::test]
	async fn groups_survive_publisher_farewell() {
		let (client, server) = connected().await;

		// The publisher returns immediately, so SubscribeDone chases the
		// group streams down the wire.
		let _publication = server.publish_func(path("/room/alice"), |mut track| async move {
			for byte in 1..=3u8 {
				let mut group = track.append_group()?;
				group.write_frame(Bytes::from(vec![byte]))?;
				group.close();
			}
			Ok(())
		});

		let mut track = client.subscribe(path("/room/alice"), "video").await.unwrap();
		for byte in 1..=3u8 {
			let mut group = track.accept_group().await.unwrap().unwrap();
			assert_eq!(group.sequence(), byte as u64);
			assert_eq!(group.read_frame().await.unwrap().unwrap(), Bytes::from(vec![byte]));
			assert!(group.read_frame().await.unwrap().is_none());
		}
		assert!(track.accept_group().await.unwrap().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn close_despite_stopped_control_stream() {
		let (a, b) = mock::pair();
		let accept = tokio::spawn(Session::accept(b, TrackMux::new()));
		let control = raw_connect(&a).await;
		let server = accept.await.unwrap().unwrap();

		// Refuse the farewell; the transport must still close.
		let Stream {
			writer: _writer,
			mut reader,
		} = control;
		reader.abort(&Error::Cancel);

		server.close(Error::Unauthorized);

		assert!(matches!(
			transport::Session::closed(&a).await,
			MockError::Closed(code) if code == Error::Unauthorized.to_session_code()
		));
	}

	#[tokio::test]
	async fn goaway_drains_new_subscribes() {
		let (client, server) = connected().await;

		server.go_away("https://relay2.example");
		client.wait_state(SessionState::GoingAway).await.unwrap();

		let err = client.subscribe(path("/room/alice"), "").await.unwrap_err();
		assert!(matches!(err, Error::GoingAway));
	}
}
