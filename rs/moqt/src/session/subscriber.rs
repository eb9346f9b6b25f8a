use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::coding::{Decode, Reader, Stream};
use crate::message::{
	BiStreamKind, ControlMessage, GroupHeader, GroupOrder, Subscribe, SubscribeAnnounces, SubscribeBlocked,
	Unsubscribe, UnsubscribeAnnounces,
};
use crate::model::{GroupWriter, Track, TrackReader, TrackWriter};
use crate::mux::Announcement;
use crate::{transport, Error, TrackPattern};

use super::ControlSend;

/// Knobs for [crate::Session::subscribe_with].
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
	pub priority: i8,
	pub order: GroupOrder,
	/// The first group sequence of interest, or 0 for any.
	pub min: u64,
	/// The last group sequence of interest inclusive, or 0 for unbounded.
	pub max: u64,
}

impl Default for SubscribeOptions {
	fn default() -> Self {
		Self {
			priority: 0,
			order: GroupOrder::default(),
			min: 0,
			max: 0,
		}
	}
}

/// Groups ride their own streams and may land after the publisher's farewell;
/// how long to keep accepting them once the subscription has ended cleanly.
const DRAIN_WINDOW: Duration = Duration::from_millis(250);

/// An incoming group for one subscription, either a stream or a datagram.
enum Delivery<S: transport::Session> {
	Stream(GroupHeader, Reader<S::RecvStream>),
	Datagram(GroupHeader, Bytes),
}

struct SubscriberState<S: transport::Session> {
	/// The next subscribe id to allocate.
	next_id: u64,
	/// The number of ids the peer allows, raised by MaxSubscribeId.
	max_id: u64,
	/// Whether we already told the peer we are blocked on the limit.
	blocked: bool,
	/// Active subscriptions by id, receiving their groups.
	active: HashMap<u64, mpsc::UnboundedSender<Delivery<S>>>,
}

/// The subscriber half of a session: allocates ids, routes groups to
/// subscriptions, watches announcements.
#[derive(Clone)]
pub(crate) struct Subscriber<S: transport::Session> {
	state: Arc<Mutex<SubscriberState<S>>>,
	notify: Arc<Notify>,
	control: mpsc::UnboundedSender<ControlSend>,
}

impl<S: transport::Session> Subscriber<S> {
	pub fn new(max_id: u64, control: mpsc::UnboundedSender<ControlSend>) -> Self {
		Self {
			state: Arc::new(Mutex::new(SubscriberState {
				next_id: 0,
				max_id,
				blocked: false,
				active: HashMap::new(),
			})),
			notify: Arc::new(Notify::new()),
			control,
		}
	}

	/// Raise the id limit, waking anything blocked on it.
	pub fn update_max(&self, max: u64) {
		let mut state = self.state.lock().unwrap();
		if max > state.max_id {
			state.max_id = max;
			state.blocked = false;
			self.notify.notify_waiters();
		}
	}

	/// Allocate the next subscribe id, waiting for the peer to raise the
	/// limit if necessary. Announces the stall with SubscribeBlocked once.
	async fn allocate(&self) -> u64 {
		loop {
			let notified = self.notify.notified();
			{
				let mut state = self.state.lock().unwrap();
				if state.next_id < state.max_id {
					let id = state.next_id;
					state.next_id += 1;
					return id;
				}
				if !state.blocked {
					state.blocked = true;
					let max = state.max_id;
					let _ = self
						.control
						.send(ControlSend::Message(ControlMessage::SubscribeBlocked(
							SubscribeBlocked { max },
						)));
				}
			}
			notified.await;
		}
	}

	pub fn subscribe(
		&self,
		transport: &S,
		track: Track,
		options: SubscribeOptions,
		reply: oneshot::Sender<Result<TrackReader, Error>>,
		fatal: &mpsc::UnboundedSender<Error>,
	) {
		let this = self.clone();
		let transport = transport.clone();
		let fatal = fatal.clone();

		web_async::spawn(async move {
			let id = this.allocate().await;

			let (tx, rx) = mpsc::unbounded_channel();
			this.state.lock().unwrap().active.insert(id, tx);

			let result = run_subscription(&transport, id, track, options, reply, rx).await;

			this.state.lock().unwrap().active.remove(&id);

			if let Err(err) = result {
				tracing::debug!(id, %err, "subscription failed");
				if err.is_fatal() {
					let _ = fatal.send(err);
				}
			}
		});
	}

	/// Route an accepted group stream to its subscription.
	pub fn dispatch_group(&self, header: GroupHeader, mut reader: Reader<S::RecvStream>) {
		let state = self.state.lock().unwrap();
		match state.active.get(&header.subscribe_id) {
			// Groups may race the end of their subscription.
			None => reader.abort(&Error::Cancel),
			Some(tx) => {
				if tx.send(Delivery::Stream(header, reader)).is_err() {
					// The subscription just ended; nothing to abort with.
				}
			}
		}
	}

	/// Route a datagram, which carries a group header and a single frame.
	pub fn dispatch_datagram(&self, mut payload: Bytes) {
		let header = match GroupHeader::decode(&mut payload) {
			Ok(header) => header,
			// Unreliable delivery; a mangled datagram is dropped.
			Err(_) => return,
		};

		let state = self.state.lock().unwrap();
		if let Some(tx) = state.active.get(&header.subscribe_id) {
			let _ = tx.send(Delivery::Datagram(header, payload));
		}
	}
}

/// Drive one subscription: the request, its response, then groups until done.
async fn run_subscription<S: transport::Session>(
	transport: &S,
	id: u64,
	track: Track,
	options: SubscribeOptions,
	reply: oneshot::Sender<Result<TrackReader, Error>>,
	mut deliveries: mpsc::UnboundedReceiver<Delivery<S>>,
) -> Result<(), Error> {
	let stream = match Stream::open(transport).await {
		Ok(stream) => stream,
		Err(err) => {
			let _ = reply.send(Err(err.clone()));
			return Err(err);
		}
	};
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	let request = Subscribe {
		id,
		path: track.path.clone(),
		name: track.name.clone(),
		priority: options.priority,
		order: options.order,
		min: options.min,
		max: options.max,
		parameters: Default::default(),
	};

	let setup = async {
		writer.encode(&BiStreamKind::Subscribe).await?;
		writer.encode(&ControlMessage::Subscribe(request)).await?;

		match reader.decode::<ControlMessage>().await? {
			ControlMessage::SubscribeOk(ok) => Ok(ok.info),
			ControlMessage::SubscribeError(err) => Err(Error::from_reject_code(err.code)),
			_ => Err(Error::ProtocolViolation),
		}
	};

	let info = match setup.await {
		Ok(info) => info,
		Err(err) => {
			let _ = reply.send(Err(err.clone()));
			// A rejection is an answer, not a failure of ours.
			return match err.is_fatal() {
				true => Err(err),
				false => Ok(()),
			};
		}
	};
	tracing::debug!(id, ?info, "subscribed");

	let (mut track_writer, track_reader) = track.produce();
	// The caller may have given up; unused() below will notice.
	let _ = reply.send(Ok(track_reader));

	let end: Result<(), Error> = loop {
		tokio::select! {
			delivery = deliveries.recv() => match delivery {
				Some(delivery) => {
					if let Err(err) = deliver(&mut track_writer, delivery) {
						break Err(err);
					}
				}
				// The driver is gone; the transport close will surface elsewhere.
				None => break Ok(()),
			},
			_ = track_writer.unused() => {
				let _ = writer.encode(&ControlMessage::Unsubscribe(Unsubscribe {})).await;
				let _ = writer.finish();
				track_writer.close();
				return Ok(());
			},
			message = reader.decode_maybe::<ControlMessage>() => match message {
				Ok(Some(ControlMessage::SubscribeDone(done))) => break match done.code {
					0 => Ok(()),
					code => Err(Error::from_reject_code(code)),
				},
				// The publisher finishing the stream also ends the subscription.
				Ok(None) => break Ok(()),
				Ok(Some(_)) => break Err(Error::ProtocolViolation),
				Err(err) => break Err(err),
			},
		}
	};

	// The farewell races groups still in the dispatch pipeline; keep accepting
	// them until the channel goes quiet so their frames are not lost.
	let end = match end {
		Ok(()) => drain(&mut track_writer, &mut deliveries).await,
		Err(err) => Err(err),
	};

	match &end {
		Ok(()) => track_writer.close(),
		Err(err) => track_writer.close_with_error(err.clone()),
	}

	match end {
		Err(err) if err.is_fatal() => Err(err),
		_ => Ok(()),
	}
}

/// Feed one delivery into the track, spawning a pump for stream groups.
fn deliver<S: transport::Session>(track_writer: &mut TrackWriter, delivery: Delivery<S>) -> Result<(), Error> {
	match delivery {
		Delivery::Stream(header, mut group_reader) => match track_writer.open_group(header.sequence) {
			Ok(group) => {
				web_async::spawn(pump_group(group_reader, group));
				Ok(())
			}
			// Reusing a sequence on the wire is a protocol violation.
			Err(Error::Duplicate) => {
				group_reader.abort(&Error::ProtocolViolation);
				Err(Error::ProtocolViolation)
			}
			// The track is closing; we are no longer interested.
			Err(_) => {
				group_reader.abort(&Error::Cancel);
				Ok(())
			}
		},
		Delivery::Datagram(header, frame) => match track_writer.open_group(header.sequence) {
			Ok(mut group) => {
				let _ = group.write_frame(frame);
				group.close();
				Ok(())
			}
			Err(Error::Duplicate) => Err(Error::ProtocolViolation),
			Err(_) => Ok(()),
		},
	}
}

/// Accept late deliveries until [DRAIN_WINDOW] passes without one.
async fn drain<S: transport::Session>(
	track_writer: &mut TrackWriter,
	deliveries: &mut mpsc::UnboundedReceiver<Delivery<S>>,
) -> Result<(), Error> {
	loop {
		match tokio::time::timeout(DRAIN_WINDOW, deliveries.recv()).await {
			Ok(Some(delivery)) => deliver(track_writer, delivery)?,
			Ok(None) | Err(_) => return Ok(()),
		}
	}
}

/// Copy frames off one group stream into the model.
async fn pump_group<R: transport::RecvStream>(mut reader: Reader<R>, mut group: GroupWriter) {
	let end = loop {
		match reader.decode_maybe::<Bytes>().await {
			Ok(Some(frame)) => match group.write_frame(frame) {
				Ok(()) => {}
				// The local reader cancelled; tell the peer to stop sending.
				Err(err) => break Err(err),
			},
			Ok(None) => break Ok(None),
			Err(err) => break Ok(Some(err)),
		}
	};

	match end {
		Ok(None) => group.close(),
		Ok(Some(err)) => group.cancel_write(err),
		Err(err) => {
			reader.abort(&err);
			group.cancel_write(err);
		}
	}
}

/// Open an announce stream and forward its events to an [AnnounceReader].
pub(crate) fn run_announced<S: transport::Session>(
	transport: &S,
	pattern: TrackPattern,
	reply: oneshot::Sender<Result<AnnounceReader, Error>>,
	fatal: &mpsc::UnboundedSender<Error>,
) {
	let transport = transport.clone();
	let fatal = fatal.clone();

	web_async::spawn(async move {
		if let Err(err) = run_announce_stream(transport, pattern, reply).await {
			tracing::debug!(%err, "announce stream failed");
			if err.is_fatal() {
				let _ = fatal.send(err);
			}
		}
	});
}

async fn run_announce_stream<S: transport::Session>(
	transport: S,
	pattern: TrackPattern,
	reply: oneshot::Sender<Result<AnnounceReader, Error>>,
) -> Result<(), Error> {
	let stream = match Stream::open(&transport).await {
		Ok(stream) => stream,
		Err(err) => {
			let _ = reply.send(Err(err.clone()));
			return Err(err);
		}
	};
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	let setup = async {
		writer.encode(&BiStreamKind::Announce).await?;
		writer
			.encode(&ControlMessage::SubscribeAnnounces(SubscribeAnnounces { pattern }))
			.await?;

		match reader.decode::<ControlMessage>().await? {
			ControlMessage::SubscribeAnnouncesOk(_) => Ok(()),
			ControlMessage::SubscribeAnnouncesError(err) => Err(Error::from_reject_code(err.code)),
			_ => Err(Error::ProtocolViolation),
		}
	};

	if let Err(err) = setup.await {
		let _ = reply.send(Err(err.clone()));
		return match err.is_fatal() {
			true => Err(err),
			false => Ok(()),
		};
	}

	let (tx, rx) = mpsc::unbounded_channel();
	let _ = reply.send(Ok(AnnounceReader { rx }));

	loop {
		tokio::select! {
			message = reader.decode_maybe::<ControlMessage>() => match message {
				Ok(Some(ControlMessage::Announce(msg))) => {
					let _ = tx.send(Ok(Announcement { path: msg.path, active: true }));
				}
				Ok(Some(ControlMessage::Unannounce(msg))) => {
					let _ = tx.send(Ok(Announcement { path: msg.path, active: false }));
				}
				Ok(None) => return Ok(()),
				Ok(Some(_)) => {
					let _ = tx.send(Err(Error::ProtocolViolation));
					return Err(Error::ProtocolViolation);
				}
				Err(err) => {
					let _ = tx.send(Err(err.clone()));
					return Err(err);
				}
			},
			_ = tx.closed() => {
				let _ = writer
					.encode(&ControlMessage::UnsubscribeAnnounces(UnsubscribeAnnounces {}))
					.await;
				let _ = writer.finish();
				return Ok(());
			},
		}
	}
}

/// A live feed of the peer's announcements matching one pattern.
///
/// Dropping it unsubscribes.
pub struct AnnounceReader {
	rx: mpsc::UnboundedReceiver<Result<Announcement, Error>>,
}

impl AnnounceReader {
	/// The next event, or None once the peer ends the feed.
	pub async fn next(&mut self) -> Result<Option<Announcement>, Error> {
		match self.rx.recv().await {
			None => Ok(None),
			Some(Ok(announcement)) => Ok(Some(announcement)),
			Some(Err(err)) => Err(err),
		}
	}
}
