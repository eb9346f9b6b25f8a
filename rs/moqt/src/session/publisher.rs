use std::{
	collections::HashSet,
	panic::AssertUnwindSafe,
	sync::{Arc, Mutex},
};

use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::coding::{DecodeError, Stream, Writer};
use crate::message::{
	Announce, ControlMessage, FetchError, GroupHeader, Info, Subscribe, SubscribeAnnouncesError,
	SubscribeAnnouncesOk, SubscribeDone, SubscribeError, SubscribeOk, TrackStatus, UniStreamKind, Unannounce,
};
use crate::model::{GroupReader, Track};
use crate::mux::TrackMux;
use crate::{transport, Error};

use super::{ServeRegistry, SessionState};

/// The publisher half of a session: validates the peer's subscribe ids.
#[derive(Clone)]
pub(crate) struct Publisher {
	state: Arc<Mutex<PublisherState>>,
}

struct PublisherState {
	/// Every id the peer ever used; reuse is fatal.
	used: HashSet<u64>,
	/// The limit we advertised during setup.
	max_id: u64,
}

impl Publisher {
	pub fn new(max_id: u64) -> Self {
		Self {
			state: Arc::new(Mutex::new(PublisherState {
				used: HashSet::new(),
				max_id,
			})),
		}
	}

	/// Claim a peer-allocated subscribe id, failing on reuse or overflow.
	fn claim(&self, id: u64) -> Result<(), Error> {
		let mut state = self.state.lock().unwrap();
		if id >= state.max_id {
			return Err(Error::ProtocolViolation);
		}
		if !state.used.insert(id) {
			return Err(Error::ProtocolViolation);
		}
		Ok(())
	}
}

/// The shared handles a publisher-side stream task needs.
pub(crate) struct Handles<S: transport::Session> {
	pub transport: S,
	pub mux: TrackMux,
	pub state: watch::Receiver<SessionState>,
	pub fatal: mpsc::UnboundedSender<Error>,
	pub registry: ServeRegistry,
	pub publisher: Publisher,
}

/// Serve one announce stream: reply, then forward mux events until the
/// subscriber loses interest.
pub(crate) async fn run_announce<S: transport::Session>(stream: Stream<S>, handles: &Handles<S>) -> Result<(), Error> {
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	let pattern = match reader.decode::<ControlMessage>().await {
		Ok(ControlMessage::SubscribeAnnounces(msg)) => msg.pattern,
		Ok(_) => return Err(Error::ProtocolViolation),
		// The pattern itself failed validation.
		Err(Error::Decode(DecodeError::InvalidValue)) => {
			let err = Error::InvalidPattern;
			writer
				.encode(&ControlMessage::SubscribeAnnouncesError(SubscribeAnnouncesError {
					code: err.to_reject_code(),
					reason: err.to_string(),
				}))
				.await?;
			let _ = writer.finish();
			return Ok(());
		}
		Err(err) => return Err(err),
	};

	writer
		.encode(&ControlMessage::SubscribeAnnouncesOk(SubscribeAnnouncesOk {}))
		.await?;
	tracing::debug!(pattern = %pattern.as_str(), "serving announcements");

	let mut announced = handles.mux.announced(pattern);

	loop {
		tokio::select! {
			event = announced.next() => match event {
				Some(event) => {
					let message = match event.active {
						true => ControlMessage::Announce(Announce { path: event.path }),
						false => ControlMessage::Unannounce(Unannounce { path: event.path }),
					};
					writer.encode(&message).await?;
				}
				// The mux itself went away.
				None => return Ok(()),
			},
			message = reader.decode_maybe::<ControlMessage>() => match message {
				Ok(Some(ControlMessage::UnsubscribeAnnounces(_))) | Ok(None) => {
					let _ = writer.finish();
					return Ok(());
				}
				Ok(Some(_)) => return Err(Error::ProtocolViolation),
				Err(err) => return Err(err),
			},
		}
	}
}

/// How a subscription concluded, deciding the last message on its stream.
enum End {
	/// Send SubscribeDone and finish.
	Done(u64, String),
	/// Send SubscribeError and finish; used for rejected updates.
	Reject(Error),
	/// No farewell; the stream reset says it all.
	Quiet(Error),
	/// Tear the whole session down.
	Fatal(Error),
}

/// Serve one subscribe stream end to end.
pub(crate) async fn run_subscribe<S: transport::Session>(stream: Stream<S>, handles: &Handles<S>) -> Result<(), Error> {
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	let request = match reader.decode::<ControlMessage>().await? {
		ControlMessage::Subscribe(msg) => msg,
		_ => return Err(Error::ProtocolViolation),
	};
	tracing::debug!(id = request.id, path = %request.path, name = %request.name, "subscribe");

	handles.publisher.claim(request.id)?;

	if *handles.state.borrow() != SessionState::Open {
		return reject(writer, Error::GoingAway).await;
	}

	let handler = match handles.mux.handler(&request.path) {
		Some(handler) => handler,
		None => return reject(writer, Error::NotFound).await,
	};

	let track = Track::new(request.path.clone(), request.name.clone())
		.with_priority(request.priority)
		.with_order(request.order);
	let (track_writer, track_reader) = track.produce();

	let info = track_writer.info();
	writer.encode(&ControlMessage::SubscribeOk(SubscribeOk { info })).await?;

	let key = (request.path.clone(), request.name.clone());
	handles.registry.lock().unwrap().insert(key.clone(), info);

	// The handler runs as its own task so a panic only kills this subscription.
	let (outcome_tx, outcome_rx) = oneshot::channel();
	let serving = handler.serve_track(track_writer);
	web_async::spawn(async move {
		let outcome = match AssertUnwindSafe(serving).catch_unwind().await {
			Ok(result) => result,
			Err(_) => {
				tracing::error!("track handler panicked");
				Err(Error::Internal)
			}
		};
		let _ = outcome_tx.send(outcome);
	});

	let end = serve_subscription(handles, request, &mut reader, track_reader, outcome_rx, &key).await;

	handles.registry.lock().unwrap().remove(&key);

	match end {
		End::Done(code, reason) => {
			let _ = writer
				.encode(&ControlMessage::SubscribeDone(SubscribeDone { code, reason }))
				.await;
			let _ = writer.finish();
			Ok(())
		}
		End::Reject(err) => {
			let _ = writer
				.encode(&ControlMessage::SubscribeError(SubscribeError {
					code: err.to_reject_code(),
					reason: err.to_string(),
				}))
				.await;
			let _ = writer.finish();
			Ok(())
		}
		End::Quiet(err) => {
			writer.abort(&err);
			Ok(())
		}
		End::Fatal(err) => Err(err),
	}
}

async fn serve_subscription<S: transport::Session>(
	handles: &Handles<S>,
	request: Subscribe,
	reader: &mut crate::coding::Reader<S::RecvStream>,
	mut track_reader: crate::model::TrackReader,
	mut outcome_rx: oneshot::Receiver<Result<(), Error>>,
	key: &(crate::BroadcastPath, String),
) -> End {
	let mut min = request.min;
	let mut max = request.max;
	let mut priority = request.priority;

	let mut handler_error: Option<Error> = None;
	let mut handler_running = true;
	let mut tasks = FuturesUnordered::new();

	let end = loop {
		tokio::select! {
			group = track_reader.accept_group() => match group {
				Ok(Some(group)) => {
					let sequence = group.sequence();
					// Skipped groups are dropped, cancelling their writers.
					if sequence < min || (max != 0 && sequence > max) {
						continue;
					}
					handles
						.registry
						.lock()
						.unwrap()
						.entry(key.clone())
						.and_modify(|info| info.latest = sequence);

					let header = GroupHeader {
						subscribe_id: request.id,
						sequence,
						priority,
					};
					tasks.push(serve_group(handles.transport.clone(), header, group));
				}
				Ok(None) => break match handler_error.take() {
					Some(err) => End::Done(err.to_reject_code(), err.to_string()),
					None => End::Done(0, String::new()),
				},
				Err(err) => break End::Done(err.to_reject_code(), err.to_string()),
			},
			message = reader.decode_maybe::<ControlMessage>() => match message {
				Ok(Some(ControlMessage::SubscribeUpdate(update))) => {
					let widen_min = min != 0 && update.min < min;
					let widen_max = max != 0 && (update.max == 0 || update.max > max);
					if widen_min || widen_max {
						break End::Reject(Error::InvalidRange);
					}
					min = update.min;
					max = update.max;
					priority = update.priority;
				}
				Ok(Some(ControlMessage::Unsubscribe(_))) | Ok(None) => break End::Done(0, String::new()),
				Ok(Some(_)) => break End::Fatal(Error::ProtocolViolation),
				Err(err) if err.is_fatal() => break End::Fatal(err),
				Err(err) => break End::Quiet(err),
			},
			outcome = &mut outcome_rx, if handler_running => {
				handler_running = false;
				match outcome {
					Ok(Err(err)) => handler_error = Some(err),
					// Channel loss means the runtime tore the task down.
					Ok(Ok(())) | Err(_) => {}
				}
				// The track writer is gone; accept_group drains and then ends.
			},
			Some(result) = tasks.next(), if !tasks.is_empty() => {
				if let Err(err) = result {
					tracing::debug!(%err, "group stream failed");
				}
			},
		}
	};

	// Let in-flight groups flush before the farewell message.
	while tasks.next().await.is_some() {}

	end
}

async fn reject<S: transport::SendStream>(mut writer: Writer<S>, err: Error) -> Result<(), Error> {
	writer
		.encode(&ControlMessage::SubscribeError(SubscribeError {
			code: err.to_reject_code(),
			reason: err.to_string(),
		}))
		.await?;
	writer.finish()
}

/// Copy one group onto its own unidirectional stream.
async fn serve_group<S: transport::Session>(
	transport: S,
	header: GroupHeader,
	mut group: GroupReader,
) -> Result<(), Error> {
	let send = transport.open_uni().await.map_err(Error::from_transport)?;
	let mut writer = Writer::new(send);

	// Map the signed priority onto the transport's unsigned scale.
	writer.set_priority(((header.priority as i16) + 128) as u8);
	writer.encode(&UniStreamKind::Group).await?;
	writer.encode(&header).await?;

	let end = loop {
		tokio::select! {
			frame = group.read_frame() => match frame {
				Ok(Some(frame)) => {
					writer.encode(&frame.len()).await?;
					let mut frame = frame;
					writer.write_all(&mut frame).await?;
				}
				Ok(None) => break Ok(()),
				Err(err) => break Err(err),
			},
			closed = writer.closed() => break match closed {
				// The peer stopped the stream; it lost interest in the group.
				Err(err) => Err(err),
				Ok(()) => Err(Error::Cancel),
			},
		}
	};

	match end {
		Ok(()) => writer.finish(),
		Err(err) => {
			writer.abort(&err);
			group.cancel_read(err.clone());
			Err(err)
		}
	}
}

/// Serve one info stream: answer a TrackStatusRequest and finish.
pub(crate) async fn run_info<S: transport::Session>(stream: Stream<S>, handles: &Handles<S>) -> Result<(), Error> {
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	let request = match reader.decode::<ControlMessage>().await? {
		ControlMessage::TrackStatusRequest(msg) => msg,
		_ => return Err(Error::ProtocolViolation),
	};

	let key = (request.path.clone(), request.name.clone());
	let active = handles.registry.lock().unwrap().get(&key).copied();

	let info = match active {
		Some(info) => info,
		// Known broadcast without an active subscription: defaults only.
		None if handles.mux.handler(&request.path).is_some() => Info {
			priority: 0,
			latest: 0,
			order: Default::default(),
		},
		None => {
			writer.abort(&Error::NotFound);
			return Ok(());
		}
	};

	writer.encode(&ControlMessage::TrackStatus(TrackStatus { info })).await?;
	writer.finish()
}

/// Fetch is on the wire but not served; every request is rejected.
pub(crate) async fn run_fetch<S: transport::Session>(stream: Stream<S>) -> Result<(), Error> {
	let Stream {
		mut writer,
		mut reader,
	} = stream;

	match reader.decode::<ControlMessage>().await? {
		ControlMessage::Fetch(fetch) => {
			tracing::debug!(path = %fetch.path, name = %fetch.name, "rejecting fetch");
			let err = Error::Unsupported;
			writer
				.encode(&ControlMessage::FetchError(FetchError {
					code: err.to_reject_code(),
					reason: err.to_string(),
				}))
				.await?;
			writer.finish()
		}
		_ => Err(Error::ProtocolViolation),
	}
}
