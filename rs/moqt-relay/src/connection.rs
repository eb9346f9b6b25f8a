use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use moqt::model::TrackWriter;
use moqt::{BroadcastPath, Publication, Session, TrackMux, TrackPattern, TrackRelay};

pub struct Connection {
	pub id: u64,
	pub request: moqt_native::Request,
	pub mux: TrackMux,
}

impl Connection {
	#[tracing::instrument("conn", skip_all, fields(id = self.id))]
	pub async fn run(self) -> anyhow::Result<()> {
		if let Some(url) = self.request.url() {
			tracing::debug!(%url, "webtransport request");
		}

		let session = self.request.accept(self.mux.clone()).await?;
		tracing::info!("session established");

		// Watch everything the peer announces and republish it for the others.
		let mut announced = session.announced(TrackPattern::new("/")?).await?;

		// Dropping a publication withdraws the announcement, so the peer's
		// broadcasts disappear with the peer.
		let mut origins: HashMap<BroadcastPath, Publication> = HashMap::new();

		loop {
			tokio::select! {
				announcement = announced.next() => match announcement? {
					Some(announcement) if announcement.active => {
						tracing::info!(path = %announcement.path, "announced");
						let publication = republish(&self.mux, session.clone(), announcement.path.clone());
						origins.insert(announcement.path, publication);
					}
					Some(announcement) => {
						tracing::info!(path = %announcement.path, "unannounced");
						origins.remove(&announcement.path);
					}
					None => break,
				},
				err = session.closed() => {
					tracing::debug!(%err, "session closed");
					break;
				}
			}
		}

		Ok(())
	}
}

/// Serve the peer's broadcast to every other session.
///
/// Each track keeps one upstream subscription per generation, shared by all
/// downstream subscribers through a [TrackRelay].
fn republish(mux: &TrackMux, upstream: Session, path: BroadcastPath) -> Publication {
	let relays = Arc::new(Mutex::new(Relays::default()));

	mux.publish_func(path, move |writer: TrackWriter| {
		serve(relays.clone(), upstream.clone(), writer).boxed()
	})
}

#[derive(Default)]
struct Relays {
	epoch: u64,
	active: HashMap<String, (u64, TrackRelay)>,
}

async fn serve(relays: Arc<Mutex<Relays>>, upstream: Session, mut writer: TrackWriter) -> Result<(), moqt::Error> {
	let track = writer.track().clone();

	loop {
		let (epoch, relay, fresh) = {
			let mut state = relays.lock().unwrap();
			match state.active.get(&track.name) {
				Some((epoch, relay)) => (*epoch, relay.clone(), false),
				None => {
					state.epoch += 1;
					let epoch = state.epoch;
					let relay = TrackRelay::new();
					state.active.insert(track.name.clone(), (epoch, relay.clone()));
					(epoch, relay, true)
				}
			}
		};

		if fresh {
			let reader = match upstream.subscribe(track.path.clone(), track.name.clone()).await {
				Ok(reader) => reader,
				Err(err) => {
					remove_relay(&relays, &track.name, epoch);
					return Err(err);
				}
			};

			tracing::debug!(path = %track.path, name = %track.name, "subscribed upstream");

			let runner = relay.clone();
			let relays = relays.clone();
			let name = track.name.clone();
			tokio::spawn(async move {
				let result = runner.run(reader).await;
				// The relay is done either way; the next subscriber re-subscribes.
				remove_relay(&relays, &name, epoch);
				if let Err(err) = result {
					tracing::debug!(%err, %name, "relay ended");
				}
			});
		}

		match relay.add_destination(writer) {
			Ok(()) => return Ok(()),
			Err(returned) => {
				// The relay ended between lookup and attach; retry with a fresh one.
				writer = returned;
				remove_relay(&relays, &track.name, epoch);
			}
		}
	}
}

fn remove_relay(relays: &Arc<Mutex<Relays>>, name: &str, epoch: u64) {
	let mut state = relays.lock().unwrap();
	if state.active.get(name).is_some_and(|(current, _)| *current == epoch) {
		state.active.remove(name);
	}
}
