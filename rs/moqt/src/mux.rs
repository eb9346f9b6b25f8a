use std::{
	collections::HashMap,
	sync::{Arc, Mutex, OnceLock},
};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::model::TrackWriter;
use crate::{BroadcastPath, Error, TrackPattern};

/// A broadcast appeared or went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
	pub path: BroadcastPath,
	pub active: bool,
}

/// Serves subscriptions for one broadcast.
///
/// The handler is called once per accepted subscription with a [TrackWriter]
/// whose lifetime is that subscription. It may block, producing groups.
pub trait TrackHandler: Send + Sync {
	fn serve_track(&self, track: TrackWriter) -> BoxFuture<'static, Result<(), Error>>;
}

/// Adapts a closure into a [TrackHandler].
pub struct TrackHandlerFn<F>(pub F);

impl<F, Fut> TrackHandler for TrackHandlerFn<F>
where
	F: Fn(TrackWriter) -> Fut + Send + Sync,
	Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
{
	fn serve_track(&self, track: TrackWriter) -> BoxFuture<'static, Result<(), Error>> {
		(self.0)(track).boxed()
	}
}

struct Registration {
	handler: Arc<dyn TrackHandler>,
	epoch: u64,
}

struct Watcher {
	id: u64,
	pattern: TrackPattern,
	tx: mpsc::UnboundedSender<Announcement>,
}

#[derive(Default)]
struct MuxState {
	handlers: HashMap<BroadcastPath, Registration>,
	watchers: Vec<Watcher>,
	next_watcher: u64,
	next_epoch: u64,
}

impl MuxState {
	fn emit(&mut self, announcement: Announcement) {
		// Dead watchers are collected lazily on send failure.
		self.watchers.retain(|watcher| {
			if !watcher.pattern.matches(&announcement.path) {
				return true;
			}
			watcher.tx.send(announcement.clone()).is_ok()
		});
	}

	fn unpublish(&mut self, path: &BroadcastPath, epoch: u64) {
		let current = match self.handlers.get(path) {
			Some(registration) => registration.epoch,
			None => return,
		};
		// A replacement already ended this registration.
		if current != epoch {
			return;
		}
		self.handlers.remove(path);
		self.emit(Announcement {
			path: path.clone(),
			active: false,
		});
	}
}

/// The registry matching broadcast paths to handlers, fanning announcements
/// out to every interested watcher.
#[derive(Clone, Default)]
pub struct TrackMux {
	state: Arc<Mutex<MuxState>>,
}

impl TrackMux {
	pub fn new() -> Self {
		Self::default()
	}

	/// The process-wide mux, used by sessions created without an explicit one.
	pub fn global() -> &'static TrackMux {
		static GLOBAL: OnceLock<TrackMux> = OnceLock::new();
		GLOBAL.get_or_init(TrackMux::new)
	}

	/// Register a handler, announcing the path as active.
	///
	/// Replaces any prior handler at the path, ending its announcement first.
	/// The returned guard ends the announcement when dropped.
	pub fn publish(&self, path: BroadcastPath, handler: Arc<dyn TrackHandler>) -> Publication {
		let mut state = self.lock();

		let epoch = state.next_epoch;
		state.next_epoch += 1;

		if state
			.handlers
			.insert(path.clone(), Registration { handler, epoch })
			.is_some()
		{
			state.emit(Announcement {
				path: path.clone(),
				active: false,
			});
		}
		state.emit(Announcement {
			path: path.clone(),
			active: true,
		});
		drop(state);

		tracing::debug!(%path, "announced");

		Publication {
			state: self.state.clone(),
			path,
			epoch,
		}
	}

	/// Register a closure as the handler; see [Self::publish].
	pub fn publish_func<F, Fut>(&self, path: BroadcastPath, handler: F) -> Publication
	where
		F: Fn(TrackWriter) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
	{
		self.publish(path, Arc::new(TrackHandlerFn(handler)))
	}

	/// The handler registered at the path, if any.
	pub fn handler(&self, path: &BroadcastPath) -> Option<Arc<dyn TrackHandler>> {
		self.lock().handlers.get(path).map(|registration| registration.handler.clone())
	}

	/// Watch announcements matching the pattern.
	///
	/// Currently active paths are delivered first, then every change in the
	/// order the mux observed it.
	pub fn announced(&self, pattern: TrackPattern) -> Announced {
		let (tx, rx) = mpsc::unbounded_channel();
		let mut state = self.lock();

		// Snapshot and registration are atomic so no event is lost or duplicated.
		let mut active: Vec<&BroadcastPath> = state
			.handlers
			.keys()
			.filter(|path| pattern.matches(path))
			.collect();
		active.sort();
		for path in active {
			let _ = tx.send(Announcement {
				path: path.clone(),
				active: true,
			});
		}

		let id = state.next_watcher;
		state.next_watcher += 1;
		state.watchers.push(Watcher { id, pattern, tx });

		Announced {
			state: self.state.clone(),
			id,
			rx,
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MuxState> {
		self.state.lock().unwrap()
	}
}

/// Keeps a published broadcast active; dropping it announces the end.
pub struct Publication {
	state: Arc<Mutex<MuxState>>,
	path: BroadcastPath,
	epoch: u64,
}

impl Publication {
	pub fn path(&self) -> &BroadcastPath {
		&self.path
	}

	/// End the announcement now instead of on drop.
	pub fn end(self) {}
}

impl Drop for Publication {
	fn drop(&mut self) {
		self.state.lock().unwrap().unpublish(&self.path, self.epoch);
	}
}

/// A stream of [Announcement]s matching one pattern.
pub struct Announced {
	state: Arc<Mutex<MuxState>>,
	id: u64,
	rx: mpsc::UnboundedReceiver<Announcement>,
}

impl Announced {
	/// The next event, or None once the mux is gone.
	pub async fn next(&mut self) -> Option<Announcement> {
		self.rx.recv().await
	}
}

impl Drop for Announced {
	fn drop(&mut self) {
		let mut state = self.state.lock().unwrap();
		state.watchers.retain(|watcher| watcher.id != self.id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn path(s: &str) -> BroadcastPath {
		s.try_into().unwrap()
	}

	fn pattern(s: &str) -> TrackPattern {
		s.try_into().unwrap()
	}

	fn noop() -> Arc<dyn TrackHandler> {
		Arc::new(TrackHandlerFn(|_track| async { Ok(()) }))
	}

	#[tokio::test]
	async fn snapshot_then_live() {
		let mux = TrackMux::new();
		let _a = mux.publish(path("/room/a"), noop());

		let mut announced = mux.announced(pattern("/room/**"));
		let first = announced.next().await.unwrap();
		assert_eq!(first.path.as_str(), "/room/a");
		assert!(first.active);

		let _b = mux.publish(path("/room/b"), noop());
		let second = announced.next().await.unwrap();
		assert_eq!(second.path.as_str(), "/room/b");
		assert!(second.active);
	}

	#[tokio::test]
	async fn pattern_filters() {
		let mux = TrackMux::new();
		let mut announced = mux.announced(pattern("/room/*"));

		let _other = mux.publish(path("/lobby/x"), noop());
		let _nested = mux.publish(path("/room/a/b"), noop());
		let _direct = mux.publish(path("/room/a"), noop());

		let event = announced.next().await.unwrap();
		assert_eq!(event.path.as_str(), "/room/a");
	}

	#[tokio::test]
	async fn ended_on_drop() {
		let mux = TrackMux::new();
		let mut announced = mux.announced(pattern("/"));

		let publication = mux.publish(path("/room/a"), noop());
		assert!(announced.next().await.unwrap().active);

		publication.end();
		let event = announced.next().await.unwrap();
		assert_eq!(event.path.as_str(), "/room/a");
		assert!(!event.active);
		assert!(mux.handler(&path("/room/a")).is_none());
	}

	#[tokio::test]
	async fn replace_emits_ended_then_active() {
		let mux = TrackMux::new();
		let mut announced = mux.announced(pattern("/"));

		let first = mux.publish(path("/room/a"), noop());
		assert!(announced.next().await.unwrap().active);

		let _second = mux.publish(path("/room/a"), noop());
		assert!(!announced.next().await.unwrap().active);
		assert!(announced.next().await.unwrap().active);

		// The replaced guard must not end the new registration.
		drop(first);
		assert!(mux.handler(&path("/room/a")).is_some());

		// And no stray event was emitted for it.
		let _third = mux.publish(path("/room/b"), noop());
		assert_eq!(announced.next().await.unwrap().path.as_str(), "/room/b");
	}

	#[tokio::test]
	async fn alternating_active_ended() {
		let mux = TrackMux::new();
		let mut announced = mux.announced(pattern("/"));

		for _ in 0..3 {
			let publication = mux.publish(path("/room/a"), noop());
			publication.end();
		}

		let mut last_active = false;
		for _ in 0..6 {
			let event = announced.next().await.unwrap();
			assert_ne!(event.active, last_active, "events must alternate");
			last_active = event.active;
		}
	}
}
