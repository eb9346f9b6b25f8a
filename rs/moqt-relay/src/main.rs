//! Relay server connecting publishers to subscribers.
//!
//! Every announced broadcast is republished to every other session, with one
//! upstream subscription shared by any number of downstream subscribers.

mod connection;

pub use connection::*;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "moqt-relay", about = "A relay for Media over QUIC Transport")]
struct Config {
	#[command(flatten)]
	log: moqt_native::Log,

	#[command(flatten)]
	server: moqt_native::ServerConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	moqt_native::rustls::crypto::aws_lc_rs::default_provider()
		.install_default()
		.expect("failed to install default crypto provider");

	let config = Config::parse();
	config.log.init();

	let mut server = config.server.init()?;
	tracing::info!(addr = ?server.local_addr()?, "listening");

	// Every session publishes into and subscribes from the same mux.
	let mux = moqt::TrackMux::new();

	let mut conn_id = 0;

	while let Some(request) = server.accept().await {
		let conn = Connection {
			id: conn_id,
			request,
			mux: mux.clone(),
		};

		conn_id += 1;
		tokio::spawn(async move {
			if let Err(err) = conn.run().await {
				tracing::warn!(%err, "connection closed");
			}
		});
	}

	Ok(())
}
