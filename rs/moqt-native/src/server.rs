use std::path::PathBuf;
use std::sync::Arc;
use std::{fs, io, net, time};

use anyhow::Context;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use url::Url;

use crate::{crypto, QuicSession, WebSession};

/// TLS configuration for the server.
///
/// Either load a certificate and key from disk, or generate a self-signed
/// certificate for the given hostnames (development only).
#[derive(clap::Args, Clone, Default, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerTls {
	/// Load the given certificate from disk, encoded as PEM.
	#[arg(id = "tls-cert", long = "tls-cert", env = "MOQT_SERVER_TLS_CERT")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cert: Option<PathBuf>,

	/// Load the given key from disk, encoded as PEM.
	#[arg(id = "tls-key", long = "tls-key", env = "MOQT_SERVER_TLS_KEY")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub key: Option<PathBuf>,

	/// Or generate a self-signed certificate for the given hostnames.
	/// Clients must disable verification to accept it.
	#[arg(
		id = "tls-generate",
		long = "tls-generate",
		value_delimiter = ',',
		env = "MOQT_SERVER_TLS_GENERATE"
	)]
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub generate: Vec<String>,
}

/// Configuration for the server.
#[derive(clap::Args, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
	/// Listen for UDP packets on the given address.
	/// Defaults to `[::]:443` if not provided.
	#[serde(alias = "listen")]
	#[arg(id = "server-bind", long = "server-bind", alias = "listen", env = "MOQT_SERVER_BIND")]
	pub bind: Option<net::SocketAddr>,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ServerTls,
}

impl ServerConfig {
	pub fn init(self) -> anyhow::Result<Server> {
		Server::new(self)
	}
}

/// Accepts QUIC connections carrying either WebTransport or the raw ALPN.
///
/// Create via [ServerConfig::init] or [Server::new].
pub struct Server {
	endpoint: quinn::Endpoint,
	accept: FuturesUnordered<BoxFuture<'static, anyhow::Result<Request>>>,
}

impl Server {
	pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
		let provider = crypto::provider();

		let (chain, key) = match (&config.tls.cert, &config.tls.key) {
			(Some(cert), Some(key)) => load_pem(cert, key)?,
			(None, None) if !config.tls.generate.is_empty() => {
				tracing::warn!(hostnames = ?config.tls.generate, "generating a self-signed certificate");
				let signed = crypto::generate(config.tls.generate.clone())?;
				(vec![signed.cert], signed.key.into())
			}
			_ => anyhow::bail!("provide both --tls-cert and --tls-key, or --tls-generate"),
		};

		let mut tls = rustls::ServerConfig::builder_with_provider(provider)
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_no_client_auth()
			.with_single_cert(chain, key)
			.context("invalid certificate or key")?;

		// WebTransport first, then the raw flavor.
		tls.alpn_protocols = vec![
			web_transport_quinn::ALPN.as_bytes().to_vec(),
			moqt::ALPN.as_bytes().to_vec(),
		];
		tls.key_log = Arc::new(rustls::KeyLogFile::new());

		let tls: quinn::crypto::rustls::QuicServerConfig = tls.try_into()?;
		let mut server = quinn::ServerConfig::with_crypto(Arc::new(tls));

		let mut transport = quinn::TransportConfig::default();
		transport.max_idle_timeout(Some(time::Duration::from_secs(10).try_into().unwrap()));
		transport.keep_alive_interval(Some(time::Duration::from_secs(4)));
		server.transport_config(Arc::new(transport));

		let bind = config.bind.unwrap_or("[::]:443".parse().unwrap());
		let endpoint = quinn::Endpoint::server(server, bind).context("failed to bind server endpoint")?;

		Ok(Self {
			endpoint,
			accept: FuturesUnordered::new(),
		})
	}

	pub fn local_addr(&self) -> anyhow::Result<net::SocketAddr> {
		Ok(self.endpoint.local_addr()?)
	}

	/// Returns the next partially established connection.
	///
	/// The TLS and (for WebTransport) HTTP/3 handshakes have completed; call
	/// [Request::accept] or [Request::reject] after inspecting the path.
	pub async fn accept(&mut self) -> Option<Request> {
		loop {
			tokio::select! {
				incoming = self.endpoint.accept() => {
					let incoming = incoming?;
					self.accept.push(Self::handshake(incoming).boxed());
				}
				Some(res) = self.accept.next() => match res {
					Ok(request) => return Some(request),
					Err(err) => tracing::debug!(%err, "failed to accept connection"),
				}
			}
		}
	}

	async fn handshake(incoming: quinn::Incoming) -> anyhow::Result<Request> {
		let connection = incoming.await.context("QUIC handshake failed")?;

		let alpn = connection
			.handshake_data()
			.and_then(|data| data.downcast::<quinn::crypto::rustls::HandshakeData>().ok())
			.and_then(|data| data.protocol)
			.and_then(|protocol| String::from_utf8(protocol).ok())
			.unwrap_or_default();

		tracing::debug!(remote = %connection.remote_address(), %alpn, "accepted connection");

		if alpn == moqt::ALPN {
			return Ok(Request::Quic(connection));
		}

		let request = web_transport_quinn::Request::accept(connection)
			.await
			.context("failed to receive WebTransport request")?;
		Ok(Request::WebTransport(request))
	}

	pub fn close(&mut self) {
		self.endpoint.close(quinn::VarInt::from_u32(0), b"server shutdown");
	}
}

fn load_pem(
	cert: &PathBuf,
	key: &PathBuf,
) -> anyhow::Result<(
	Vec<rustls::pki_types::CertificateDer<'static>>,
	rustls::pki_types::PrivateKeyDer<'static>,
)> {
	let chain = fs::File::open(cert).context("failed to open certificate file")?;
	let mut chain = io::BufReader::new(chain);

	let chain: Vec<_> = rustls_pemfile::certs(&mut chain)
		.collect::<Result<_, _>>()
		.context("failed to read certificates")?;
	anyhow::ensure!(!chain.is_empty(), "certificate file is empty");

	let key = fs::read(key).context("failed to open key file")?;
	let key = rustls_pemfile::private_key(&mut io::Cursor::new(&key))
		.context("failed to read key")?
		.context("no key found")?;

	Ok((chain, key))
}

/// An incoming connection that can be accepted or rejected.
///
/// WebTransport requests carry the URL the client dialed; raw QUIC carries
/// the path in the setup parameters instead, readable after [Request::accept].
pub enum Request {
	WebTransport(web_transport_quinn::Request),
	Quic(quinn::Connection),
}

impl Request {
	/// The URL provided by the client, if WebTransport.
	pub fn url(&self) -> Option<&Url> {
		match self {
			Self::WebTransport(request) => Some(request.url()),
			Self::Quic(_) => None,
		}
	}

	/// Complete the handshakes and run the setup exchange.
	pub async fn accept(self, mux: impl Into<Option<moqt::TrackMux>>) -> anyhow::Result<moqt::Session> {
		match self {
			Self::WebTransport(request) => {
				let session = request.ok().await.context("WebTransport handshake failed")?;
				Ok(moqt::Session::accept(WebSession::new(session), mux).await?)
			}
			Self::Quic(connection) => Ok(moqt::Session::accept(QuicSession::new(connection), mux).await?),
		}
	}

	/// Reject the session, returning your favorite HTTP status code.
	pub async fn reject(self, code: u16) -> anyhow::Result<()> {
		match self {
			Self::WebTransport(request) => {
				let status = web_transport_quinn::http::StatusCode::from_u16(code).context("invalid status code")?;
				request.close(status).await?;
			}
			Self::Quic(connection) => {
				connection.close(
					quinn::VarInt::from_u32(moqt::Error::Unauthorized.to_session_code()),
					b"rejected",
				);
			}
		}
		Ok(())
	}
}
