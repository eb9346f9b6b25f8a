use std::path::PathBuf;
use std::sync::Arc;
use std::{fs, io, net, time};

use anyhow::Context;
use rustls::RootCertStore;
use url::Url;

use crate::{crypto, QuicSession, WebSession};

/// TLS configuration for the client.
#[derive(Clone, Default, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientTls {
	/// Use the TLS root at this path, encoded as PEM.
	///
	/// This value can be provided multiple times for multiple roots.
	/// If this is empty, system roots will be used instead.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	#[arg(id = "tls-root", long = "tls-root", env = "MOQT_CLIENT_TLS_ROOT")]
	pub root: Vec<PathBuf>,

	/// Danger: Disable TLS certificate verification.
	///
	/// Fine for local development against a self-signed server.
	#[serde(skip_serializing_if = "Option::is_none")]
	#[arg(
		id = "tls-disable-verify",
		long = "tls-disable-verify",
		env = "MOQT_CLIENT_TLS_DISABLE_VERIFY",
		default_missing_value = "true",
		num_args = 0..=1,
		value_parser = clap::value_parser!(bool),
	)]
	pub disable_verify: Option<bool>,
}

/// Configuration for the client.
#[derive(Clone, Debug, clap::Parser, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
	/// Listen for UDP packets on the given address.
	#[arg(
		id = "client-bind",
		long = "client-bind",
		default_value = "[::]:0",
		env = "MOQT_CLIENT_BIND"
	)]
	pub bind: net::SocketAddr,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ClientTls,
}

impl ClientConfig {
	pub fn init(self) -> anyhow::Result<Client> {
		Client::new(self)
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			bind: "[::]:0".parse().unwrap(),
			tls: ClientTls::default(),
		}
	}
}

/// Establishes sessions over WebTransport (`https`) or raw QUIC (`moqt`).
///
/// Create via [ClientConfig::init] or [Client::new].
#[derive(Clone)]
pub struct Client {
	quic: quinn::Endpoint,
	tls: rustls::ClientConfig,
	transport: Arc<quinn::TransportConfig>,
}

impl Client {
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let provider = crypto::provider();

		// Create a list of acceptable root certificates.
		let mut roots = RootCertStore::empty();

		if config.tls.root.is_empty() {
			let native = rustls_native_certs::load_native_certs();

			for err in native.errors {
				tracing::warn!(%err, "failed to load root cert");
			}

			for cert in native.certs {
				roots.add(cert).context("failed to add root cert")?;
			}
		} else {
			for root in &config.tls.root {
				let root = fs::File::open(root).context("failed to open root cert file")?;
				let mut root = io::BufReader::new(root);

				let root = rustls_pemfile::certs(&mut root)
					.next()
					.context("no roots found")?
					.context("failed to read root cert")?;

				roots.add(root).context("failed to add root cert")?;
			}
		}

		let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_root_certificates(roots)
			.with_no_client_auth();

		if config.tls.disable_verify.unwrap_or_default() {
			tracing::warn!("TLS server certificate verification is disabled; a man-in-the-middle attack is possible.");

			let noop = crypto::NoCertificateVerification(provider.clone());
			tls.dangerous().set_certificate_verifier(Arc::new(noop));
		}

		let socket = std::net::UdpSocket::bind(config.bind).context("failed to bind UDP socket")?;

		let mut transport = quinn::TransportConfig::default();
		transport.max_idle_timeout(Some(time::Duration::from_secs(10).try_into().unwrap()));
		transport.keep_alive_interval(Some(time::Duration::from_secs(4)));
		let transport = Arc::new(transport);

		let runtime = quinn::default_runtime().context("no async runtime")?;
		let quic = quinn::Endpoint::new(quinn::EndpointConfig::default(), None, socket, runtime)
			.context("failed to create QUIC endpoint")?;

		Ok(Self { quic, tls, transport })
	}

	/// Establish a connection and perform the setup handshake.
	///
	/// `https` URLs use WebTransport; `moqt` URLs use raw QUIC with the path
	/// carried as a setup parameter.
	pub async fn connect(&self, url: Url, mux: impl Into<Option<moqt::TrackMux>>) -> anyhow::Result<moqt::Session> {
		let alpn = match url.scheme() {
			"https" => web_transport_quinn::ALPN,
			"moqt" => moqt::ALPN,
			scheme => anyhow::bail!("url scheme must be 'https' or 'moqt', got {scheme:?}"),
		};

		let connection = self.connect_quic(&url, alpn).await?;

		match url.scheme() {
			"https" => {
				let session = web_transport_quinn::Session::connect(connection, url)
					.await
					.context("WebTransport handshake failed")?;

				Ok(moqt::Session::connect(WebSession::new(session), mux).await?)
			}
			_ => {
				// Raw QUIC has no URL, so the path rides in the setup parameters.
				let mut parameters = moqt::message::Parameters::default();
				parameters.set_str(moqt::message::SetupParameter::Path, url.path());

				Ok(moqt::Session::connect_with(QuicSession::new(connection), mux, parameters).await?)
			}
		}
	}

	async fn connect_quic(&self, url: &Url, alpn: &str) -> anyhow::Result<quinn::Connection> {
		let mut config = self.tls.clone();

		let host = url.host().context("invalid DNS name")?.to_string();
		let port = url.port().unwrap_or(443);

		// Look up the DNS entry.
		let ip = tokio::net::lookup_host((host.clone(), port))
			.await
			.context("failed DNS lookup")?
			.next()
			.context("no DNS entries")?;

		config.alpn_protocols = vec![alpn.as_bytes().to_vec()];
		config.key_log = Arc::new(rustls::KeyLogFile::new());

		let config: quinn::crypto::rustls::QuicClientConfig = config.try_into()?;
		let mut config = quinn::ClientConfig::new(Arc::new(config));
		config.transport_config(self.transport.clone());

		tracing::debug!(%url, %ip, %alpn, "connecting");

		let connection = self.quic.connect_with(config, ip, &host)?.await?;
		Ok(connection)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[test]
	fn cli_disable_verify_flag() {
		let config = ClientConfig::parse_from(["test", "--tls-disable-verify"]);
		assert_eq!(config.tls.disable_verify, Some(true));
	}

	#[test]
	fn cli_no_disable_verify() {
		let config = ClientConfig::parse_from(["test"]);
		assert_eq!(config.tls.disable_verify, None);
	}

	#[test]
	fn toml_round_trip() {
		let toml = r#"
			bind = "[::]:0"
			tls.disable_verify = true
		"#;

		let config: ClientConfig = toml::from_str(toml).unwrap();
		assert_eq!(config.tls.disable_verify, Some(true));
		assert!(config.tls.root.is_empty());
	}
}
