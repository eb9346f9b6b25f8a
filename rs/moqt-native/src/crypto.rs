use std::sync::Arc;

use anyhow::Context;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName, UnixTime};

pub type Provider = Arc<rustls::crypto::CryptoProvider>;

/// The crypto provider shared by every TLS config in this crate.
pub fn provider() -> Provider {
	Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// A self-signed certificate and key for development.
///
/// Clients won't trust it unless they disable verification.
pub struct SelfSigned {
	pub cert: CertificateDer<'static>,
	pub key: PrivatePkcs8KeyDer<'static>,
}

/// Generate a short-lived self-signed certificate for the given hostnames.
pub fn generate(hostnames: Vec<String>) -> anyhow::Result<SelfSigned> {
	let key = rcgen::KeyPair::generate().context("failed to generate key")?;

	let mut params = rcgen::CertificateParams::new(hostnames).context("invalid hostnames")?;
	params.not_before = time::OffsetDateTime::now_utc() - time::Duration::hours(1);
	params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(14);

	let cert = params.self_signed(&key).context("failed to sign certificate")?;

	Ok(SelfSigned {
		cert: cert.der().clone(),
		key: PrivatePkcs8KeyDer::from(key.serialize_der()),
	})
}

/// Accepts any server certificate; for development only.
#[derive(Debug)]
pub(crate) struct NoCertificateVerification(pub Provider);

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp: &[u8],
		_now: UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		Ok(rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.0.signature_verification_algorithms.supported_schemes()
	}
}
