use tracing_subscriber::EnvFilter;

/// Logging configuration shared by the binaries.
#[derive(clap::Args, Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The default log level, overridden by `RUST_LOG`.
	#[arg(long = "log-level", id = "log-level", env = "MOQT_LOG_LEVEL", default_value = "info")]
	pub level: String,
}

impl Default for Log {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
		}
	}
}

impl Log {
	pub fn init(&self) {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.init();
	}
}
