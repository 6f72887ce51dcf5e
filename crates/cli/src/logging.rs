use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbosity`.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(false)
		.with_level(true)
		.compact()
		.init();
}

/// Directives keyed on the explicit `kf.*` event targets.
///
/// 0 = warnings only, socket library chatter off
/// 1 (-v) = session lifecycle at info, channel and transport stay at warn
/// 2+ (-vv) = debug for everything
fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn,tokio_tungstenite=off,tungstenite=off",
		1 => "info,kf.transport=warn,kf.channel=warn,kf.coalescer=warn",
		_ => "debug",
	}
}
