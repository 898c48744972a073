use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Maps `-v` count to a default filter; `RUST_LOG` overrides it.
pub fn filter_for(verbosity: u8) -> &'static str {
	// 0 = errors only, session internals silent
	// 1 (-v) = info for embedctl, session state changes from the library
	// 2+ (-vv) = everything, including gateway round-trips
	match verbosity {
		0 => "error,embed=off",
		1 => "info,embed=info,reqwest=warn,hyper=warn",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_filter_silences_library() {
		assert_eq!(filter_for(0), "error,embed=off");
		assert!(filter_for(1).contains("embed=info"));
		assert_eq!(filter_for(5), "debug");
	}

	#[test]
	fn filters_parse() {
		for verbosity in 0..3 {
			assert!(EnvFilter::try_new(filter_for(verbosity)).is_ok());
		}
	}
}
