use tracing_subscriber::EnvFilter;

fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn,mph=info",
		1 => "info",
		_ => "debug",
	}
}

/// Installs the stderr subscriber. `RUST_LOG` overrides the `-v` level.
pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_levels() {
		assert_eq!(default_directive(0), "warn,mph=info");
		assert_eq!(default_directive(1), "info");
		assert_eq!(default_directive(5), "debug");
	}
}
