// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Log output for test runs.
//!
//! The filter is read from `WEAVE_LOG`, then `RUST_LOG`, and falls back to the
//! level given by the caller. Only the first successful call installs a
//! subscriber; later calls are no-ops.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "WEAVE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

fn filter(default_level: &str) -> EnvFilter {
	EnvFilter::try_from_env(LOG_ENV)
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a test-writer subscriber at `warn` unless overridden.
pub fn init_test_logging() {
	init_logging("warn", LogFormat::Pretty);
}

pub fn init_logging(default_level: &str, format: LogFormat) {
	INIT_LOGGING.call_once(|| {
		let builder = tracing_subscriber::fmt()
			.with_env_filter(filter(default_level))
			.with_test_writer()
			.with_target(true)
			.with_thread_names(true)
			.with_ansi(false);
		let _ = match format {
			LogFormat::Pretty => builder.try_init(),
			LogFormat::Json => builder.json().try_init(),
		};
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_init_is_idempotent() {
		init_test_logging();
		init_logging("trace", LogFormat::Json);
		tracing::debug!("logging initialised");
	}
}
