// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
	/// An explicit assertion in actor, monitor or harness code failed.
	#[error("assertion failure: {0}")]
	Assertion(String),

	/// The actor API was used in a way the runtime forbids.
	#[error("usage error: {0}")]
	Usage(String),

	#[error("{machine} received event '{event}' that cannot be handled in state '{state}'")]
	UnhandledEvent {
		machine: String,
		state: String,
		event: String,
	},

	#[error("{operation} panicked: {message}")]
	Panicked {
		operation: String,
		message: String,
	},

	#[error("deadlock detected: {0}")]
	Deadlock(String),

	#[error("liveness violation: {0}")]
	Liveness(String),

	/// The current execution was stopped. Raised inside operations that are
	/// still parked when a bug is found or the execution ends.
	#[error("execution canceled")]
	Canceled,

	#[error("invalid schedule trace: {0}")]
	Trace(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl Error {
	/// Returns true for the infrastructure-internal cancellation error.
	pub fn is_canceled(&self) -> bool {
		matches!(self, Error::Canceled)
	}
}

/// Build an [`Error::Usage`] from a format string.
#[macro_export]
macro_rules! usage_error {
	($($arg:tt)*) => {
		$crate::Error::Usage(format!($($arg)*))
	};
}

/// Build an [`Error::Assertion`] from a format string.
#[macro_export]
macro_rules! assertion {
	($($arg:tt)*) => {
		$crate::Error::Assertion(format!($($arg)*))
	};
}

/// Return early with an [`Error::Internal`].
#[macro_export]
macro_rules! return_internal_error {
	($($arg:tt)*) => {
		return Err($crate::Error::Internal(format!($($arg)*)))
	};
}
