// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use weave_type::{ActorId, Error};

use crate::event::Message;

/// Called with every message that could not be delivered because its target halted.
pub type DropHandler = Arc<dyn Fn(&ActorId, &Message) + Send + Sync>;

/// Called with the first failure of a run.
pub type FailureHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Configuration shared by both runtimes.
///
/// The serialisable part can be loaded from JSON; handlers are installed in code.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Reject a second state-changing statement in one action.
	///
	/// Default: true
	pub strict_transitions: bool,
	/// Scheduling decisions after which a systematic execution ends without
	/// a verdict. 0 = unbounded.
	///
	/// Default: 10_000
	pub max_steps: usize,
	/// Attach a `TraceEntry` log to bug reports.
	///
	/// Default: true
	pub record_log: bool,
	/// Deliver monitor events in production. Systematic executions always
	/// run their monitors.
	///
	/// Default: true
	pub monitors: bool,
	#[serde(skip)]
	pub drop_handler: Option<DropHandler>,
	#[serde(skip)]
	pub failure_handler: Option<FailureHandler>,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			strict_transitions: true,
			max_steps: 10_000,
			record_log: true,
			monitors: true,
			drop_handler: None,
			failure_handler: None,
		}
	}
}

impl RuntimeConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults for the production runtime: last statement wins.
	pub fn production() -> Self {
		Self {
			strict_transitions: false,
			..Self::default()
		}
	}

	pub fn strict_transitions(mut self, strict: bool) -> Self {
		self.strict_transitions = strict;
		self
	}

	pub fn max_steps(mut self, steps: usize) -> Self {
		self.max_steps = steps;
		self
	}

	pub fn record_log(mut self, record: bool) -> Self {
		self.record_log = record;
		self
	}

	pub fn monitors(mut self, enabled: bool) -> Self {
		self.monitors = enabled;
		self
	}

	pub fn on_drop<F>(mut self, handler: F) -> Self
	where
		F: Fn(&ActorId, &Message) + Send + Sync + 'static,
	{
		self.drop_handler = Some(Arc::new(handler));
		self
	}

	pub fn on_failure<F>(mut self, handler: F) -> Self
	where
		F: Fn(&Error) + Send + Sync + 'static,
	{
		self.failure_handler = Some(Arc::new(handler));
		self
	}

	/// Only a JSON object is accepted; missing fields take their defaults.
	pub fn from_json(json: &str) -> weave_type::Result<Self> {
		let value: serde_json::Value = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
		if !value.is_object() {
			return Err(Error::Config(format!("runtime configuration must be a JSON object, got {}", json.trim())));
		}
		serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))
	}
}

impl fmt::Debug for RuntimeConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeConfig")
			.field("strict_transitions", &self.strict_transitions)
			.field("max_steps", &self.max_steps)
			.field("record_log", &self.record_log)
			.field("monitors", &self.monitors)
			.field("drop_handler", &self.drop_handler.is_some())
			.field("failure_handler", &self.failure_handler.is_some())
			.finish()
	}
}
