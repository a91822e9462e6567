// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Schedule traces and execution logs.
//!
//! A [`ScheduleTrace`] holds every decision of one execution (which operation ran
//! and the value of every nondeterministic choice). It is all that is needed to
//! replay the execution. The [`TraceEntry`] log is the human-readable side:
//! messages, state transitions and choices in the order they happened.

use serde::{Deserialize, Serialize};
use weave_type::{ActorId, Error, OperationId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStep {
	Operation(OperationId),
	Boolean(bool),
	Integer(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
	steps: Vec<ScheduleStep>,
}

impl ScheduleTrace {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, step: ScheduleStep) {
		self.steps.push(step);
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	pub fn get(&self, index: usize) -> Option<ScheduleStep> {
		self.steps.get(index).copied()
	}

	pub fn steps(&self) -> &[ScheduleStep] {
		&self.steps
	}

	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(self).map_err(|e| Error::Trace(e.to_string()))
	}

	pub fn from_json(json: &str) -> Result<Self> {
		serde_json::from_str(json).map_err(|e| Error::Trace(e.to_string()))
	}
}

impl FromIterator<ScheduleStep> for ScheduleTrace {
	fn from_iter<I: IntoIterator<Item = ScheduleStep>>(iter: I) -> Self {
		Self {
			steps: iter.into_iter().collect(),
		}
	}
}

/// One record of the execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
	Created {
		actor: ActorId,
		creator: Option<ActorId>,
	},
	Sent {
		sender: Option<ActorId>,
		sender_state: Option<String>,
		target: ActorId,
		event: String,
		sequence: u64,
	},
	Dequeued {
		actor: ActorId,
		state: String,
		event: String,
		sequence: Option<u64>,
	},
	Ignored {
		actor: ActorId,
		state: String,
		event: String,
		sequence: Option<u64>,
	},
	Dropped {
		target: ActorId,
		event: String,
		sequence: Option<u64>,
	},
	Raised {
		machine: String,
		state: String,
		event: String,
	},
	Goto {
		machine: String,
		from: String,
		to: String,
	},
	Push {
		machine: String,
		from: String,
		to: String,
	},
	Pop {
		machine: String,
		from: String,
		to: String,
	},
	Halted {
		actor: ActorId,
	},
	MonitorProcessed {
		monitor: String,
		state: String,
		event: String,
	},
	MonitorTemperature {
		monitor: String,
		state: String,
		hot: bool,
	},
	RandomBoolean {
		operation: OperationId,
		value: bool,
	},
	RandomInteger {
		operation: OperationId,
		value: u64,
	},
}

impl TraceEntry {
	/// The dequeue entry of `actor`, if this is one.
	pub fn as_dequeue(&self, actor: &ActorId) -> Option<(&str, Option<u64>)> {
		match self {
			TraceEntry::Dequeued {
				actor: a,
				event,
				sequence,
				..
			} if a == actor => Some((event.as_str(), *sequence)),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trace_json_roundtrip() {
		let trace: ScheduleTrace = vec![
			ScheduleStep::Operation(OperationId(0)),
			ScheduleStep::Boolean(true),
			ScheduleStep::Integer(7),
			ScheduleStep::Operation(OperationId(2)),
		]
		.into_iter()
		.collect();

		let json = trace.to_json().unwrap();
		assert_eq!(ScheduleTrace::from_json(&json).unwrap(), trace);
	}

	#[test]
	fn test_invalid_trace_json() {
		let err = ScheduleTrace::from_json("{not json").unwrap_err();
		assert!(matches!(err, Error::Trace(_)));
	}

	#[test]
	fn test_as_dequeue() {
		let ping = ActorId::new(1, "Ping");
		let entry = TraceEntry::Dequeued {
			actor: ping.clone(),
			state: "WaitPong".to_string(),
			event: "Pong".to_string(),
			sequence: Some(0),
		};
		assert_eq!(entry.as_dequeue(&ping), Some(("Pong", Some(0))));
		assert_eq!(entry.as_dequeue(&ActorId::new(2, "Pong")), None);
	}
}
