// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Verdicts produced by one systematic execution.

use std::fmt;

use serde::{Deserialize, Serialize};
use weave_type::Error;

use crate::trace::{ScheduleTrace, TraceEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugKind {
	/// An explicit assertion failed.
	Assertion,
	/// The actor API was misused.
	Usage,
	/// An event reached a state that neither handles, defers nor ignores it.
	UnhandledEvent,
	/// Actor or harness code panicked.
	Panic,
	/// No operation is enabled but some are blocked.
	Deadlock,
	/// A monitor stayed hot.
	Liveness,
}

impl BugKind {
	/// Safety bugs abort at the point they happen; the other kinds are judged
	/// over the whole execution.
	pub fn is_safety(&self) -> bool {
		matches!(self, BugKind::Assertion | BugKind::Usage | BugKind::UnhandledEvent | BugKind::Panic)
	}

	/// Classify an error raised inside an operation. `None` for cancellation.
	pub fn classify(error: &Error) -> Option<BugKind> {
		match error {
			Error::Canceled => None,
			Error::Assertion(_) => Some(BugKind::Assertion),
			Error::Usage(_) | Error::Trace(_) | Error::Config(_) | Error::Internal(_) => Some(BugKind::Usage),
			Error::UnhandledEvent {
				..
			} => Some(BugKind::UnhandledEvent),
			Error::Panicked {
				..
			} => Some(BugKind::Panic),
			Error::Deadlock(_) => Some(BugKind::Deadlock),
			Error::Liveness(_) => Some(BugKind::Liveness),
		}
	}
}

impl fmt::Display for BugKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			BugKind::Assertion => "assertion failure",
			BugKind::Usage => "usage error",
			BugKind::UnhandledEvent => "unhandled event",
			BugKind::Panic => "panic",
			BugKind::Deadlock => "deadlock",
			BugKind::Liveness => "liveness violation",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
	pub kind: BugKind,
	pub message: String,
	/// Decisions up to the bug; feeding it to a replay strategy reproduces it.
	pub schedule: ScheduleTrace,
	pub log: Vec<TraceEntry>,
}

impl fmt::Display for BugReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {} (after {} scheduling decisions)", self.kind, self.message, self.schedule.len())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	NoBugFound,
	BugFound(BugReport),
}

impl Verdict {
	pub fn is_bug(&self) -> bool {
		matches!(self, Verdict::BugFound(_))
	}

	pub fn bug(&self) -> Option<&BugReport> {
		match self {
			Verdict::BugFound(report) => Some(report),
			Verdict::NoBugFound => None,
		}
	}
}

/// Outcome of one execution under the systematic runtime.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
	pub verdict: Verdict,
	pub schedule: ScheduleTrace,
	pub log: Vec<TraceEntry>,
	pub steps: usize,
	/// The step bound ended the execution before it terminated.
	pub step_bound_reached: bool,
	/// Distinct execution-state hashes seen at scheduling points.
	pub distinct_states: usize,
}
