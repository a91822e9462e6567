// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Exploration strategies.
//!
//! A strategy resolves every scheduling decision and nondeterministic choice
//! of an execution. The liveness wrappers ([`CycleDetectionStrategy`] and
//! [`TemperatureCheckingStrategy`]) delegate the decisions and additionally
//! observe each step.

mod liveness;
mod priority;
mod random;
mod replay;
mod round_robin;

pub use liveness::{CycleDetectionStrategy, TemperatureCheckingStrategy};
pub use priority::PriorityStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;
pub use round_robin::RoundRobinStrategy;
use weave_type::{Hash64, OperationId, Result};

use crate::monitor::HotMonitor;

/// One scheduling decision as seen by a liveness check.
#[derive(Debug)]
pub struct Step<'a> {
	/// Execution-state hash before the decision.
	pub state: Hash64,
	/// Monitors that are hot in this state.
	pub hot: &'a [HotMonitor],
	pub enabled: &'a [OperationId],
	pub chosen: OperationId,
}

pub trait Strategy: Send {
	/// Prepare for the next execution. Returns `false` once the strategy has
	/// nothing left to explore.
	fn prepare_next_iteration(&mut self) -> bool;

	/// Pick one of `enabled`, which is sorted and never empty.
	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId>;

	/// `true` with probability `1 / max_value` for randomised strategies.
	fn next_boolean(&mut self, current: OperationId, max_value: u64) -> Result<bool>;

	/// A value in `0..max_value`.
	fn next_integer(&mut self, current: OperationId, max_value: u64) -> Result<u64>;

	/// Observe a decision; returns a liveness violation message, if any.
	fn observe(&mut self, _step: &Step<'_>) -> Option<String> {
		None
	}

	/// Whether every enabled operation is eventually scheduled.
	fn is_fair(&self) -> bool;

	fn description(&self) -> String;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
	fn prepare_next_iteration(&mut self) -> bool {
		(**self).prepare_next_iteration()
	}

	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId> {
		(**self).next_operation(enabled, current)
	}

	fn next_boolean(&mut self, current: OperationId, max_value: u64) -> Result<bool> {
		(**self).next_boolean(current, max_value)
	}

	fn next_integer(&mut self, current: OperationId, max_value: u64) -> Result<u64> {
		(**self).next_integer(current, max_value)
	}

	fn observe(&mut self, step: &Step<'_>) -> Option<String> {
		(**self).observe(step)
	}

	fn is_fair(&self) -> bool {
		(**self).is_fair()
	}

	fn description(&self) -> String {
		(**self).description()
	}
}

fn bound_error(max_value: u64) -> weave_type::Error {
	weave_type::usage_error!("choice bound must be positive, got {}", max_value)
}
