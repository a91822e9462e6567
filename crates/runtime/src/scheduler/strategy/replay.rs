// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use weave_type::{Error, OperationId, Result};

use crate::trace::{ScheduleStep, ScheduleTrace};

use super::Strategy;

/// Follows a recorded schedule. Any divergence between the recording and
/// the program being replayed is an [`Error::Trace`].
pub struct ReplayStrategy {
	trace: ScheduleTrace,
	position: usize,
	replayed: bool,
}

impl ReplayStrategy {
	pub fn new(trace: ScheduleTrace) -> Self {
		Self {
			trace,
			position: 0,
			replayed: false,
		}
	}

	fn next_step(&mut self, expected: &str) -> Result<ScheduleStep> {
		let step = self.trace.get(self.position).ok_or_else(|| {
			Error::Trace(format!("schedule exhausted after {} steps while expecting {}", self.position, expected))
		})?;
		self.position += 1;
		Ok(step)
	}

	fn divergence(&self, expected: &str, found: ScheduleStep) -> Error {
		Error::Trace(format!("step {} diverges: expected {}, recorded {:?}", self.position - 1, expected, found))
	}
}

impl Strategy for ReplayStrategy {
	fn prepare_next_iteration(&mut self) -> bool {
		self.position = 0;
		!std::mem::replace(&mut self.replayed, true)
	}

	fn next_operation(&mut self, enabled: &[OperationId], _current: OperationId) -> Result<OperationId> {
		match self.next_step("an operation")? {
			ScheduleStep::Operation(id) if enabled.contains(&id) => Ok(id),
			ScheduleStep::Operation(id) => Err(Error::Trace(format!(
				"step {}: recorded {} is not enabled (enabled: {:?})",
				self.position - 1,
				id,
				enabled
			))),
			found => Err(self.divergence("an operation", found)),
		}
	}

	fn next_boolean(&mut self, _current: OperationId, _max_value: u64) -> Result<bool> {
		match self.next_step("a boolean")? {
			ScheduleStep::Boolean(value) => Ok(value),
			found => Err(self.divergence("a boolean", found)),
		}
	}

	fn next_integer(&mut self, _current: OperationId, max_value: u64) -> Result<u64> {
		match self.next_step("an integer")? {
			ScheduleStep::Integer(value) if value < max_value => Ok(value),
			found => Err(self.divergence("an integer", found)),
		}
	}

	fn is_fair(&self) -> bool {
		false
	}

	fn description(&self) -> String {
		format!("replay[{} steps]", self.trace.len())
	}
}
