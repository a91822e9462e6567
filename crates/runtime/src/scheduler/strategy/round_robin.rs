// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use weave_type::{OperationId, Result};

use super::{Strategy, bound_error};

/// Deterministic strategy: after `current`, the next enabled operation by id,
/// wrapping around. Choices always take the first value.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
	executed: bool,
}

impl RoundRobinStrategy {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Strategy for RoundRobinStrategy {
	/// A single execution: every execution would be the same.
	fn prepare_next_iteration(&mut self) -> bool {
		!std::mem::replace(&mut self.executed, true)
	}

	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId> {
		Ok(enabled.iter().copied().find(|id| *id > current).unwrap_or(enabled[0]))
	}

	fn next_boolean(&mut self, _current: OperationId, max_value: u64) -> Result<bool> {
		if max_value == 0 {
			return Err(bound_error(max_value));
		}
		Ok(false)
	}

	fn next_integer(&mut self, _current: OperationId, max_value: u64) -> Result<u64> {
		if max_value == 0 {
			return Err(bound_error(max_value));
		}
		Ok(0)
	}

	fn is_fair(&self) -> bool {
		true
	}

	fn description(&self) -> String {
		"round-robin".to_string()
	}
}
