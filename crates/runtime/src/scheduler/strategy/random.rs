// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use rand::{Rng, SeedableRng, rngs::StdRng};
use weave_type::{OperationId, Result};

use super::{Strategy, bound_error};

/// Uniform random choices from a seeded generator.
///
/// The generator is reseeded from `seed + iteration` before every execution,
/// so iteration `n` can be reproduced on its own.
pub struct RandomStrategy {
	seed: u64,
	iteration: u64,
	rng: StdRng,
}

impl RandomStrategy {
	pub fn new(seed: u64) -> Self {
		Self {
			seed,
			iteration: 0,
			rng: StdRng::seed_from_u64(seed),
		}
	}

	pub fn seed(&self) -> u64 {
		self.seed
	}

	/// Seed of the execution currently prepared.
	pub fn iteration_seed(&self) -> u64 {
		self.seed.wrapping_add(self.iteration.saturating_sub(1))
	}
}

impl Strategy for RandomStrategy {
	fn prepare_next_iteration(&mut self) -> bool {
		self.rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.iteration));
		self.iteration += 1;
		true
	}

	fn next_operation(&mut self, enabled: &[OperationId], _current: OperationId) -> Result<OperationId> {
		Ok(enabled[self.rng.random_range(0..enabled.len())])
	}

	fn next_boolean(&mut self, _current: OperationId, max_value: u64) -> Result<bool> {
		if max_value == 0 {
			return Err(bound_error(max_value));
		}
		Ok(self.rng.random_range(0..max_value) == 0)
	}

	fn next_integer(&mut self, _current: OperationId, max_value: u64) -> Result<u64> {
		if max_value == 0 {
			return Err(bound_error(max_value));
		}
		Ok(self.rng.random_range(0..max_value))
	}

	fn is_fair(&self) -> bool {
		true
	}

	fn description(&self) -> String {
		format!("random[seed={}]", self.seed)
	}
}
