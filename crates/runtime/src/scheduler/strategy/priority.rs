// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::trace;
use weave_type::{OperationId, Result};

use super::{Strategy, bound_error};

/// Probabilistic concurrency testing.
///
/// Every operation gets a random priority when first seen and the highest
/// priority enabled operation always runs. At `switches` randomly chosen
/// steps the running operation is demoted to the lowest priority. The step
/// positions are drawn over the length of the previous execution.
pub struct PriorityStrategy {
	seed: u64,
	iteration: u64,
	switches: usize,
	rng: StdRng,
	/// Highest priority first.
	priorities: Vec<OperationId>,
	change_points: BTreeSet<usize>,
	step: usize,
	longest: usize,
}

impl PriorityStrategy {
	pub fn new(seed: u64, switches: usize) -> Self {
		Self {
			seed,
			iteration: 0,
			switches,
			rng: StdRng::seed_from_u64(seed),
			priorities: Vec::new(),
			change_points: BTreeSet::new(),
			step: 0,
			longest: 0,
		}
	}

	fn prioritize(&mut self, enabled: &[OperationId]) {
		for id in enabled {
			if !self.priorities.contains(id) {
				let position = self.rng.random_range(0..=self.priorities.len());
				self.priorities.insert(position, *id);
			}
		}
	}

	fn highest(&self, enabled: &[OperationId]) -> Option<OperationId> {
		self.priorities.iter().copied().find(|id| enabled.contains(id))
	}
}

impl Strategy for PriorityStrategy {
	fn prepare_next_iteration(&mut self) -> bool {
		self.longest = self.longest.max(self.step);
		self.rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.iteration));
		self.iteration += 1;
		self.priorities.clear();
		self.step = 0;

		let horizon = self.longest.max(self.switches + 1).max(16);
		self.change_points.clear();
		while self.change_points.len() < self.switches.min(horizon) {
			self.change_points.insert(self.rng.random_range(1..=horizon));
		}
		trace!(iteration = self.iteration, change_points = ?self.change_points, "priority strategy prepared");
		true
	}

	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId> {
		self.prioritize(enabled);
		self.step += 1;

		if self.change_points.contains(&self.step) {
			if let Some(demoted) = self.highest(enabled) {
				self.priorities.retain(|id| *id != demoted);
				self.priorities.push(demoted);
				trace!(step = self.step, operation = %demoted, "priority change point");
			}
		}

		Ok(self.highest(enabled).unwrap_or(current))
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
		false
	}

	fn description(&self) -> String {
		format!("priority[seed={}, switches={}]", self.seed, self.switches)
	}
}
