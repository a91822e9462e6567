// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Liveness checks layered over another strategy.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use weave_type::{Hash64, OperationId, Result};

use super::{Step, Strategy};
use crate::monitor::HotMonitor;

fn describe(hot: &[HotMonitor]) -> String {
	hot.iter().map(|monitor| monitor.to_string()).collect::<Vec<_>>().join(", ")
}

struct Visit {
	enabled: BTreeSet<OperationId>,
	chosen: OperationId,
}

/// Reports a liveness violation when, while some monitor is hot, the
/// execution returns to an already visited state through a fair segment:
/// every operation enabled throughout the segment was scheduled in it.
///
/// Reaching a state where every monitor is cold clears the history.
pub struct CycleDetectionStrategy<S> {
	inner: S,
	visits: Vec<Visit>,
	first_seen: HashMap<Hash64, usize>,
}

impl<S: Strategy> CycleDetectionStrategy<S> {
	pub fn new(inner: S) -> Self {
		Self {
			inner,
			visits: Vec::new(),
			first_seen: HashMap::new(),
		}
	}

	pub fn into_inner(self) -> S {
		self.inner
	}

	fn clear(&mut self) {
		self.visits.clear();
		self.first_seen.clear();
	}

	fn is_fair_segment(segment: &[Visit]) -> bool {
		let Some((first, rest)) = segment.split_first() else {
			return false;
		};
		let mut always_enabled = first.enabled.clone();
		for visit in rest {
			always_enabled.retain(|id| visit.enabled.contains(id));
		}
		let scheduled: BTreeSet<OperationId> = segment.iter().map(|visit| visit.chosen).collect();
		always_enabled.is_subset(&scheduled)
	}
}

impl<S: Strategy> Strategy for CycleDetectionStrategy<S> {
	fn prepare_next_iteration(&mut self) -> bool {
		self.clear();
		self.inner.prepare_next_iteration()
	}

	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId> {
		self.inner.next_operation(enabled, current)
	}

	fn next_boolean(&mut self, current: OperationId, max_value: u64) -> Result<bool> {
		self.inner.next_boolean(current, max_value)
	}

	fn next_integer(&mut self, current: OperationId, max_value: u64) -> Result<u64> {
		self.inner.next_integer(current, max_value)
	}

	fn observe(&mut self, step: &Step<'_>) -> Option<String> {
		if let Some(violation) = self.inner.observe(step) {
			return Some(violation);
		}
		if step.hot.is_empty() {
			self.clear();
			return None;
		}

		if let Some(&start) = self.first_seen.get(&step.state) {
			let segment = &self.visits[start..];
			if Self::is_fair_segment(segment) {
				debug!(state = step.state.0, length = segment.len(), "fair cycle through hot state");
				return Some(format!(
					"fair cycle of {} steps revisits a state where {}",
					segment.len(),
					describe(step.hot)
				));
			}
		} else {
			self.first_seen.insert(step.state, self.visits.len());
		}

		self.visits.push(Visit {
			enabled: step.enabled.iter().copied().collect(),
			chosen: step.chosen,
		});
		None
	}

	fn is_fair(&self) -> bool {
		self.inner.is_fair()
	}

	fn description(&self) -> String {
		format!("cycle-detection({})", self.inner.description())
	}
}

/// Reports a liveness violation when monitors stay hot for more than
/// `threshold` consecutive scheduling decisions.
pub struct TemperatureCheckingStrategy<S> {
	inner: S,
	threshold: usize,
	hot_steps: usize,
}

impl<S: Strategy> TemperatureCheckingStrategy<S> {
	pub fn new(inner: S, threshold: usize) -> Self {
		Self {
			inner,
			threshold,
			hot_steps: 0,
		}
	}

	pub fn into_inner(self) -> S {
		self.inner
	}
}

impl<S: Strategy> Strategy for TemperatureCheckingStrategy<S> {
	fn prepare_next_iteration(&mut self) -> bool {
		self.hot_steps = 0;
		self.inner.prepare_next_iteration()
	}

	fn next_operation(&mut self, enabled: &[OperationId], current: OperationId) -> Result<OperationId> {
		self.inner.next_operation(enabled, current)
	}

	fn next_boolean(&mut self, current: OperationId, max_value: u64) -> Result<bool> {
		self.inner.next_boolean(current, max_value)
	}

	fn next_integer(&mut self, current: OperationId, max_value: u64) -> Result<u64> {
		self.inner.next_integer(current, max_value)
	}

	fn observe(&mut self, step: &Step<'_>) -> Option<String> {
		if let Some(violation) = self.inner.observe(step) {
			return Some(violation);
		}
		if step.hot.is_empty() {
			self.hot_steps = 0;
			return None;
		}
		self.hot_steps += 1;
		if self.hot_steps > self.threshold {
			return Some(format!("{} for more than {} steps", describe(step.hot), self.threshold));
		}
		None
	}

	fn is_fair(&self) -> bool {
		self.inner.is_fair()
	}

	fn description(&self) -> String {
		format!("temperature({}, threshold={})", self.inner.description(), self.threshold)
	}
}
