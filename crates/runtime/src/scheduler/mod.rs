// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Serialising scheduler for systematic testing.
//!
//! Every actor, task and the harness run on their own thread, but only the
//! operation named `current` is ever unparked. At each scheduling point the
//! running operation asks the strategy for the next operation, records the
//! decision, hands over the turn and parks until it is chosen again.

pub(crate) mod operation;
pub mod strategy;

use std::collections::BTreeMap;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};
use weave_type::{Error, OperationId, Result};

pub use operation::{OperationStatus, SchedulingPoint};
use operation::{Operation, is_enabled};
use strategy::{Step, Strategy};

use crate::{
	cache::{ExecutionStateCache, Snapshot, with_operations},
	trace::{ScheduleStep, ScheduleTrace},
};

struct SchedulerState {
	operations: BTreeMap<OperationId, Operation>,
	current: OperationId,
	next_id: u64,
	strategy: Box<dyn Strategy>,
	schedule: ScheduleTrace,
	steps: usize,
	max_steps: usize,
	bug: Option<Error>,
	terminated: bool,
	step_bound_reached: bool,
	cache: ExecutionStateCache,
}

/// What the scheduler hands back once an execution is over.
pub(crate) struct Outcome {
	pub bug: Option<Error>,
	pub schedule: ScheduleTrace,
	pub steps: usize,
	pub step_bound_reached: bool,
	pub distinct_states: usize,
}

pub(crate) struct OperationScheduler {
	state: Mutex<SchedulerState>,
	turn: Condvar,
}

impl OperationScheduler {
	/// The harness operation is registered and holds the first turn.
	pub(crate) fn new(strategy: Box<dyn Strategy>, max_steps: usize) -> Self {
		let mut operations = BTreeMap::new();
		operations.insert(OperationId::HARNESS, Operation::new("harness"));
		Self {
			state: Mutex::new(SchedulerState {
				operations,
				current: OperationId::HARNESS,
				next_id: OperationId::HARNESS.0 + 1,
				strategy,
				schedule: ScheduleTrace::new(),
				steps: 0,
				max_steps,
				bug: None,
				terminated: false,
				step_bound_reached: false,
				cache: ExecutionStateCache::default(),
			}),
			turn: Condvar::new(),
		}
	}

	pub(crate) fn register(&self, name: impl Into<String>) -> Result<OperationId> {
		let mut state = self.state.lock();
		if state.terminated {
			return Err(Error::Canceled);
		}
		let id = OperationId(state.next_id);
		state.next_id += 1;
		let operation = Operation::new(name);
		trace!(operation = %id, name = %operation.name, "operation registered");
		state.operations.insert(id, operation);
		Ok(id)
	}

	/// Wake an idle or receive-blocked operation.
	pub(crate) fn enable(&self, id: OperationId) {
		let mut state = self.state.lock();
		if let Some(operation) = state.operations.get_mut(&id) {
			if operation.status != OperationStatus::Completed {
				operation.status = OperationStatus::Enabled;
			}
		}
	}

	pub(crate) fn set_status(&self, id: OperationId, status: OperationStatus) {
		let mut state = self.state.lock();
		if let Some(operation) = state.operations.get_mut(&id) {
			operation.status = status;
		}
	}

	pub(crate) fn status(&self, id: OperationId) -> Option<OperationStatus> {
		self.state.lock().operations.get(&id).map(|operation| operation.status.clone())
	}

	/// Hand the turn to the strategy's choice and park until `current` is
	/// chosen again. Returns [`Error::Canceled`] once the execution is over.
	pub(crate) fn schedule_next(&self, current: OperationId, point: SchedulingPoint, snapshot: Snapshot) -> Result<()> {
		let mut state = self.state.lock();
		if state.terminated {
			return Err(Error::Canceled);
		}
		if let Some(operation) = state.operations.get_mut(&current) {
			operation.last_point = point;
		}
		let decided = Self::decide(&mut state, current, Some(&snapshot));
		self.turn.notify_all();
		decided?;
		self.park(&mut state, current)
	}

	/// Mark `id` completed and pass the turn on without parking.
	pub(crate) fn complete(&self, id: OperationId) {
		let mut state = self.state.lock();
		if let Some(operation) = state.operations.get_mut(&id) {
			operation.status = OperationStatus::Completed;
			operation.last_point = SchedulingPoint::Complete;
		}
		if !state.terminated && state.current == id {
			// the execution may end here; nobody waits for the result
			let _ = Self::decide(&mut state, id, None);
		}
		self.turn.notify_all();
	}

	pub(crate) fn next_boolean(&self, current: OperationId, max_value: u64) -> Result<bool> {
		let mut state = self.state.lock();
		if state.terminated {
			return Err(Error::Canceled);
		}
		match state.strategy.next_boolean(current, max_value) {
			Ok(value) => {
				state.schedule.push(ScheduleStep::Boolean(value));
				Ok(value)
			}
			Err(error) => Err(self.fail_locked(&mut state, error)),
		}
	}

	pub(crate) fn next_integer(&self, current: OperationId, max_value: u64) -> Result<u64> {
		let mut state = self.state.lock();
		if state.terminated {
			return Err(Error::Canceled);
		}
		match state.strategy.next_integer(current, max_value) {
			Ok(value) => {
				state.schedule.push(ScheduleStep::Integer(value));
				Ok(value)
			}
			Err(error) => Err(self.fail_locked(&mut state, error)),
		}
	}

	/// Record the first bug and stop the execution. Cancellation is ignored.
	pub(crate) fn report_bug(&self, error: &Error) {
		if error.is_canceled() {
			return;
		}
		let mut state = self.state.lock();
		self.fail_locked(&mut state, error.clone());
	}

	fn fail_locked(&self, state: &mut MutexGuard<'_, SchedulerState>, error: Error) -> Error {
		if !state.terminated && !error.is_canceled() {
			debug!(error = %error, step = state.steps, "bug found");
			state.bug = Some(error);
			state.terminated = true;
			self.turn.notify_all();
		}
		Error::Canceled
	}

	/// Block until it is `id`'s turn.
	pub(crate) fn wait_for_turn(&self, id: OperationId) -> Result<()> {
		let mut state = self.state.lock();
		self.park(&mut state, id)
	}

	pub(crate) fn wait_for_termination(&self) {
		let mut state = self.state.lock();
		while !state.terminated {
			self.turn.wait(&mut state);
		}
	}

	pub(crate) fn is_terminated(&self) -> bool {
		self.state.lock().terminated
	}

	pub(crate) fn has_bug(&self) -> bool {
		self.state.lock().bug.is_some()
	}

	pub(crate) fn current(&self) -> OperationId {
		self.state.lock().current
	}

	/// Swap the strategy out, leaving `replacement` behind.
	pub(crate) fn take_strategy(&self, replacement: Box<dyn Strategy>) -> Box<dyn Strategy> {
		std::mem::replace(&mut self.state.lock().strategy, replacement)
	}

	pub(crate) fn outcome(&self) -> Outcome {
		let mut state = self.state.lock();
		Outcome {
			bug: state.bug.take(),
			schedule: std::mem::take(&mut state.schedule),
			steps: state.steps,
			step_bound_reached: state.step_bound_reached,
			distinct_states: state.cache.distinct(),
		}
	}

	fn park(&self, state: &mut MutexGuard<'_, SchedulerState>, id: OperationId) -> Result<()> {
		while !state.terminated && state.current != id {
			self.turn.wait(state);
		}
		if state.terminated {
			Err(Error::Canceled)
		} else {
			Ok(())
		}
	}

	fn decide(state: &mut SchedulerState, current: OperationId, snapshot: Option<&Snapshot>) -> Result<()> {
		let enabled: Vec<OperationId> =
			state.operations.keys().copied().filter(|id| is_enabled(&state.operations, *id)).collect();

		if enabled.is_empty() {
			let blocked: Vec<String> = state
				.operations
				.iter()
				.filter(|(_, operation)| operation.status.is_blocked())
				.map(|(id, operation)| format!("{} {} ({:?})", operation.name, id, operation.status))
				.collect();
			if blocked.is_empty() {
				debug!(steps = state.steps, "execution terminated");
			} else {
				let error = Error::Deadlock(format!("no operation is enabled; blocked: {}", blocked.join(", ")));
				debug!(error = %error, "deadlock");
				state.bug = Some(error);
			}
			state.terminated = true;
			return Err(Error::Canceled);
		}

		if state.max_steps > 0 && state.steps >= state.max_steps {
			debug!(steps = state.steps, "step bound reached");
			state.step_bound_reached = true;
			state.terminated = true;
			return Err(Error::Canceled);
		}

		let next = match state.strategy.next_operation(&enabled, current) {
			Ok(next) => next,
			Err(error) => {
				state.bug = Some(error);
				state.terminated = true;
				return Err(Error::Canceled);
			}
		};
		state.schedule.push(ScheduleStep::Operation(next));
		state.steps += 1;

		if let Some(snapshot) = snapshot {
			let hash = with_operations(snapshot.hash, &state.operations);
			state.cache.visit(hash);
			let violation = state.strategy.observe(&Step {
				state: hash,
				hot: &snapshot.hot,
				enabled: &enabled,
				chosen: next,
			});
			if let Some(message) = violation {
				state.bug = Some(Error::Liveness(message));
				state.terminated = true;
				return Err(Error::Canceled);
			}
		}

		if let Some(operation) = state.operations.get_mut(&next) {
			// a satisfied join or quiescence wait
			operation.status = OperationStatus::Enabled;
		}
		trace!(from = %current, to = %next, step = state.steps, "scheduled");
		state.current = next;
		Ok(())
	}
}
