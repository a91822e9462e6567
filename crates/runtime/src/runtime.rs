// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The surface shared by the systematic-testing and production runtimes.

use std::{any::Any, fmt};

use serde::{Deserialize, Serialize};
use weave_type::{ActorId, Result};

use crate::{
	actor::machine::{Machine, StateId},
	event::{Event, Message},
	monitor::Monitor,
};

/// Handle to a task started with [`ActorRuntime::spawn_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
	pub fn value(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "task#{}", self.0)
	}
}

/// Operations available to test harnesses, tasks and hosting code.
///
/// A runtime handle is bound to the operation that uses it: the harness, or
/// the task it was handed to. Actor code uses [`crate::Context`] instead.
pub trait ActorRuntime: Clone + Send + Sync + Sized + 'static {
	/// Reserve an id to be bound later with [`ActorRuntime::create_actor_with_id`].
	fn create_actor_id(&self, actor_type: &str) -> ActorId;

	fn create_actor<D, S>(&self, machine: &Machine<D, S>, data: D, initial: Option<Message>) -> Result<ActorId>
	where
		D: Send + 'static,
		S: StateId;

	fn create_actor_with_id<D, S>(
		&self,
		id: ActorId,
		machine: &Machine<D, S>,
		data: D,
		initial: Option<Message>,
	) -> Result<()>
	where
		D: Send + 'static,
		S: StateId;

	/// Create an actor and block until it is idle or halted.
	fn create_actor_and_execute<D, S>(
		&self,
		machine: &Machine<D, S>,
		data: D,
		initial: Option<Message>,
	) -> Result<ActorId>
	where
		D: Send + 'static,
		S: StateId;

	fn send_event<E: Event>(&self, target: &ActorId, event: E) -> Result<()>;

	/// Send and block until the target is idle or halted.
	fn send_event_and_execute<E: Event>(&self, target: &ActorId, event: E) -> Result<()>;

	/// Create the monitor `M` now instead of on its first event.
	fn register_monitor<M: Monitor>(&self) -> Result<()>;

	fn monitor<M: Monitor, E: Event>(&self, event: E) -> Result<()>;

	fn random_boolean(&self) -> Result<bool>;

	/// A value in `0..max_value`.
	fn random_integer(&self, max_value: u64) -> Result<u64>;

	fn assert(&self, predicate: bool, message: impl fmt::Display) -> Result<()>;

	/// Run `task` as a separate operation with its own runtime handle.
	fn spawn_task<F>(&self, task: F) -> Result<TaskId>
	where
		F: FnOnce(Self) -> Result<()> + Send + 'static;

	/// Block until every task completed.
	fn wait_all(&self, tasks: &[TaskId]) -> Result<()>;

	/// Block until one of the tasks completed and return it.
	fn wait_any(&self, tasks: &[TaskId]) -> Result<TaskId>;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
