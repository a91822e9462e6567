// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Actor operations under the systematic scheduler.
//!
//! Each actor runs its handler loop on a dedicated thread that only makes
//! progress while the scheduler names its operation as current.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::Arc,
	thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{debug, trace};
use weave_type::{ActorId, Error, Hash64, OperationGroupId, OperationId, Result, StateHasher};

use super::{OperationHost, Shared};
use crate::{
	actor::{
		context::{Host, Owner},
		core::Instance,
		mailbox::{Dequeue, Mailbox},
	},
	event::Message,
	runtime::panic_message,
	scheduler::{OperationStatus, SchedulingPoint},
	timer::TimerHandle,
	trace::TraceEntry,
};

/// What other operations may observe of an actor whose machine is owned by
/// its thread.
#[derive(Debug, Clone)]
pub(crate) struct Summary {
	pub state: String,
	pub fingerprint: Hash64,
}

pub(crate) struct ActorCell {
	pub id: ActorId,
	pub operation: OperationId,
	pub mailbox: Mutex<Mailbox>,
	pub summary: Mutex<Summary>,
	pub timers: Mutex<Vec<TimerHandle>>,
}

impl ActorCell {
	pub(crate) fn new(id: ActorId, operation: OperationId) -> Self {
		Self {
			id,
			operation,
			mailbox: Mutex::new(Mailbox::new()),
			summary: Mutex::new(Summary {
				state: String::new(),
				fingerprint: Hash64(0),
			}),
			timers: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn state(&self) -> String {
		self.summary.lock().state.clone()
	}

	fn publish(&self, instance: &dyn Instance) {
		let mut hasher = StateHasher::new();
		instance.fingerprint(&mut hasher);
		*self.summary.lock() = Summary {
			state: instance.current_state(),
			fingerprint: hasher.finish64(),
		};
	}
}

pub(crate) fn spawn(
	shared: Arc<Shared>,
	cell: Arc<ActorCell>,
	instance: Box<dyn Instance>,
	initial: Option<Message>,
	group: Option<OperationGroupId>,
) -> Result<JoinHandle<()>> {
	thread::Builder::new()
		.name(format!("weave-{}", cell.id))
		.spawn(move || run(shared, cell, instance, initial, group))
		.map_err(|e| Error::Internal(format!("failed to spawn actor thread: {}", e)))
}

fn run(
	shared: Arc<Shared>,
	cell: Arc<ActorCell>,
	mut instance: Box<dyn Instance>,
	initial: Option<Message>,
	group: Option<OperationGroupId>,
) {
	let host = OperationHost::new(shared.clone(), cell.operation, Some(cell.clone()), group);
	let owner = Owner::Actor(cell.id.clone());

	let result = catch_unwind(AssertUnwindSafe(|| handler_loop(&shared, &cell, &host, &owner, instance.as_mut(), initial)));
	match result {
		Ok(Ok(())) => {}
		Ok(Err(error)) => {
			if !error.is_canceled() {
				debug!(actor = %cell.id, error = %error, "actor failed");
			}
			shared.scheduler.report_bug(&error);
		}
		Err(payload) => {
			let error = Error::Panicked {
				operation: cell.id.to_string(),
				message: panic_message(payload.as_ref()),
			};
			debug!(actor = %cell.id, error = %error, "actor panicked");
			shared.scheduler.report_bug(&error);
		}
	}
}

fn handler_loop(
	shared: &Shared,
	cell: &ActorCell,
	host: &OperationHost,
	owner: &Owner,
	instance: &mut dyn Instance,
	initial: Option<Message>,
) -> Result<()> {
	shared.scheduler.wait_for_turn(cell.operation)?;
	trace!(actor = %cell.id, "actor started");
	instance.start(owner, host, initial)?;
	requeue_deferred(cell, instance);
	cell.publish(instance);

	// false right after waking from idle: the wake-up was the scheduling point
	let mut yield_first = true;
	loop {
		if instance.is_halted() {
			return halt(shared, cell, instance);
		}
		if yield_first {
			shared.schedule(cell.operation, SchedulingPoint::Dequeue)?;
		}

		let mut ignored = Vec::new();
		let next = {
			let mut mailbox = cell.mailbox.lock();
			mailbox.set_filter(instance.filter());
			mailbox.dequeue(&mut ignored)
		};
		for message in ignored {
			trace!(actor = %cell.id, event = %message.event_type(), "ignored");
			host.record(TraceEntry::Ignored {
				actor: cell.id.clone(),
				state: instance.current_state(),
				event: message.event_type().name().to_string(),
				sequence: message.sequence(),
			});
		}

		match next {
			Dequeue::Message(message) => {
				debug!(actor = %cell.id, state = %instance.current_state(), event = %message.event_type(), sequence = ?message.sequence(), "dequeued");
				host.record(TraceEntry::Dequeued {
					actor: cell.id.clone(),
					state: instance.current_state(),
					event: message.event_type().name().to_string(),
					sequence: message.sequence(),
				});
				if let Some(group) = message.group() {
					host.set_operation_group(Some(group));
				}
				instance.handle(owner, host, message)?;
				requeue_deferred(cell, instance);
				cell.publish(instance);
				yield_first = true;
			}
			Dequeue::Idle => {
				shared.scheduler.set_status(cell.operation, OperationStatus::Idle);
				shared.schedule(cell.operation, SchedulingPoint::Idle)?;
				yield_first = false;
			}
		}
	}
}

fn requeue_deferred(cell: &ActorCell, instance: &mut dyn Instance) {
	let deferred = instance.take_deferred();
	if !deferred.is_empty() {
		cell.mailbox.lock().requeue_front(deferred);
	}
}

fn halt(shared: &Shared, cell: &ActorCell, instance: &dyn Instance) -> Result<()> {
	let dropped = cell.mailbox.lock().halt();
	for timer in cell.timers.lock().drain(..) {
		timer.cancel();
	}
	shared.retire(&cell.id);
	for message in dropped {
		shared.dropped(&cell.id, message);
	}
	debug!(actor = %cell.id, state = %instance.current_state(), "halted");
	shared.record(TraceEntry::Halted {
		actor: cell.id.clone(),
	});
	shared.scheduler.complete(cell.operation);
	Ok(())
}

/// Explicit receive from inside a handler.
pub(crate) fn receive(
	shared: &Shared,
	cell: &ActorCell,
	host: &OperationHost,
	types: &[crate::event::EventType],
) -> Result<Message> {
	loop {
		let found = cell.mailbox.lock().dequeue_matching(types);
		match found {
			Some(message) => {
				debug!(actor = %cell.id, event = %message.event_type(), sequence = ?message.sequence(), "received");
				host.record(TraceEntry::Dequeued {
					actor: cell.id.clone(),
					state: cell.state(),
					event: message.event_type().name().to_string(),
					sequence: message.sequence(),
				});
				if let Some(group) = message.group() {
					host.set_operation_group(Some(group));
				}
				return Ok(message);
			}
			None => {
				shared.scheduler.set_status(cell.operation, OperationStatus::BlockedOnReceive);
				shared.schedule(cell.operation, SchedulingPoint::Receive)?;
			}
		}
	}
}
