// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Actors running on dedicated OS threads.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::Arc,
	thread::{self, JoinHandle},
	time::Duration,
};

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};
use weave_type::{ActorId, Error, OperationGroupId, Result};

use super::{ProductionHost, Shared};
use crate::{
	actor::{
		context::{Host, Owner},
		core::Instance,
		mailbox::{Dequeue, EnqueueStatus, Mailbox},
	},
	event::{EventType, Message},
	runtime::panic_message,
	timer::TimerHandle,
	trace::TraceEntry,
};

/// Interval for checking cancellation while parked on an empty mailbox.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

struct Inbox {
	mailbox: Mailbox,
	/// Signalled once the actor is idle, halted or parked in a receive.
	quiescence: Vec<Sender<()>>,
}

impl Inbox {
	fn notify_quiescent(&mut self) {
		for waiter in self.quiescence.drain(..) {
			let _ = waiter.try_send(());
		}
	}
}

pub(crate) struct ActorCell {
	pub id: ActorId,
	inbox: Mutex<Inbox>,
	wake: Condvar,
	state: Mutex<String>,
	pub timers: Mutex<Vec<TimerHandle>>,
}

impl ActorCell {
	pub(crate) fn new(id: ActorId) -> Self {
		Self {
			id,
			inbox: Mutex::new(Inbox {
				mailbox: Mailbox::new(),
				quiescence: Vec::new(),
			}),
			wake: Condvar::new(),
			state: Mutex::new(String::new()),
			timers: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn state(&self) -> String {
		self.state.lock().clone()
	}

	/// Register a quiescence waiter before the actor starts.
	pub(crate) fn await_quiescence(&self, waiter: Sender<()>) {
		self.inbox.lock().quiescence.push(waiter);
	}

	/// Enqueue `message`, waking the actor if it is parked. A waiter is
	/// signalled when the actor is next idle or halted.
	pub(crate) fn enqueue(&self, message: Message, waiter: Option<Sender<()>>) -> Option<Message> {
		let mut inbox = self.inbox.lock();
		let status = inbox.mailbox.enqueue(message);
		if let Some(waiter) = waiter {
			inbox.quiescence.push(waiter);
		}
		match status {
			EnqueueStatus::Dropped(message) => {
				inbox.notify_quiescent();
				Some(message)
			}
			EnqueueStatus::Deferred => {
				inbox.notify_quiescent();
				None
			}
			EnqueueStatus::EventHandlerNotRunning => {
				self.wake.notify_one();
				None
			}
			EnqueueStatus::Queued => None,
		}
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
		.spawn(move || {
			debug!(actor = %cell.id, "actor thread starting");
			run(shared, cell.clone(), instance, initial, group);
			debug!(actor = %cell.id, "actor thread stopped");
		})
		.map_err(|e| Error::Internal(format!("failed to spawn actor thread: {}", e)))
}

fn run(
	shared: Arc<Shared>,
	cell: Arc<ActorCell>,
	mut instance: Box<dyn Instance>,
	initial: Option<Message>,
	group: Option<OperationGroupId>,
) {
	let host = ProductionHost::new(shared.clone(), Some(cell.clone()), group);
	let owner = Owner::Actor(cell.id.clone());

	let result = catch_unwind(AssertUnwindSafe(|| handler_loop(&shared, &cell, &host, &owner, instance.as_mut(), initial)));
	let failure = match result {
		Ok(Ok(())) => None,
		Ok(Err(error)) => Some(error),
		Err(payload) => Some(Error::Panicked {
			operation: cell.id.to_string(),
			message: panic_message(payload.as_ref()),
		}),
	};
	if let Some(error) = failure {
		if !error.is_canceled() {
			shared.fail(&error);
		}
	}
	halt(&shared, &cell);
}

fn handler_loop(
	shared: &Shared,
	cell: &ActorCell,
	host: &ProductionHost,
	owner: &Owner,
	instance: &mut dyn Instance,
	initial: Option<Message>,
) -> Result<()> {
	instance.start(owner, host, initial)?;
	requeue_deferred(cell, instance);
	*cell.state.lock() = instance.current_state();

	loop {
		if instance.is_halted() {
			return Ok(());
		}

		let mut ignored = Vec::new();
		let message = {
			let mut inbox = cell.inbox.lock();
			inbox.mailbox.set_filter(instance.filter());
			loop {
				if shared.cancel.is_cancelled() {
					return Err(Error::Canceled);
				}
				match inbox.mailbox.dequeue(&mut ignored) {
					Dequeue::Message(message) => break message,
					Dequeue::Idle => {
						inbox.notify_quiescent();
						cell.wake.wait_for(&mut inbox, SHUTDOWN_CHECK_INTERVAL);
					}
				}
			}
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

		trace!(actor = %cell.id, state = %instance.current_state(), event = %message.event_type(), sequence = ?message.sequence(), "dequeued");
		if let Some(group) = message.group() {
			host.set_operation_group(Some(group));
		}
		instance.handle(owner, host, message)?;
		requeue_deferred(cell, instance);
		*cell.state.lock() = instance.current_state();
	}
}

fn requeue_deferred(cell: &ActorCell, instance: &mut dyn Instance) {
	let deferred = instance.take_deferred();
	if !deferred.is_empty() {
		cell.inbox.lock().mailbox.requeue_front(deferred);
	}
}

fn halt(shared: &Shared, cell: &ActorCell) {
	shared.retire(&cell.id);
	let dropped = {
		let mut inbox = cell.inbox.lock();
		let dropped = inbox.mailbox.halt();
		inbox.notify_quiescent();
		dropped
	};
	for timer in cell.timers.lock().drain(..) {
		timer.cancel();
	}
	for message in dropped {
		shared.dropped(&cell.id, message);
	}
	debug!(actor = %cell.id, "halted");
}

/// Explicit receive from inside a handler.
pub(crate) fn receive(shared: &Shared, cell: &ActorCell, types: &[EventType]) -> Result<Message> {
	let mut inbox = cell.inbox.lock();
	loop {
		if shared.cancel.is_cancelled() {
			return Err(Error::Canceled);
		}
		if let Some(message) = inbox.mailbox.dequeue_matching(types) {
			trace!(actor = %cell.id, event = %message.event_type(), "received");
			return Ok(message);
		}
		inbox.notify_quiescent();
		cell.wake.wait_for(&mut inbox, SHUTDOWN_CHECK_INTERVAL);
	}
}
