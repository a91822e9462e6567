// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Per-actor FIFO of pending messages.
//!
//! The mailbox knows the defer/ignore filter of its owner's current state and
//! whether the owner is parked, so that a sender can tell in one locked step
//! whether it has to wake the owner up.

use std::{collections::VecDeque, sync::Arc};

use crate::{
	actor::machine::{Disposition, EventFilter},
	event::{EventType, Message},
};

/// What the owner is parked on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Waiting {
	/// The handler loop is running.
	#[default]
	None,
	/// Nothing in the queue is dequeuable in the current state.
	Idle,
	/// Blocked in an explicit receive.
	Receive(Vec<EventType>),
}

#[derive(Debug)]
pub(crate) enum EnqueueStatus {
	/// The owner halted; the message is handed back.
	Dropped(Message),
	/// The owner is idle and the message is not dequeuable in its current state.
	Deferred,
	/// The owner was parked and must be resumed by the caller.
	EventHandlerNotRunning,
	Queued,
}

pub(crate) enum Dequeue {
	Message(Message),
	/// Nothing dequeuable; the mailbox is now marked idle.
	Idle,
}

pub(crate) struct Mailbox {
	queue: VecDeque<Message>,
	filter: Arc<EventFilter>,
	waiting: Waiting,
	halted: bool,
}

impl Mailbox {
	pub(crate) fn new() -> Self {
		Self {
			queue: VecDeque::new(),
			filter: Arc::new(EventFilter::default()),
			waiting: Waiting::None,
			halted: false,
		}
	}

	pub(crate) fn set_filter(&mut self, filter: Arc<EventFilter>) {
		self.filter = filter;
	}

	pub(crate) fn waiting(&self) -> &Waiting {
		&self.waiting
	}

	pub(crate) fn is_halted(&self) -> bool {
		self.halted
	}

	pub(crate) fn len(&self) -> usize {
		self.queue.len()
	}

	pub(crate) fn enqueue(&mut self, message: Message) -> EnqueueStatus {
		if self.halted {
			return EnqueueStatus::Dropped(message);
		}
		let event_type = message.event_type();
		self.queue.push_back(message);

		match &self.waiting {
			Waiting::None => EnqueueStatus::Queued,
			Waiting::Idle => {
				if self.filter.disposition(event_type) == Disposition::Defer {
					EnqueueStatus::Deferred
				} else {
					self.waiting = Waiting::None;
					EnqueueStatus::EventHandlerNotRunning
				}
			}
			Waiting::Receive(types) => {
				if types.contains(&event_type) {
					self.waiting = Waiting::None;
					EnqueueStatus::EventHandlerNotRunning
				} else {
					EnqueueStatus::Queued
				}
			}
		}
	}

	/// Next dequeuable message. Ignored messages met on the way are removed
	/// and pushed to `ignored`; deferred ones stay in place.
	pub(crate) fn dequeue(&mut self, ignored: &mut Vec<Message>) -> Dequeue {
		let mut index = 0;
		while index < self.queue.len() {
			match self.filter.disposition(self.queue[index].event_type()) {
				Disposition::Dequeue => {
					if let Some(message) = self.queue.remove(index) {
						self.waiting = Waiting::None;
						return Dequeue::Message(message);
					}
				}
				Disposition::Ignore => {
					if let Some(message) = self.queue.remove(index) {
						ignored.push(message);
					}
				}
				Disposition::Defer => index += 1,
			}
		}
		self.waiting = Waiting::Idle;
		Dequeue::Idle
	}

	/// First message of one of `types`, regardless of the defer/ignore filter.
	/// Records a receive wait when there is none.
	pub(crate) fn dequeue_matching(&mut self, types: &[EventType]) -> Option<Message> {
		match self.queue.iter().position(|message| types.contains(&message.event_type())) {
			Some(index) => {
				self.waiting = Waiting::None;
				self.queue.remove(index)
			}
			None => {
				self.waiting = Waiting::Receive(types.to_vec());
				None
			}
		}
	}

	/// Put raised events the owner deferred back at the head of the queue,
	/// keeping their order.
	pub(crate) fn requeue_front(&mut self, deferred: Vec<Message>) {
		for message in deferred.into_iter().rev() {
			self.queue.push_front(message);
		}
	}

	/// Mark the owner halted and drain what is left.
	pub(crate) fn halt(&mut self) -> Vec<Message> {
		self.halted = true;
		self.waiting = Waiting::None;
		self.queue.drain(..).collect()
	}

	/// Names of queued event types, in order, for state hashing.
	pub(crate) fn queued_types(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.queue.iter().map(|message| message.event_type().name())
	}
}
