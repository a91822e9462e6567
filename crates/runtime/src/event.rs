// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Events and the messages that carry them.
//!
//! Any `Send + Debug + 'static` type is an [`Event`]. A [`Message`] wraps a boxed
//! event together with the metadata the runtime stamps on it at send time.

use std::{
	any::{Any, TypeId, type_name},
	fmt,
};

use serde::{Deserialize, Serialize};
use weave_type::{ActorId, OperationGroupId};

pub trait Event: Any + Send + fmt::Debug {
	fn as_any(&self) -> &dyn Any;

	fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send + fmt::Debug> Event for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
		self
	}
}

/// Halts the receiving actor when dequeued or raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt;

/// Declared type of an event, used as the key of transition tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
	id: TypeId,
	name: &'static str,
}

impl EventType {
	pub fn of<E: Event>() -> Self {
		Self {
			id: TypeId::of::<E>(),
			name: short_name(type_name::<E>()),
		}
	}

	pub fn id(&self) -> TypeId {
		self.id
	}

	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl fmt::Debug for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// Strips the module path, keeping generic arguments readable.
pub(crate) fn short_name(full: &'static str) -> &'static str {
	let end = full.find('<').unwrap_or(full.len());
	match full[..end].rfind("::") {
		Some(pos) => &full[pos + 2..],
		None => full,
	}
}

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
	pub sender: ActorId,
	pub state: String,
}

/// An event in flight.
pub struct Message {
	payload: Box<dyn Event>,
	event_type: EventType,
	origin: Option<Origin>,
	sequence: Option<u64>,
	group: Option<OperationGroupId>,
}

impl Message {
	pub fn new<E: Event>(event: E) -> Self {
		Self {
			payload: Box::new(event),
			event_type: EventType::of::<E>(),
			origin: None,
			sequence: None,
			group: None,
		}
	}

	pub fn event_type(&self) -> EventType {
		self.event_type
	}

	pub fn is<E: Event>(&self) -> bool {
		self.event_type.id == TypeId::of::<E>()
	}

	pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
		(*self.payload).as_any().downcast_ref::<E>()
	}

	/// Take the payload out, handing the message back on a type mismatch.
	pub fn into_inner<E: Event>(self) -> Result<E, Message> {
		if !self.is::<E>() {
			return Err(self);
		}
		match self.payload.into_any().downcast::<E>() {
			Ok(event) => Ok(*event),
			// the type id matched above
			Err(_) => unreachable!("event type id mismatch"),
		}
	}

	pub fn origin(&self) -> Option<&Origin> {
		self.origin.as_ref()
	}

	/// Monotonic send sequence number, `None` for initial and raised events.
	pub fn sequence(&self) -> Option<u64> {
		self.sequence
	}

	pub fn group(&self) -> Option<OperationGroupId> {
		self.group
	}

	pub(crate) fn stamp(&mut self, origin: Option<Origin>, sequence: u64, group: Option<OperationGroupId>) {
		self.origin = origin;
		self.sequence = Some(sequence);
		self.group = group;
	}

	pub(crate) fn describe(&self) -> String {
		format!("{:?}", self.payload)
	}
}

impl fmt::Debug for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Message")
			.field("event", &self.payload)
			.field("origin", &self.origin)
			.field("sequence", &self.sequence)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, PartialEq)]
	struct Ping(u32);

	#[derive(Debug)]
	struct Pong;

	#[test]
	fn test_event_type_name() {
		assert_eq!(EventType::of::<Ping>().name(), "Ping");
		assert_ne!(EventType::of::<Ping>(), EventType::of::<Pong>());
	}

	#[test]
	fn test_downcast() {
		let msg = Message::new(Ping(3));
		assert!(msg.is::<Ping>());
		assert!(!msg.is::<Pong>());
		assert_eq!(msg.downcast_ref::<Ping>(), Some(&Ping(3)));
		assert!(msg.downcast_ref::<Pong>().is_none());
	}

	#[test]
	fn test_into_inner_mismatch_returns_message() {
		let msg = Message::new(Ping(1));
		let msg = msg.into_inner::<Pong>().unwrap_err();
		assert_eq!(msg.into_inner::<Ping>().unwrap(), Ping(1));
	}
}
