// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Execution context handed to every action.
//!
//! The context gives an action access to:
//! - The owning actor's identity, current state and triggering event
//! - Runtime services: send, create, monitor, receive, random choices, timers
//! - The state-changing statements: raise, goto, push, pop, halt
//!
//! At most one state-changing statement may be invoked per action, and none
//! from an exit action.

use std::{fmt, sync::Arc, time::Duration};

use weave_type::{ActorId, Error, OperationGroupId, Result, usage_error};

use crate::{
	actor::{
		core::{Instance, MachineCore},
		machine::{Machine, StateId},
	},
	event::{Event, EventType, Message, Origin},
	monitor::{Monitor, MonitorKey},
	timer::TimerHandle,
	trace::TraceEntry,
};

/// Who is executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
	Actor(ActorId),
	Monitor(Arc<str>),
}

impl fmt::Display for Owner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Owner::Actor(id) => write!(f, "{}", id),
			Owner::Monitor(name) => write!(f, "monitor {}", name),
		}
	}
}

/// A request to bind a new actor.
pub(crate) struct CreateRequest {
	pub instance: Box<dyn Instance>,
	pub id: Option<ActorId>,
	pub initial: Option<Message>,
	/// Block the caller until the new actor is quiescent.
	pub execute: bool,
}

/// Runtime services available to actions. Each runtime supplies its own.
pub(crate) trait Host {
	fn send(&self, origin: Option<Origin>, target: &ActorId, message: Message) -> Result<()>;

	fn create(&self, creator: Option<&ActorId>, request: CreateRequest) -> Result<ActorId>;

	fn create_actor_id(&self, actor_type: &str) -> ActorId;

	fn monitor(&self, key: &MonitorKey, message: Message) -> Result<()>;

	fn random_boolean(&self, max_value: u64) -> Result<bool>;

	fn random_integer(&self, max_value: u64) -> Result<u64>;

	fn receive(&self, types: &[EventType]) -> Result<Message>;

	fn start_timer(&self, owner: &ActorId, due: Duration, period: Option<Duration>) -> Result<TimerHandle>;

	fn stop_timer(&self, handle: &TimerHandle) -> Result<()>;

	fn operation_group(&self) -> Option<OperationGroupId>;

	fn set_operation_group(&self, group: Option<OperationGroupId>);

	fn record(&self, entry: TraceEntry);

	/// Called as soon as an action produces a bug, before it propagates.
	fn fail(&self, error: &Error);

	/// Whether the one-statement-per-action rule is enforced.
	fn strict(&self) -> bool;
}

pub(crate) enum Statement<S> {
	Raise(Message),
	Goto(S),
	Push(S),
	Pop,
	Halt,
}

impl<S> Statement<S> {
	fn name(&self) -> &'static str {
		match self {
			Statement::Raise(_) => "raise",
			Statement::Goto(_) => "goto",
			Statement::Push(_) => "push",
			Statement::Pop => "pop",
			Statement::Halt => "halt",
		}
	}
}

pub struct Context<'a, S> {
	owner: &'a Owner,
	host: &'a dyn Host,
	state: S,
	event: Option<&'a Message>,
	statement: Option<Statement<S>>,
	in_exit: bool,
}

impl<'a, S: StateId> Context<'a, S> {
	pub(crate) fn new(owner: &'a Owner, host: &'a dyn Host, state: S, event: Option<&'a Message>, in_exit: bool) -> Self {
		Self {
			owner,
			host,
			state,
			event,
			statement: None,
			in_exit,
		}
	}

	pub(crate) fn into_statement(self) -> Option<Statement<S>> {
		self.statement
	}

	/// The actor executing this action, `None` inside a monitor.
	pub fn id(&self) -> Option<&'a ActorId> {
		match self.owner {
			Owner::Actor(id) => Some(id),
			Owner::Monitor(_) => None,
		}
	}

	pub fn owner(&self) -> &'a Owner {
		self.owner
	}

	pub fn state(&self) -> S {
		self.state
	}

	/// The event that triggered this action, if any.
	pub fn event(&self) -> Option<&'a Message> {
		self.event
	}

	pub fn event_as<E: Event>(&self) -> Option<&'a E> {
		self.event.and_then(|message| message.downcast_ref::<E>())
	}

	pub fn send<E: Event>(&self, target: &ActorId, event: E) -> Result<()> {
		self.send_message(target, Message::new(event))
	}

	pub fn send_message(&self, target: &ActorId, message: Message) -> Result<()> {
		let origin = self.id().map(|sender| Origin {
			sender: sender.clone(),
			state: format!("{:?}", self.state),
		});
		self.host.send(origin, target, message)
	}

	pub fn create_actor<D2, S2>(&self, machine: &Machine<D2, S2>, data: D2, initial: Option<Message>) -> Result<ActorId>
	where
		D2: Send + 'static,
		S2: StateId,
	{
		self.host.create(
			self.id(),
			CreateRequest {
				instance: Box::new(MachineCore::new(machine.clone(), data)),
				id: None,
				initial,
				execute: false,
			},
		)
	}

	/// Bind a machine to an id obtained from [`Context::create_actor_id`].
	pub fn create_actor_with_id<D2, S2>(
		&self,
		id: ActorId,
		machine: &Machine<D2, S2>,
		data: D2,
		initial: Option<Message>,
	) -> Result<()>
	where
		D2: Send + 'static,
		S2: StateId,
	{
		self.host
			.create(
				self.id(),
				CreateRequest {
					instance: Box::new(MachineCore::new(machine.clone(), data)),
					id: Some(id),
					initial,
					execute: false,
				},
			)
			.map(|_| ())
	}

	pub fn create_actor_id(&self, actor_type: &str) -> ActorId {
		self.host.create_actor_id(actor_type)
	}

	/// Deliver `event` synchronously to the monitor of type `M`.
	pub fn monitor<M: Monitor, E: Event>(&self, event: E) -> Result<()> {
		self.host.monitor(&MonitorKey::of::<M>(), Message::new(event))
	}

	pub fn random_boolean(&self) -> Result<bool> {
		self.host.random_boolean(2)
	}

	/// True with probability `1 / max_value` under random strategies.
	pub fn random_boolean_with(&self, max_value: u64) -> Result<bool> {
		if max_value == 0 {
			return Err(self.failure(usage_error!("random boolean bound must be positive")));
		}
		self.host.random_boolean(max_value)
	}

	/// A value in `0..max_value`.
	pub fn random_integer(&self, max_value: u64) -> Result<u64> {
		if max_value == 0 {
			return Err(self.failure(usage_error!("random integer bound must be positive")));
		}
		self.host.random_integer(max_value)
	}

	/// Block until an `E` arrives, leaving other messages queued.
	pub fn receive<E: Event>(&self) -> Result<E> {
		let message = self.host.receive(&[EventType::of::<E>()])?;
		message.into_inner::<E>().map_err(|message| {
			Error::Internal(format!("received {} while waiting for {}", message.event_type(), EventType::of::<E>()))
		})
	}

	/// Block until a message of any of `types` arrives.
	pub fn receive_any(&self, types: &[EventType]) -> Result<Message> {
		if types.is_empty() {
			return Err(self.failure(usage_error!("{} waits to receive no event types", self.owner)));
		}
		self.host.receive(types)
	}

	pub fn assert(&self, predicate: bool, message: impl fmt::Display) -> Result<()> {
		if predicate {
			Ok(())
		} else {
			Err(self.failure(Error::Assertion(message.to_string())))
		}
	}

	/// Start a one-shot timer that sends [`crate::timer::TimerElapsed`] to this actor.
	pub fn start_timer(&self, due: Duration) -> Result<TimerHandle> {
		let id = self.require_actor("start a timer")?;
		self.host.start_timer(id, due, None)
	}

	pub fn start_periodic_timer(&self, due: Duration, period: Duration) -> Result<TimerHandle> {
		let id = self.require_actor("start a timer")?;
		self.host.start_timer(id, due, Some(period))
	}

	pub fn stop_timer(&self, handle: &TimerHandle) -> Result<()> {
		self.host.stop_timer(handle)
	}

	pub fn operation_group(&self) -> Option<OperationGroupId> {
		self.host.operation_group()
	}

	pub fn set_operation_group(&self, group: Option<OperationGroupId>) {
		self.host.set_operation_group(group)
	}

	/// Dispatch `event` to this machine before any further dequeue.
	pub fn raise<E: Event>(&mut self, event: E) -> Result<()> {
		self.set(Statement::Raise(Message::new(event)))
	}

	pub fn goto(&mut self, state: S) -> Result<()> {
		self.set(Statement::Goto(state))
	}

	pub fn push(&mut self, state: S) -> Result<()> {
		self.set(Statement::Push(state))
	}

	pub fn pop(&mut self) -> Result<()> {
		self.set(Statement::Pop)
	}

	/// Halt once this action returns. Equivalent to raising [`crate::event::Halt`].
	pub fn halt(&mut self) -> Result<()> {
		self.set(Statement::Halt)
	}

	fn set(&mut self, statement: Statement<S>) -> Result<()> {
		if self.in_exit {
			return Err(self.failure(usage_error!(
				"{} invoked '{}' inside the exit action of state {:?}",
				self.owner,
				statement.name(),
				self.state
			)));
		}
		if let Some(previous) = &self.statement {
			if self.host.strict() {
				return Err(self.failure(usage_error!(
					"{} invoked '{}' after '{}' in the same action of state {:?}",
					self.owner,
					statement.name(),
					previous.name(),
					self.state
				)));
			}
			tracing::debug!(owner = %self.owner, previous = previous.name(), next = statement.name(), "replacing state-changing statement");
		}
		self.statement = Some(statement);
		Ok(())
	}

	fn require_actor(&self, what: &str) -> Result<&'a ActorId> {
		self.id().ok_or_else(|| self.failure(usage_error!("{} cannot {}", self.owner, what)))
	}

	pub(crate) fn failure(&self, error: Error) -> Error {
		self.host.fail(&error);
		error
	}
}
