// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! State machine core: the state stack and transition dispatch shared by
//! actors and monitors.

use std::{hash::Hash, sync::Arc};

use tracing::{debug, trace};
use weave_type::{Error, Result, StateHasher, usage_error};

use crate::{
	actor::{
		context::{Context, Host, Owner, Statement},
		machine::{Action, EventFilter, Machine, StateId, Temperature, Transition},
	},
	event::{Halt, Message},
	trace::TraceEntry,
};

/// A type-erased running machine, owned by exactly one actor or monitor.
pub(crate) trait Instance: Send {
	fn machine_name(&self) -> Arc<str>;

	/// Enter the start state, running its entry action with `initial` visible.
	fn start(&mut self, owner: &Owner, host: &dyn Host, initial: Option<Message>) -> Result<()>;

	/// Dispatch one message, then every event it raises.
	fn handle(&mut self, owner: &Owner, host: &dyn Host, message: Message) -> Result<()>;

	/// Defer and ignore sets of the current state.
	fn filter(&self) -> Arc<EventFilter>;

	fn current_state(&self) -> String;

	fn temperature(&self) -> Temperature;

	fn is_halted(&self) -> bool;

	/// Raised events the current state deferred, oldest first. The owning
	/// actor puts them back at the head of its mailbox.
	fn take_deferred(&mut self) -> Vec<Message>;

	fn fingerprint(&self, hasher: &mut StateHasher);
}

pub(crate) struct MachineCore<D, S> {
	machine: Machine<D, S>,
	data: D,
	stack: Vec<S>,
	halted: bool,
	deferred: Vec<Message>,
}

impl<D: Send + 'static, S: StateId> MachineCore<D, S> {
	pub(crate) fn new(machine: Machine<D, S>, data: D) -> Self {
		Self {
			machine,
			data,
			stack: Vec::new(),
			halted: false,
			deferred: Vec::new(),
		}
	}

	fn top(&self) -> Result<S> {
		self.stack.last().copied().ok_or_else(|| Error::Internal(format!("{} has an empty state stack", self.machine.name())))
	}

	fn run(
		&mut self,
		action: &Action<D, S>,
		owner: &Owner,
		host: &dyn Host,
		event: Option<&Message>,
		in_exit: bool,
	) -> Result<Option<Statement<S>>> {
		let mut ctx = Context::new(owner, host, self.top()?, event, in_exit);
		action(&mut self.data, &mut ctx)?;
		Ok(ctx.into_statement())
	}

	fn enter(&mut self, owner: &Owner, host: &dyn Host, event: Option<&Message>) -> Result<Option<Statement<S>>> {
		let machine = self.machine.clone();
		match machine.state(self.top()?)?.entry() {
			Some(action) => self.run(action, owner, host, event, false),
			None => Ok(None),
		}
	}

	fn exit(&mut self, owner: &Owner, host: &dyn Host, event: Option<&Message>) -> Result<()> {
		let machine = self.machine.clone();
		if let Some(action) = machine.state(self.top()?)?.exit() {
			self.run(action, owner, host, event, true)?;
		}
		Ok(())
	}

	/// Apply statements until none is pending. Returns a raised event, if any.
	fn apply(
		&mut self,
		owner: &Owner,
		host: &dyn Host,
		mut statement: Option<Statement<S>>,
		trigger: Option<&Message>,
	) -> Result<Option<Message>> {
		while let Some(next) = statement.take() {
			let from = self.top()?;
			match next {
				Statement::Raise(raised) => {
					trace!(machine = %owner, state = ?from, event = %raised.event_type(), "raise");
					host.record(TraceEntry::Raised {
						machine: owner.to_string(),
						state: format!("{:?}", from),
						event: raised.event_type().name().to_string(),
					});
					return Ok(Some(raised));
				}
				Statement::Goto(target) => {
					self.exit(owner, host, trigger)?;
					if let Some(top) = self.stack.last_mut() {
						*top = target;
					}
					debug!(machine = %owner, from = ?from, to = ?target, "goto");
					host.record(TraceEntry::Goto {
						machine: owner.to_string(),
						from: format!("{:?}", from),
						to: format!("{:?}", target),
					});
					statement = self.enter(owner, host, trigger)?;
				}
				Statement::Push(target) => {
					self.stack.push(target);
					debug!(machine = %owner, from = ?from, to = ?target, "push");
					host.record(TraceEntry::Push {
						machine: owner.to_string(),
						from: format!("{:?}", from),
						to: format!("{:?}", target),
					});
					statement = self.enter(owner, host, trigger)?;
				}
				Statement::Pop => {
					if self.stack.len() < 2 {
						let error = usage_error!("{} popped its last state {:?}", owner, from);
						host.fail(&error);
						return Err(error);
					}
					self.exit(owner, host, trigger)?;
					self.stack.pop();
					let to = self.top()?;
					debug!(machine = %owner, from = ?from, to = ?to, "pop");
					host.record(TraceEntry::Pop {
						machine: owner.to_string(),
						from: format!("{:?}", from),
						to: format!("{:?}", to),
					});
				}
				Statement::Halt => {
					self.halted = true;
					return Ok(None);
				}
			}
		}
		Ok(None)
	}

	fn dispatch(&mut self, owner: &Owner, host: &dyn Host, message: Message) -> Result<()> {
		let mut next = Some(message);
		while let Some(message) = next.take() {
			if self.halted {
				return Ok(());
			}
			if message.is::<Halt>() {
				self.halted = true;
				return Ok(());
			}

			let state = self.top()?;
			let machine = self.machine.clone();
			let statement = match machine.state(state)?.transition(message.event_type()) {
				Some(Transition::Invoke(action)) => self.run(action, owner, host, Some(&message), false)?,
				Some(Transition::Goto(target)) => Some(Statement::Goto(*target)),
				Some(Transition::Push(target)) => Some(Statement::Push(*target)),
				// only raised events get here; queued ones are filtered by the mailbox
				Some(Transition::Defer) => {
					if let Owner::Monitor(_) = owner {
						let error = usage_error!(
							"{} deferred raised event {} in state {:?}, monitors have no queue",
							owner,
							message.event_type(),
							state
						);
						host.fail(&error);
						return Err(error);
					}
					trace!(machine = %owner, state = ?state, event = %message.event_type(), "raised event deferred");
					self.deferred.push(message);
					return Ok(());
				}
				Some(Transition::Ignore) => {
					trace!(machine = %owner, state = ?state, event = %message.event_type(), "raised event ignored");
					None
				}
				None => match machine.unhandled() {
					Some(hook) => self.run(hook, owner, host, Some(&message), false)?,
					None => {
						let error = Error::UnhandledEvent {
							machine: owner.to_string(),
							state: format!("{:?}", state),
							event: message.event_type().name().to_string(),
						};
						host.fail(&error);
						return Err(error);
					}
				},
			};
			next = self.apply(owner, host, statement, Some(&message))?;
		}
		Ok(())
	}
}

impl<D: Send + 'static, S: StateId> Instance for MachineCore<D, S> {
	fn machine_name(&self) -> Arc<str> {
		self.machine.name_arc()
	}

	fn start(&mut self, owner: &Owner, host: &dyn Host, initial: Option<Message>) -> Result<()> {
		if !self.stack.is_empty() {
			return Err(usage_error!("{} was started twice", owner));
		}
		self.stack.push(self.machine.start_state());
		debug!(machine = %owner, state = ?self.machine.start_state(), "start");
		let statement = self.enter(owner, host, initial.as_ref())?;
		match self.apply(owner, host, statement, initial.as_ref())? {
			Some(raised) => self.dispatch(owner, host, raised),
			None => Ok(()),
		}
	}

	fn handle(&mut self, owner: &Owner, host: &dyn Host, message: Message) -> Result<()> {
		self.dispatch(owner, host, message)
	}

	fn filter(&self) -> Arc<EventFilter> {
		self.stack
			.last()
			.and_then(|state| self.machine.state(*state).ok())
			.map(|decl| decl.filter().clone())
			.unwrap_or_default()
	}

	fn current_state(&self) -> String {
		match self.stack.last() {
			Some(state) => format!("{:?}", state),
			None => "<none>".to_string(),
		}
	}

	fn temperature(&self) -> Temperature {
		self.stack
			.last()
			.and_then(|state| self.machine.state(*state).ok())
			.map(|decl| decl.temperature())
			.unwrap_or_default()
	}

	fn is_halted(&self) -> bool {
		self.halted
	}

	fn take_deferred(&mut self) -> Vec<Message> {
		std::mem::take(&mut self.deferred)
	}

	fn fingerprint(&self, hasher: &mut StateHasher) {
		hasher.write_str(self.machine.name());
		self.stack.hash(hasher);
		if let Some(data) = self.machine.data_hash(&self.data) {
			data.hash(hasher);
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use std::{cell::RefCell, time::Duration};

	use weave_type::{ActorId, OperationGroupId};

	use super::*;
	use crate::{
		event::{EventType, Origin},
		actor::context::CreateRequest,
		monitor::MonitorKey,
		timer::TimerHandle,
	};

	/// Host that records and rejects everything runtime-related.
	pub(crate) struct RecordingHost {
		pub strict: bool,
		pub entries: RefCell<Vec<TraceEntry>>,
		pub failures: RefCell<Vec<Error>>,
	}

	impl RecordingHost {
		pub(crate) fn new(strict: bool) -> Self {
			Self {
				strict,
				entries: RefCell::new(Vec::new()),
				failures: RefCell::new(Vec::new()),
			}
		}
	}

	impl Host for RecordingHost {
		fn send(&self, _: Option<Origin>, _: &ActorId, _: Message) -> Result<()> {
			Err(usage_error!("send"))
		}
		fn create(&self, _: Option<&ActorId>, _: CreateRequest) -> Result<ActorId> {
			Err(usage_error!("create"))
		}
		fn create_actor_id(&self, actor_type: &str) -> ActorId {
			ActorId::new(99, actor_type)
		}
		fn monitor(&self, _: &MonitorKey, _: Message) -> Result<()> {
			Err(usage_error!("monitor"))
		}
		fn random_boolean(&self, _: u64) -> Result<bool> {
			Ok(false)
		}
		fn random_integer(&self, _: u64) -> Result<u64> {
			Ok(0)
		}
		fn receive(&self, _: &[EventType]) -> Result<Message> {
			Err(usage_error!("receive"))
		}
		fn start_timer(&self, _: &ActorId, _: Duration, _: Option<Duration>) -> Result<TimerHandle> {
			Err(usage_error!("timer"))
		}
		fn stop_timer(&self, _: &TimerHandle) -> Result<()> {
			Ok(())
		}
		fn operation_group(&self) -> Option<OperationGroupId> {
			None
		}
		fn set_operation_group(&self, _: Option<OperationGroupId>) {}
		fn record(&self, entry: TraceEntry) {
			self.entries.borrow_mut().push(entry);
		}
		fn fail(&self, error: &Error) {
			self.failures.borrow_mut().push(error.clone());
		}
		fn strict(&self) -> bool {
			self.strict
		}
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	enum State {
		Init,
		Active,
		Nested,
	}

	#[derive(Debug)]
	struct Go;
	#[derive(Debug)]
	struct Enter;
	#[derive(Debug)]
	struct Leave;
	#[derive(Debug)]
	struct Twice;
	#[derive(Debug)]
	struct Bump(u32);
	#[derive(Debug)]
	struct Unknown;

	fn machine() -> Machine<Vec<String>, State> {
		Machine::builder("Test")
			.start(State::Init)
			.state(State::Init, |s| {
				s.on_entry(|log: &mut Vec<String>, ctx| {
					log.push(format!("enter Init with {:?}", ctx.event_as::<Bump>().map(|b| b.0)));
					Ok(())
				})
				.on_exit(|log: &mut Vec<String>, _| {
					log.push("exit Init".to_string());
					Ok(())
				})
				.goto_on::<Go>(State::Active)
				.on::<Twice, _>(|_, ctx, _| {
					ctx.goto(State::Active)?;
					ctx.raise(Go)
				})
				.on::<Bump, _>(|log, ctx, bump| {
					log.push(format!("bump {}", bump.0));
					ctx.raise(Go)
				})
			})
			.state(State::Active, |s| {
				s.on_entry(|log: &mut Vec<String>, _| {
					log.push("enter Active".to_string());
					Ok(())
				})
				.on_exit(|_, ctx| ctx.goto(State::Init))
				.push_on::<Enter>(State::Nested)
				.goto_on::<Go>(State::Init)
			})
			.state(State::Nested, |s| {
				s.hot().on::<Leave, _>(|_, ctx, _| ctx.pop()).on_entry(|log: &mut Vec<String>, _| {
					log.push("enter Nested".to_string());
					Ok(())
				})
			})
			.build()
			.unwrap()
	}

	fn owner() -> Owner {
		Owner::Actor(ActorId::new(1, "Test"))
	}

	#[test]
	fn test_start_runs_entry_with_initial_event() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, Some(Message::new(Bump(5)))).unwrap();
		assert_eq!(core.data, vec!["enter Init with Some(5)".to_string()]);
		assert_eq!(core.current_state(), "Init");
	}

	#[test]
	fn test_raised_event_is_handled_before_returning() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Bump(1))).unwrap();
		assert_eq!(core.current_state(), "Active");
		assert_eq!(core.data[1..], ["bump 1".to_string(), "exit Init".to_string(), "enter Active".to_string()]);
		assert!(matches!(host.entries.borrow()[0], TraceEntry::Raised { .. }));
	}

	#[test]
	fn test_push_and_pop() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Go)).unwrap();
		core.handle(&owner(), &host, Message::new(Enter)).unwrap();
		assert_eq!(core.stack, vec![State::Active, State::Nested]);
		assert_eq!(core.temperature(), Temperature::Hot);
		core.handle(&owner(), &host, Message::new(Leave)).unwrap();
		assert_eq!(core.stack, vec![State::Active]);
		assert_eq!(core.temperature(), Temperature::Cold);
	}

	#[test]
	fn test_two_statements_in_one_action_is_usage_error() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		let err = core.handle(&owner(), &host, Message::new(Twice)).unwrap_err();
		assert!(matches!(err, Error::Usage(ref msg) if msg.contains("'raise' after 'goto'")));
		assert_eq!(host.failures.borrow().len(), 1);
	}

	#[test]
	fn test_two_statements_allowed_when_not_strict() {
		let host = RecordingHost::new(false);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Twice)).unwrap();
		// the raise replaced the goto; Go then moves Init -> Active
		assert_eq!(core.current_state(), "Active");
	}

	#[test]
	fn test_statement_in_exit_action_is_usage_error() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Go)).unwrap();
		let err = core.handle(&owner(), &host, Message::new(Go)).unwrap_err();
		assert!(matches!(err, Error::Usage(ref msg) if msg.contains("exit action")));
	}

	#[test]
	fn test_unhandled_event() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		let err = core.handle(&owner(), &host, Message::new(Unknown)).unwrap_err();
		assert_eq!(
			err,
			Error::UnhandledEvent {
				machine: "Test(1)".to_string(),
				state: "Init".to_string(),
				event: "Unknown".to_string(),
			}
		);
	}

	#[test]
	fn test_halt_event() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Halt)).unwrap();
		assert!(core.is_halted());
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	enum Door {
		Closed,
		Opened,
	}

	#[derive(Debug)]
	struct Later;

	fn door() -> Machine<u32, Door> {
		Machine::builder("Door")
			.start(Door::Closed)
			.state(Door::Closed, |s| s.defer::<Later>().on::<Go, _>(|_: &mut u32, ctx, _| ctx.raise(Later)))
			.state(Door::Opened, |s| {
				s.on::<Later, _>(|handled: &mut u32, _, _| {
					*handled += 1;
					Ok(())
				})
			})
			.build()
			.unwrap()
	}

	#[test]
	fn test_raised_event_deferred_by_state_is_kept() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(door(), 0);
		core.start(&owner(), &host, None).unwrap();
		core.handle(&owner(), &host, Message::new(Go)).unwrap();
		assert_eq!(core.data, 0);

		let deferred = core.take_deferred();
		assert_eq!(deferred.len(), 1);
		assert!(deferred[0].is::<Later>());
		assert!(core.take_deferred().is_empty());
	}

	#[test]
	fn test_monitor_cannot_defer_raised_event() {
		let host = RecordingHost::new(true);
		let monitor = Owner::Monitor(Arc::from("Door"));
		let mut core = MachineCore::new(door(), 0);
		core.start(&monitor, &host, None).unwrap();
		let err = core.handle(&monitor, &host, Message::new(Go)).unwrap_err();
		assert!(matches!(err, Error::Usage(ref msg) if msg.contains("monitors have no queue")));
	}

	#[test]
	fn test_fingerprint_tracks_state() {
		let host = RecordingHost::new(true);
		let mut core = MachineCore::new(machine(), Vec::new());
		core.start(&owner(), &host, None).unwrap();
		let mut before = StateHasher::new();
		core.fingerprint(&mut before);
		core.handle(&owner(), &host, Message::new(Go)).unwrap();
		let mut after = StateHasher::new();
		core.fingerprint(&mut after);
		assert_ne!(before.finish64(), after.finish64());
	}
}
