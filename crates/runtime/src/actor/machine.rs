// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Declarative state-machine definitions.
//!
//! A [`Machine`] is a closed set of states (values of a user enum) with their
//! entry/exit actions and a transition table keyed by event type. It is built
//! once with [`MachineBuilder`] and shared by every actor or monitor of that type.
//!
//! ```ignore
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum State { WaitPong, Done }
//!
//! let ping = Machine::<u32, State>::builder("Ping")
//!     .start(State::WaitPong)
//!     .state(State::WaitPong, |s| s
//!         .on::<Pong>(|count, ctx, _| { *count += 1; ctx.goto(State::Done) }))
//!     .state(State::Done, |s| s.ignore::<Pong>())
//!     .build()?;
//! ```

use std::{
	any::TypeId,
	collections::{HashMap, HashSet},
	fmt,
	hash::Hash,
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use weave_type::{Error, Result};

use crate::{
	actor::context::Context,
	event::{Event, EventType},
};

/// Identifier of a state: typically a fieldless enum.
pub trait StateId: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static> StateId for T {}

/// Liveness temperature of a state. Only meaningful for monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Temperature {
	/// No liveness obligation is outstanding.
	#[default]
	Cold,
	/// Something is expected to eventually happen.
	Hot,
}

pub type Action<D, S> = Arc<dyn Fn(&mut D, &mut Context<'_, S>) -> Result<()> + Send + Sync>;

pub(crate) enum Transition<D, S> {
	Goto(S),
	Push(S),
	Invoke(Action<D, S>),
	Defer,
	Ignore,
}

/// What a state does with a queued event before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
	Dequeue,
	Defer,
	Ignore,
}

/// Defer and ignore sets of one state, shared with the mailbox.
#[derive(Debug, Default)]
pub(crate) struct EventFilter {
	deferred: HashSet<TypeId>,
	ignored: HashSet<TypeId>,
}

impl EventFilter {
	pub(crate) fn disposition(&self, event_type: EventType) -> Disposition {
		if self.ignored.contains(&event_type.id()) {
			Disposition::Ignore
		} else if self.deferred.contains(&event_type.id()) {
			Disposition::Defer
		} else {
			Disposition::Dequeue
		}
	}
}

pub(crate) struct StateDecl<D, S> {
	entry: Option<Action<D, S>>,
	exit: Option<Action<D, S>>,
	transitions: HashMap<TypeId, Transition<D, S>>,
	filter: Arc<EventFilter>,
	temperature: Temperature,
}

impl<D, S> StateDecl<D, S> {
	pub(crate) fn entry(&self) -> Option<&Action<D, S>> {
		self.entry.as_ref()
	}

	pub(crate) fn exit(&self) -> Option<&Action<D, S>> {
		self.exit.as_ref()
	}

	pub(crate) fn transition(&self, event_type: EventType) -> Option<&Transition<D, S>> {
		self.transitions.get(&event_type.id())
	}

	pub(crate) fn filter(&self) -> &Arc<EventFilter> {
		&self.filter
	}

	pub(crate) fn temperature(&self) -> Temperature {
		self.temperature
	}
}

struct Definition<D, S> {
	name: Arc<str>,
	start: S,
	states: HashMap<S, StateDecl<D, S>>,
	unhandled: Option<Action<D, S>>,
	hasher: Option<Arc<dyn Fn(&D) -> u64 + Send + Sync>>,
}

/// An immutable, shareable machine definition.
pub struct Machine<D, S> {
	definition: Arc<Definition<D, S>>,
}

impl<D, S> Clone for Machine<D, S> {
	fn clone(&self) -> Self {
		Self {
			definition: self.definition.clone(),
		}
	}
}

impl<D: Send + 'static, S: StateId> Machine<D, S> {
	pub fn builder(name: impl Into<Arc<str>>) -> MachineBuilder<D, S> {
		MachineBuilder {
			name: name.into(),
			start: None,
			states: Vec::new(),
			unhandled: None,
			hasher: None,
			errors: Vec::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.definition.name
	}

	pub(crate) fn name_arc(&self) -> Arc<str> {
		self.definition.name.clone()
	}

	pub fn start_state(&self) -> S {
		self.definition.start
	}

	pub(crate) fn state(&self, state: S) -> Result<&StateDecl<D, S>> {
		self.definition.states.get(&state).ok_or_else(|| {
			Error::Internal(format!("state {:?} is not declared by {}", state, self.definition.name))
		})
	}

	pub(crate) fn unhandled(&self) -> Option<&Action<D, S>> {
		self.definition.unhandled.as_ref()
	}

	pub(crate) fn data_hash(&self, data: &D) -> Option<u64> {
		self.definition.hasher.as_ref().map(|hasher| hasher(data))
	}
}

impl<D, S: fmt::Debug> fmt::Debug for Machine<D, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Machine")
			.field("name", &self.definition.name)
			.field("start", &self.definition.start)
			.field("states", &self.definition.states.len())
			.finish()
	}
}

pub struct MachineBuilder<D, S> {
	name: Arc<str>,
	start: Option<S>,
	states: Vec<(S, StateDecl<D, S>)>,
	unhandled: Option<Action<D, S>>,
	hasher: Option<Arc<dyn Fn(&D) -> u64 + Send + Sync>>,
	errors: Vec<String>,
}

impl<D: Send + 'static, S: StateId> MachineBuilder<D, S> {
	pub fn start(mut self, state: S) -> Self {
		self.start = Some(state);
		self
	}

	/// Declare a state. The closure configures its actions and transitions.
	pub fn state<F>(mut self, state: S, configure: F) -> Self
	where
		F: FnOnce(StateBuilder<D, S>) -> StateBuilder<D, S>,
	{
		let builder = configure(StateBuilder::new(state));
		self.errors.extend(builder.errors);
		self.states.push((
			state,
			StateDecl {
				entry: builder.entry,
				exit: builder.exit,
				transitions: builder.transitions,
				filter: Arc::new(builder.filter),
				temperature: builder.temperature,
			},
		));
		self
	}

	/// Replace the default unhandled-event behaviour (a fatal error).
	///
	/// The hook runs like a handler: the event is available through
	/// [`Context::event`] and it may change state.
	pub fn on_unhandled<F>(mut self, hook: F) -> Self
	where
		F: Fn(&mut D, &mut Context<'_, S>) -> Result<()> + Send + Sync + 'static,
	{
		self.unhandled = Some(Arc::new(hook));
		self
	}

	/// Let the actor data contribute to the execution-state hash.
	pub fn hash_with<F>(mut self, hasher: F) -> Self
	where
		F: Fn(&D) -> u64 + Send + Sync + 'static,
	{
		self.hasher = Some(Arc::new(hasher));
		self
	}

	pub fn build(self) -> Result<Machine<D, S>> {
		let mut errors = self.errors;
		let mut states = HashMap::with_capacity(self.states.len());
		for (id, decl) in self.states {
			if states.insert(id, decl).is_some() {
				errors.push(format!("state {:?} is declared twice", id));
			}
		}

		let start = match self.start {
			Some(start) => start,
			None => {
				errors.push("no start state declared".to_string());
				return Err(build_error(&self.name, errors));
			}
		};
		if !states.contains_key(&start) {
			errors.push(format!("start state {:?} is not declared", start));
		}

		for decl in states.values() {
			for transition in decl.transitions.values() {
				if let Transition::Goto(target) | Transition::Push(target) = transition {
					if !states.contains_key(target) {
						errors.push(format!("transition target {:?} is not declared", target));
					}
				}
			}
		}

		if !errors.is_empty() {
			return Err(build_error(&self.name, errors));
		}

		Ok(Machine {
			definition: Arc::new(Definition {
				name: self.name,
				start,
				states,
				unhandled: self.unhandled,
				hasher: self.hasher,
			}),
		})
	}
}

fn build_error(name: &str, errors: Vec<String>) -> Error {
	Error::Usage(format!("invalid machine {}: {}", name, errors.join("; ")))
}

pub struct StateBuilder<D, S> {
	state: S,
	entry: Option<Action<D, S>>,
	exit: Option<Action<D, S>>,
	transitions: HashMap<TypeId, Transition<D, S>>,
	filter: EventFilter,
	temperature: Temperature,
	errors: Vec<String>,
}

impl<D: Send + 'static, S: StateId> StateBuilder<D, S> {
	fn new(state: S) -> Self {
		Self {
			state,
			entry: None,
			exit: None,
			transitions: HashMap::new(),
			filter: EventFilter::default(),
			temperature: Temperature::Cold,
			errors: Vec::new(),
		}
	}

	pub fn on_entry<F>(mut self, action: F) -> Self
	where
		F: Fn(&mut D, &mut Context<'_, S>) -> Result<()> + Send + Sync + 'static,
	{
		self.entry = Some(Arc::new(action));
		self
	}

	/// Exit actions may not raise, goto, push, pop or halt.
	pub fn on_exit<F>(mut self, action: F) -> Self
	where
		F: Fn(&mut D, &mut Context<'_, S>) -> Result<()> + Send + Sync + 'static,
	{
		self.exit = Some(Arc::new(action));
		self
	}

	/// Invoke `handler` when an `E` is dispatched in this state.
	pub fn on<E, F>(self, handler: F) -> Self
	where
		E: Event,
		F: Fn(&mut D, &mut Context<'_, S>, &E) -> Result<()> + Send + Sync + 'static,
	{
		let action: Action<D, S> = Arc::new(move |data: &mut D, ctx: &mut Context<'_, S>| {
			let event = ctx.event().and_then(|message| message.downcast_ref::<E>()).ok_or_else(|| {
				Error::Internal(format!("handler for {} invoked without its event", EventType::of::<E>()))
			})?;
			handler(data, ctx, event)
		});
		self.declare(EventType::of::<E>(), Transition::Invoke(action))
	}

	pub fn goto_on<E: Event>(self, target: S) -> Self {
		self.declare(EventType::of::<E>(), Transition::Goto(target))
	}

	pub fn push_on<E: Event>(self, target: S) -> Self {
		self.declare(EventType::of::<E>(), Transition::Push(target))
	}

	/// Keep `E` queued while this state is active.
	pub fn defer<E: Event>(mut self) -> Self {
		self.filter.deferred.insert(TypeId::of::<E>());
		self.declare(EventType::of::<E>(), Transition::Defer)
	}

	/// Drop `E` silently while this state is active.
	pub fn ignore<E: Event>(mut self) -> Self {
		self.filter.ignored.insert(TypeId::of::<E>());
		self.declare(EventType::of::<E>(), Transition::Ignore)
	}

	pub fn hot(mut self) -> Self {
		self.temperature = Temperature::Hot;
		self
	}

	pub fn cold(mut self) -> Self {
		self.temperature = Temperature::Cold;
		self
	}

	fn declare(mut self, event_type: EventType, transition: Transition<D, S>) -> Self {
		if self.transitions.insert(event_type.id(), transition).is_some() {
			self.errors.push(format!("state {:?} declares event {} more than once", self.state, event_type));
		}
		self
	}
}
