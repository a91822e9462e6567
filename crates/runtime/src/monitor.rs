// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Safety and liveness monitors.
//!
//! A monitor is a singleton state machine without a mailbox. Events are
//! delivered to it synchronously by whoever calls [`crate::Context::monitor`]
//! or [`crate::ActorRuntime::monitor`]. States marked hot carry a liveness
//! obligation: a run that terminates, or cycles fairly, with a hot monitor
//! is a liveness bug.

use std::{
	any::{TypeId, type_name},
	fmt,
	hash::Hash,
	sync::Arc,
	time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, instrument};
use weave_type::{ActorId, Error, OperationGroupId, Result, StateHasher, usage_error};

use crate::{
	actor::{
		context::{CreateRequest, Host, Owner},
		core::{Instance, MachineCore},
		machine::{Machine, StateId, Temperature},
	},
	event::{EventType, Message, Origin, short_name},
	timer::TimerHandle,
	trace::TraceEntry,
};

/// A monitor type. The implementing type is the monitor's data.
///
/// ```ignore
/// #[derive(Default)]
/// struct Progress;
///
/// impl Monitor for Progress {
///     type State = State;
///
///     fn machine() -> Result<Machine<Self, State>> {
///         Machine::builder("Progress")
///             .start(State::Idle)
///             .state(State::Idle, |s| s.goto_on::<Start>(State::Busy))
///             .state(State::Busy, |s| s.hot().goto_on::<Done>(State::Idle))
///             .build()
///     }
/// }
/// ```
pub trait Monitor: Default + Send + 'static {
	type State: StateId;

	fn machine() -> Result<Machine<Self, Self::State>>;
}

/// Type-erased handle naming a monitor type.
#[derive(Clone, Copy)]
pub struct MonitorKey {
	id: TypeId,
	name: &'static str,
	factory: fn() -> Result<Box<dyn Instance>>,
}

impl MonitorKey {
	pub fn of<M: Monitor>() -> Self {
		Self {
			id: TypeId::of::<M>(),
			name: short_name(type_name::<M>()),
			factory: instantiate::<M>,
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}
}

fn instantiate<M: Monitor>() -> Result<Box<dyn Instance>> {
	Ok(Box::new(MachineCore::new(M::machine()?, M::default())))
}

impl PartialEq for MonitorKey {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for MonitorKey {}

impl fmt::Debug for MonitorKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

struct Entry {
	key: MonitorKey,
	owner: Owner,
	instance: Box<dyn Instance>,
	hot: bool,
}

/// A monitor currently in a hot state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotMonitor {
	pub monitor: String,
	pub state: String,
}

impl fmt::Display for HotMonitor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "monitor {} is in hot state {}", self.monitor, self.state)
	}
}

/// All monitors of one run, behind a single lock.
#[derive(Default)]
pub(crate) struct MonitorSet {
	entries: Mutex<Vec<Entry>>,
}

impl MonitorSet {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// Create the monitor now if it does not exist yet.
	pub(crate) fn register(&self, key: &MonitorKey, host: &dyn Host) -> Result<()> {
		let mut entries = self.entries.lock();
		if entries.iter().any(|entry| entry.key == *key) {
			return Ok(());
		}
		Self::create(&mut entries, key, host).map(|_| ())
	}

	#[instrument(name = "monitor::dispatch", level = "trace", skip_all, fields(monitor = key.name, event = %message.event_type()))]
	pub(crate) fn dispatch(&self, key: &MonitorKey, message: Message, host: &dyn Host) -> Result<()> {
		let mut entries = self.entries.lock();
		let index = match entries.iter().position(|entry| entry.key == *key) {
			Some(index) => index,
			None => Self::create(&mut entries, key, host)?,
		};
		let entry = &mut entries[index];
		let restricted = MonitorHost {
			inner: host,
		};

		host.record(TraceEntry::MonitorProcessed {
			monitor: key.name.to_string(),
			state: entry.instance.current_state(),
			event: message.event_type().name().to_string(),
		});
		debug!(monitor = key.name, state = %entry.instance.current_state(), event = %message.event_type(), "monitor processes event");
		entry.instance.handle(&entry.owner, &restricted, message)?;
		Self::observe_temperature(entry, host);
		Ok(())
	}

	fn create(entries: &mut Vec<Entry>, key: &MonitorKey, host: &dyn Host) -> Result<usize> {
		let owner = Owner::Monitor(Arc::from(key.name));
		let mut instance = (key.factory)().map_err(|error| {
			host.fail(&error);
			error
		})?;
		let restricted = MonitorHost {
			inner: host,
		};
		instance.start(&owner, &restricted, None)?;
		debug!(monitor = key.name, state = %instance.current_state(), "monitor created");

		let mut entry = Entry {
			key: *key,
			owner,
			instance,
			hot: false,
		};
		Self::observe_temperature(&mut entry, host);
		entries.push(entry);
		Ok(entries.len() - 1)
	}

	fn observe_temperature(entry: &mut Entry, host: &dyn Host) {
		let hot = entry.instance.temperature() == Temperature::Hot;
		if hot != entry.hot {
			entry.hot = hot;
			debug!(monitor = entry.key.name, state = %entry.instance.current_state(), hot, "monitor temperature changed");
			host.record(TraceEntry::MonitorTemperature {
				monitor: entry.key.name.to_string(),
				state: entry.instance.current_state(),
				hot,
			});
		}
	}

	pub(crate) fn hot(&self) -> Vec<HotMonitor> {
		self.entries
			.lock()
			.iter()
			.filter(|entry| entry.hot)
			.map(|entry| HotMonitor {
				monitor: entry.key.name.to_string(),
				state: entry.instance.current_state(),
			})
			.collect()
	}

	/// Current state of the monitor, if it has been created.
	pub(crate) fn state_of(&self, key: &MonitorKey) -> Option<String> {
		self.entries.lock().iter().find(|entry| entry.key == *key).map(|entry| entry.instance.current_state())
	}

	pub(crate) fn fingerprint(&self, hasher: &mut StateHasher) {
		for entry in self.entries.lock().iter() {
			entry.instance.fingerprint(hasher);
			entry.hot.hash(hasher);
		}
	}
}

/// Host handed to monitor actions: everything that would let a monitor
/// influence the system under test is refused.
struct MonitorHost<'a> {
	inner: &'a dyn Host,
}

impl MonitorHost<'_> {
	fn deny<T>(&self, what: &str) -> Result<T> {
		let error = usage_error!("monitors cannot {}", what);
		self.inner.fail(&error);
		Err(error)
	}
}

impl Host for MonitorHost<'_> {
	fn send(&self, _: Option<Origin>, _: &ActorId, _: Message) -> Result<()> {
		self.deny("send events")
	}

	fn create(&self, _: Option<&ActorId>, _: CreateRequest) -> Result<ActorId> {
		self.deny("create actors")
	}

	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		self.inner.create_actor_id(actor_type)
	}

	fn monitor(&self, _: &MonitorKey, _: Message) -> Result<()> {
		self.deny("invoke other monitors")
	}

	fn random_boolean(&self, _: u64) -> Result<bool> {
		self.deny("draw random values")
	}

	fn random_integer(&self, _: u64) -> Result<u64> {
		self.deny("draw random values")
	}

	fn receive(&self, _: &[EventType]) -> Result<Message> {
		self.deny("receive events")
	}

	fn start_timer(&self, _: &ActorId, _: Duration, _: Option<Duration>) -> Result<TimerHandle> {
		self.deny("start timers")
	}

	fn stop_timer(&self, _: &TimerHandle) -> Result<()> {
		self.deny("stop timers")
	}

	fn operation_group(&self) -> Option<OperationGroupId> {
		None
	}

	fn set_operation_group(&self, _: Option<OperationGroupId>) {}

	fn record(&self, entry: TraceEntry) {
		self.inner.record(entry)
	}

	fn fail(&self, error: &Error) {
		self.inner.fail(error)
	}

	fn strict(&self) -> bool {
		self.inner.strict()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::actor::core::tests::RecordingHost;

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	enum State {
		Idle,
		Busy,
	}

	#[derive(Debug)]
	struct Start;
	#[derive(Debug)]
	struct Done;
	#[derive(Debug)]
	struct Chatty;

	#[derive(Default)]
	struct Progress {
		started: u32,
	}

	impl Monitor for Progress {
		type State = State;

		fn machine() -> Result<Machine<Self, State>> {
			Machine::builder("Progress")
				.start(State::Idle)
				.state(State::Idle, |s| {
					s.on::<Start, _>(|data: &mut Progress, ctx, _| {
						data.started += 1;
						ctx.goto(State::Busy)
					})
					.on::<Chatty, _>(|_, ctx, _| ctx.send(&ActorId::new(1, "X"), Done))
				})
				.state(State::Busy, |s| s.hot().goto_on::<Done>(State::Idle))
				.build()
		}
	}

	#[test]
	fn test_monitor_created_lazily_and_tracks_temperature() {
		let host = RecordingHost::new(true);
		let monitors = MonitorSet::new();
		let key = MonitorKey::of::<Progress>();
		assert_eq!(monitors.state_of(&key), None);

		monitors.dispatch(&key, Message::new(Start), &host).unwrap();
		assert_eq!(monitors.state_of(&key).as_deref(), Some("Busy"));
		assert_eq!(monitors.hot().len(), 1);
		assert_eq!(
			monitors.hot(),
			vec![HotMonitor {
				monitor: "Progress".to_string(),
				state: "Busy".to_string(),
			}]
		);

		monitors.dispatch(&key, Message::new(Done), &host).unwrap();
		assert!(monitors.hot().is_empty());
		let temperatures = host
			.entries
			.borrow()
			.iter()
			.filter(|entry| matches!(entry, TraceEntry::MonitorTemperature { .. }))
			.count();
		assert_eq!(temperatures, 2);
	}

	#[test]
	fn test_register_is_idempotent() {
		let host = RecordingHost::new(true);
		let monitors = MonitorSet::new();
		let key = MonitorKey::of::<Progress>();
		monitors.register(&key, &host).unwrap();
		monitors.dispatch(&key, Message::new(Start), &host).unwrap();
		monitors.register(&key, &host).unwrap();
		assert_eq!(monitors.state_of(&key).as_deref(), Some("Busy"));
	}

	#[test]
	fn test_monitor_cannot_send() {
		let host = RecordingHost::new(true);
		let monitors = MonitorSet::new();
		let err = monitors.dispatch(&MonitorKey::of::<Progress>(), Message::new(Chatty), &host).unwrap_err();
		assert!(matches!(err, Error::Usage(ref msg) if msg.contains("monitors cannot send")));
		assert_eq!(host.failures.borrow().len(), 1);
	}
}
