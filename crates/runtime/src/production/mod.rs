// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Production runtime.
//!
//! Every actor runs on its own OS thread and blocks on its mailbox. The live
//! actor table is a `DashMap`; monitors, when enabled, share one lock. The
//! first failure is kept and reported to the configured failure handler.

mod actor;
mod timer;

use std::{
	fmt,
	panic::{AssertUnwindSafe, catch_unwind},
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	thread::{self, JoinHandle},
	time::Duration,
};

use actor::ActorCell;
use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, bounded};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, error, trace};
use weave_type::{ActorId, Error, OperationGroupId, Result, usage_error};

use crate::{
	actor::{
		context::{CreateRequest, Host},
		core::MachineCore,
		machine::{Machine, StateId},
	},
	config::RuntimeConfig,
	event::{Event, EventType, Message, Origin},
	monitor::{Monitor, MonitorKey, MonitorSet},
	runtime::{ActorRuntime, TaskId, panic_message},
	timer::TimerHandle,
	trace::TraceEntry,
};

/// A cancellation token for signaling shutdown.
///
/// This is a simple atomic boolean shared by every actor, task and timer
/// thread of one runtime.
#[derive(Clone)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Signal cancellation.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::new()
	}
}

enum Binding {
	Reserved(ActorId),
	Live(Arc<ActorCell>),
	Halted(ActorId),
}

enum Target {
	Live(Arc<ActorCell>),
	Halted,
	Reserved,
	Unknown,
}

pub(crate) struct Shared {
	config: RuntimeConfig,
	actors: DashMap<u64, Binding>,
	monitors: Option<MonitorSet>,
	next_actor: AtomicU64,
	next_sequence: AtomicU64,
	next_task: AtomicU64,
	tasks: DashMap<u64, Receiver<()>>,
	failure: Mutex<Option<Error>>,
	cancel: CancellationToken,
	threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
	fn new(config: RuntimeConfig) -> Self {
		Self {
			monitors: config.monitors.then(MonitorSet::new),
			config,
			actors: DashMap::new(),
			next_actor: AtomicU64::new(1),
			next_sequence: AtomicU64::new(0),
			next_task: AtomicU64::new(1),
			tasks: DashMap::new(),
			failure: Mutex::new(None),
			cancel: CancellationToken::new(),
			threads: Mutex::new(Vec::new()),
		}
	}

	/// Record `error`; the first one is handed to the failure handler.
	fn fail(&self, error: &Error) {
		let first = {
			let mut failure = self.failure.lock();
			if failure.is_none() {
				*failure = Some(error.clone());
				true
			} else {
				false
			}
		};
		error!(error = %error, first, "actor runtime failure");
		if first {
			if let Some(handler) = &self.config.failure_handler {
				handler(error);
			}
		}
	}

	fn failed(&self, error: Error) -> Error {
		self.fail(&error);
		error
	}

	fn track(&self, handle: JoinHandle<()>) {
		let mut threads = self.threads.lock();
		threads.retain(|thread| !thread.is_finished());
		threads.push(handle);
	}

	fn allocate(&self, actor_type: &str) -> ActorId {
		ActorId::new(self.next_actor.fetch_add(1, Ordering::Relaxed), actor_type)
	}

	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		let id = self.allocate(actor_type);
		self.actors.insert(id.value(), Binding::Reserved(id.clone()));
		id
	}

	fn create(
		self: &Arc<Self>,
		creator: Option<&ActorId>,
		request: CreateRequest,
		group: Option<OperationGroupId>,
	) -> Result<ActorId> {
		if self.cancel.is_cancelled() {
			return Err(Error::Canceled);
		}
		let machine = request.instance.machine_name();
		let bound = match request.id {
			None => Ok(self.allocate(&machine)),
			Some(id) => match self.actors.get(&id.value()).as_deref() {
				Some(Binding::Reserved(reserved)) if *reserved == id => Ok(id),
				Some(Binding::Reserved(reserved)) => Err(usage_error!("{} was reserved as {}", id, reserved)),
				Some(_) => Err(usage_error!("{} is already bound", id)),
				None => Err(usage_error!("{} was not created by this runtime", id)),
			},
		};
		let id = match bound {
			Ok(id) if id.actor_type() == &*machine => id,
			Ok(id) => return Err(self.failed(usage_error!("{} cannot be bound to a {} machine", id, machine))),
			Err(error) => return Err(self.failed(error)),
		};

		let cell = Arc::new(ActorCell::new(id.clone()));
		let quiescent = request.execute.then(|| {
			let (waiter, quiescent) = bounded(1);
			cell.await_quiescence(waiter);
			quiescent
		});
		self.actors.insert(id.value(), Binding::Live(cell.clone()));
		debug!(actor = %id, creator = ?creator, "created");
		trace!(entry = ?TraceEntry::Created { actor: id.clone(), creator: creator.cloned() }, "execution log");

		let handle = actor::spawn(self.clone(), cell, request.instance, request.initial, group)?;
		self.track(handle);
		if let Some(quiescent) = quiescent {
			let _ = quiescent.recv();
		}
		Ok(id)
	}

	/// Send `message`; returns whether it reached a live mailbox.
	fn deliver(
		&self,
		origin: Option<Origin>,
		target: &ActorId,
		mut message: Message,
		group: Option<OperationGroupId>,
		waiter: Option<Sender<()>>,
	) -> Result<bool> {
		let resolved = match self.actors.get(&target.value()).as_deref() {
			Some(Binding::Live(cell)) if cell.id == *target => Target::Live(cell.clone()),
			Some(Binding::Halted(halted)) if halted == target => Target::Halted,
			Some(Binding::Reserved(_)) => Target::Reserved,
			_ => Target::Unknown,
		};

		let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
		message.stamp(origin, sequence, group);
		trace!(target = %target, event = %message.event_type(), sequence, "sent");

		match resolved {
			Target::Live(cell) => match cell.enqueue(message, waiter) {
				Some(message) => {
					self.dropped(target, message);
					Ok(false)
				}
				None => Ok(true),
			},
			Target::Halted => {
				self.dropped(target, message);
				Ok(false)
			}
			Target::Reserved => Err(self.failed(usage_error!("cannot send to {} before it is bound", target))),
			Target::Unknown => Err(self.failed(usage_error!("cannot send to unknown actor {}", target))),
		}
	}

	fn dropped(&self, target: &ActorId, message: Message) {
		debug!(target = %target, event = %message.event_type(), sequence = ?message.sequence(), "dropped");
		if let Some(handler) = &self.config.drop_handler {
			handler(target, &message);
		}
	}

	fn retire(&self, id: &ActorId) {
		self.actors.insert(id.value(), Binding::Halted(id.clone()));
	}

	fn live(&self, id: &ActorId) -> Option<Arc<ActorCell>> {
		match self.actors.get(&id.value()).as_deref() {
			Some(Binding::Live(cell)) => Some(cell.clone()),
			_ => None,
		}
	}

	/// Completion signal of a running task, `None` once it finished and was
	/// removed. Task ids are never reused.
	fn task(&self, task: &TaskId) -> Result<Option<Receiver<()>>> {
		if let Some(done) = self.tasks.get(&task.0) {
			return Ok(Some(done.value().clone()));
		}
		if task.0 >= 1 && task.0 < self.next_task.load(Ordering::Relaxed) {
			return Ok(None);
		}
		Err(self.failed(usage_error!("unknown task {}", task)))
	}

	fn joined(&self, task: &TaskId) {
		self.tasks.remove(&task.0);
	}

	/// Forget tasks whose thread is gone, joined or not.
	fn prune_tasks(&self) {
		self.tasks.retain(|_, done| !matches!(done.try_recv(), Err(TryRecvError::Disconnected)));
	}
}

/// Runtime services of one thread: a harness, a task or an actor.
pub(crate) struct ProductionHost {
	shared: Arc<Shared>,
	actor: Option<Arc<ActorCell>>,
	group: Mutex<Option<OperationGroupId>>,
}

impl ProductionHost {
	fn new(shared: Arc<Shared>, actor: Option<Arc<ActorCell>>, group: Option<OperationGroupId>) -> Self {
		Self {
			shared,
			actor,
			group: Mutex::new(group),
		}
	}
}

impl Host for ProductionHost {
	fn send(&self, origin: Option<Origin>, target: &ActorId, message: Message) -> Result<()> {
		self.shared.deliver(origin, target, message, *self.group.lock(), None).map(|_| ())
	}

	fn create(&self, creator: Option<&ActorId>, request: CreateRequest) -> Result<ActorId> {
		self.shared.create(creator, request, *self.group.lock())
	}

	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		self.shared.create_actor_id(actor_type)
	}

	fn monitor(&self, key: &MonitorKey, message: Message) -> Result<()> {
		match &self.shared.monitors {
			Some(monitors) => monitors.dispatch(key, message, self),
			None => Ok(()),
		}
	}

	fn random_boolean(&self, max_value: u64) -> Result<bool> {
		if max_value == 0 {
			return Err(self.shared.failed(usage_error!("random boolean bound must be positive")));
		}
		Ok(rand::rng().random_range(0..max_value) == 0)
	}

	fn random_integer(&self, max_value: u64) -> Result<u64> {
		if max_value == 0 {
			return Err(self.shared.failed(usage_error!("random integer bound must be positive")));
		}
		Ok(rand::rng().random_range(0..max_value))
	}

	fn receive(&self, types: &[EventType]) -> Result<Message> {
		match &self.actor {
			Some(cell) => {
				let message = actor::receive(&self.shared, cell, types)?;
				self.record(TraceEntry::Dequeued {
					actor: cell.id.clone(),
					state: cell.state(),
					event: message.event_type().name().to_string(),
					sequence: message.sequence(),
				});
				if let Some(group) = message.group() {
					self.set_operation_group(Some(group));
				}
				Ok(message)
			}
			None => Err(self.shared.failed(usage_error!("only actors can receive events"))),
		}
	}

	fn start_timer(&self, owner: &ActorId, due: Duration, period: Option<Duration>) -> Result<TimerHandle> {
		let handle = TimerHandle::new(owner.clone(), due, period);
		if let Some(cell) = self.shared.live(owner) {
			cell.timers.lock().push(handle.clone());
		}
		timer::start(self.shared.clone(), handle.clone())?;
		debug!(timer = handle.id(), owner = %owner, due = ?due, period = ?period, "timer started");
		Ok(handle)
	}

	fn stop_timer(&self, handle: &TimerHandle) -> Result<()> {
		handle.cancel();
		Ok(())
	}

	fn operation_group(&self) -> Option<OperationGroupId> {
		*self.group.lock()
	}

	fn set_operation_group(&self, group: Option<OperationGroupId>) {
		*self.group.lock() = group;
	}

	fn record(&self, entry: TraceEntry) {
		trace!(entry = ?entry, "execution log");
	}

	fn fail(&self, error: &Error) {
		self.shared.fail(error)
	}

	fn strict(&self) -> bool {
		self.shared.config.strict_transitions
	}
}

/// Handle to a running production runtime.
///
/// ```ignore
/// let runtime = ProductionRuntime::new(RuntimeConfig::production());
/// let server = runtime.create_actor(&server_machine()?, Server::default(), None)?;
/// runtime.send_event_and_execute(&server, Request)?;
/// runtime.shutdown();
/// ```
#[derive(Clone)]
pub struct ProductionRuntime {
	host: Arc<ProductionHost>,
}

impl ProductionRuntime {
	pub fn new(config: RuntimeConfig) -> Self {
		let shared = Arc::new(Shared::new(config));
		Self {
			host: Arc::new(ProductionHost::new(shared, None, None)),
		}
	}

	fn shared(&self) -> &Arc<Shared> {
		&self.host.shared
	}

	/// The first failure of this runtime, if any.
	pub fn failure(&self) -> Option<Error> {
		self.shared().failure.lock().clone()
	}

	pub fn cancellation_token(&self) -> CancellationToken {
		self.shared().cancel.clone()
	}

	pub fn operation_group(&self) -> Option<OperationGroupId> {
		self.host.operation_group()
	}

	pub fn set_operation_group(&self, group: Option<OperationGroupId>) {
		self.host.set_operation_group(group)
	}

	/// Current state of the monitor `M`, if monitors are enabled and it exists.
	pub fn monitor_state<M: Monitor>(&self) -> Option<String> {
		self.shared().monitors.as_ref().and_then(|monitors| monitors.state_of(&MonitorKey::of::<M>()))
	}

	/// Whether the actor was created and has not halted.
	pub fn is_live(&self, id: &ActorId) -> bool {
		self.shared().live(id).is_some()
	}

	/// Stop every actor, task and timer thread and wait for them.
	pub fn shutdown(&self) {
		self.shared().cancel.cancel();
		let current = thread::current().id();
		loop {
			let handles = std::mem::take(&mut *self.shared().threads.lock());
			if handles.is_empty() {
				break;
			}
			for handle in handles {
				if handle.thread().id() != current && handle.join().is_err() {
					error!("actor thread panicked outside of its handler");
				}
			}
		}
		debug!("production runtime stopped");
	}

	fn instantiate<D, S>(
		&self,
		machine: &Machine<D, S>,
		data: D,
		id: Option<ActorId>,
		initial: Option<Message>,
		execute: bool,
	) -> Result<ActorId>
	where
		D: Send + 'static,
		S: StateId,
	{
		self.host.create(
			None,
			CreateRequest {
				instance: Box::new(MachineCore::new(machine.clone(), data)),
				id,
				initial,
				execute,
			},
		)
	}
}

impl fmt::Debug for ProductionRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProductionRuntime")
			.field("actors", &self.shared().actors.len())
			.field("cancelled", &self.shared().cancel.is_cancelled())
			.finish()
	}
}

impl ActorRuntime for ProductionRuntime {
	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		self.host.create_actor_id(actor_type)
	}

	fn create_actor<D, S>(&self, machine: &Machine<D, S>, data: D, initial: Option<Message>) -> Result<ActorId>
	where
		D: Send + 'static,
		S: StateId,
	{
		self.instantiate(machine, data, None, initial, false)
	}

	fn create_actor_with_id<D, S>(&self, id: ActorId, machine: &Machine<D, S>, data: D, initial: Option<Message>) -> Result<()>
	where
		D: Send + 'static,
		S: StateId,
	{
		self.instantiate(machine, data, Some(id), initial, false).map(|_| ())
	}

	fn create_actor_and_execute<D, S>(&self, machine: &Machine<D, S>, data: D, initial: Option<Message>) -> Result<ActorId>
	where
		D: Send + 'static,
		S: StateId,
	{
		self.instantiate(machine, data, None, initial, true)
	}

	fn send_event<E: Event>(&self, target: &ActorId, event: E) -> Result<()> {
		self.shared().deliver(None, target, Message::new(event), self.operation_group(), None).map(|_| ())
	}

	fn send_event_and_execute<E: Event>(&self, target: &ActorId, event: E) -> Result<()> {
		let (waiter, quiescent) = bounded(1);
		self.shared().deliver(None, target, Message::new(event), self.operation_group(), Some(waiter))?;
		let _ = quiescent.recv();
		Ok(())
	}

	fn register_monitor<M: Monitor>(&self) -> Result<()> {
		match &self.shared().monitors {
			Some(monitors) => monitors.register(&MonitorKey::of::<M>(), self.host.as_ref()),
			None => Ok(()),
		}
	}

	fn monitor<M: Monitor, E: Event>(&self, event: E) -> Result<()> {
		self.host.monitor(&MonitorKey::of::<M>(), Message::new(event))
	}

	fn random_boolean(&self) -> Result<bool> {
		self.host.random_boolean(2)
	}

	fn random_integer(&self, max_value: u64) -> Result<u64> {
		self.host.random_integer(max_value)
	}

	fn assert(&self, predicate: bool, message: impl fmt::Display) -> Result<()> {
		if predicate {
			Ok(())
		} else {
			Err(self.shared().failed(Error::Assertion(message.to_string())))
		}
	}

	fn spawn_task<F>(&self, task: F) -> Result<TaskId>
	where
		F: FnOnce(Self) -> Result<()> + Send + 'static,
	{
		self.shared().prune_tasks();
		let id = TaskId(self.shared().next_task.fetch_add(1, Ordering::Relaxed));
		let (done, finished) = bounded::<()>(0);
		self.shared().tasks.insert(id.0, finished);

		let shared = self.shared().clone();
		let runtime = ProductionRuntime {
			host: Arc::new(ProductionHost::new(shared.clone(), None, self.operation_group())),
		};
		let handle = thread::Builder::new()
			.name(format!("weave-{}", id))
			.spawn(move || {
				// dropping the sender marks the task completed
				let _done = done;
				let result = catch_unwind(AssertUnwindSafe(|| task(runtime))).unwrap_or_else(|payload| {
					Err(Error::Panicked {
						operation: id.to_string(),
						message: panic_message(payload.as_ref()),
					})
				});
				if let Err(error) = result {
					if !error.is_canceled() {
						shared.fail(&error);
					}
				}
			})
			.map_err(|e| Error::Internal(format!("failed to spawn task thread: {}", e)))?;
		self.shared().track(handle);
		debug!(task = %id, "task spawned");
		Ok(id)
	}

	fn wait_all(&self, tasks: &[TaskId]) -> Result<()> {
		for task in tasks {
			if let Some(done) = self.shared().task(task)? {
				let _ = done.recv();
				self.shared().joined(task);
			}
		}
		Ok(())
	}

	fn wait_any(&self, tasks: &[TaskId]) -> Result<TaskId> {
		if tasks.is_empty() {
			return Err(self.shared().failed(usage_error!("wait_any needs at least one task")));
		}
		let mut receivers = Vec::with_capacity(tasks.len());
		for task in tasks {
			match self.shared().task(task)? {
				Some(done) => receivers.push(done),
				None => return Ok(*task),
			}
		}
		let mut select = Select::new();
		for receiver in &receivers {
			select.recv(receiver);
		}
		let operation = select.select();
		let index = operation.index();
		let _ = operation.recv(&receivers[index]);
		self.shared().joined(&tasks[index]);
		Ok(tasks[index])
	}
}
