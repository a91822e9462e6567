// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Systematic-testing runtime.
//!
//! Runs a test harness and every actor it creates under one
//! [`OperationScheduler`](crate::scheduler). All interleavings and
//! nondeterministic choices are decided by a [`Strategy`], which makes an
//! execution reproducible from its [`ScheduleTrace`](crate::trace::ScheduleTrace).
//!
//! ```ignore
//! let (result, _) = systematic::execute(&RuntimeConfig::default(), Box::new(RandomStrategy::new(0)), |runtime| {
//!     let server = runtime.create_actor(&server_machine()?, Server::default(), None)?;
//!     runtime.send_event(&server, Request)?;
//!     Ok(())
//! });
//! assert!(!result.verdict.is_bug());
//! ```

mod actor;
mod timer;

use std::{
	collections::BTreeMap,
	fmt,
	panic::{AssertUnwindSafe, catch_unwind},
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	thread::{self, JoinHandle},
	time::Duration,
};

use actor::ActorCell;
use parking_lot::Mutex;
use tracing::{debug, warn};
use weave_type::{ActorId, Error, OperationGroupId, OperationId, Result, usage_error};

use crate::{
	actor::{
		context::{CreateRequest, Host},
		mailbox::EnqueueStatus,
		core::MachineCore,
		machine::{Machine, StateId},
	},
	cache::{Snapshot, SnapshotBuilder},
	config::RuntimeConfig,
	event::{Event, EventType, Message, Origin},
	monitor::{Monitor, MonitorKey, MonitorSet},
	report::{BugKind, BugReport, ExecutionResult, Verdict},
	runtime::{ActorRuntime, TaskId, panic_message},
	scheduler::{
		OperationScheduler, OperationStatus, SchedulingPoint,
		strategy::{RoundRobinStrategy, Strategy},
	},
	timer::TimerHandle,
	trace::TraceEntry,
};

enum Binding {
	/// Allocated by `create_actor_id`, not bound yet.
	Reserved(ActorId),
	Live(Arc<ActorCell>),
	Halted(ActorId),
}

pub(crate) struct Shared {
	config: RuntimeConfig,
	scheduler: OperationScheduler,
	actors: Mutex<BTreeMap<u64, Binding>>,
	monitors: MonitorSet,
	log: Mutex<Vec<TraceEntry>>,
	next_actor: AtomicU64,
	next_sequence: AtomicU64,
	threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
	fn new(config: RuntimeConfig, strategy: Box<dyn Strategy>) -> Self {
		Self {
			scheduler: OperationScheduler::new(strategy, config.max_steps),
			config,
			actors: Mutex::new(BTreeMap::new()),
			monitors: MonitorSet::new(),
			log: Mutex::new(Vec::new()),
			next_actor: AtomicU64::new(1),
			next_sequence: AtomicU64::new(0),
			threads: Mutex::new(Vec::new()),
		}
	}

	fn snapshot(&self) -> Snapshot {
		let mut builder = SnapshotBuilder::new();
		for (value, binding) in self.actors.lock().iter() {
			if let Binding::Live(cell) = binding {
				let fingerprint = cell.summary.lock().fingerprint;
				let mailbox = cell.mailbox.lock();
				builder.actor(*value, fingerprint, mailbox.queued_types());
			}
		}
		self.monitors.fingerprint(builder.hasher());
		builder.finish(self.monitors.hot())
	}

	/// A scheduling point of `operation`.
	pub(crate) fn schedule(&self, operation: OperationId, point: SchedulingPoint) -> Result<()> {
		if self.scheduler.is_terminated() {
			return Err(Error::Canceled);
		}
		self.scheduler.schedule_next(operation, point, self.snapshot())
	}

	pub(crate) fn record(&self, entry: TraceEntry) {
		if self.config.record_log {
			self.log.lock().push(entry);
		}
	}

	fn fail(&self, error: Error) -> Error {
		self.scheduler.report_bug(&error);
		error
	}

	fn allocate(&self, actor_type: &str) -> ActorId {
		ActorId::new(self.next_actor.fetch_add(1, Ordering::Relaxed), actor_type)
	}

	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		let id = self.allocate(actor_type);
		self.actors.lock().insert(id.value(), Binding::Reserved(id.clone()));
		id
	}

	fn create(
		self: &Arc<Self>,
		operation: OperationId,
		creator: Option<&ActorId>,
		request: CreateRequest,
		group: Option<OperationGroupId>,
	) -> Result<ActorId> {
		// the scheduling point comes before the actor exists
		self.schedule(operation, SchedulingPoint::Create)?;
		let machine = request.instance.machine_name();

		let mut actors = self.actors.lock();
		let bound = match request.id {
			None => Ok(self.allocate(&machine)),
			Some(id) => match actors.get(&id.value()) {
				Some(Binding::Reserved(reserved)) if *reserved == id => Ok(id),
				Some(Binding::Reserved(reserved)) => Err(usage_error!("{} was reserved as {}", id, reserved)),
				Some(_) => Err(usage_error!("{} is already bound", id)),
				None => Err(usage_error!("{} was not created by this runtime", id)),
			},
		};
		let id = match bound {
			Ok(id) if id.actor_type() == &*machine => id,
			Ok(id) => return Err(self.fail(usage_error!("{} cannot be bound to a {} machine", id, machine))),
			Err(error) => return Err(self.fail(error)),
		};

		let actor_operation = self.scheduler.register(id.to_string())?;
		let cell = Arc::new(ActorCell::new(id.clone(), actor_operation));
		actors.insert(id.value(), Binding::Live(cell.clone()));
		drop(actors);

		debug!(actor = %id, creator = ?creator, "created");
		self.record(TraceEntry::Created {
			actor: id.clone(),
			creator: creator.cloned(),
		});
		let handle = actor::spawn(self.clone(), cell, request.instance, request.initial, group)?;
		self.threads.lock().push(handle);

		if request.execute {
			self.scheduler.set_status(operation, OperationStatus::Quiescence(actor_operation));
			self.schedule(operation, SchedulingPoint::Join)?;
		}
		Ok(id)
	}

	fn send(
		&self,
		operation: OperationId,
		origin: Option<Origin>,
		target: &ActorId,
		mut message: Message,
		group: Option<OperationGroupId>,
		execute: bool,
	) -> Result<()> {
		// the target is resolved after the scheduling point, it may have halted meanwhile
		self.schedule(operation, SchedulingPoint::Send)?;
		let cell = match self.actors.lock().get(&target.value()) {
			Some(Binding::Live(cell)) if cell.id == *target => Some(cell.clone()),
			Some(Binding::Halted(halted)) if halted == target => None,
			Some(Binding::Reserved(_)) => return Err(self.fail(usage_error!("cannot send to {} before it is bound", target))),
			_ => return Err(self.fail(usage_error!("cannot send to unknown actor {}", target))),
		};

		let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
		let sender = origin.as_ref().map(|origin| origin.sender.clone());
		let sender_state = origin.as_ref().map(|origin| origin.state.clone());
		message.stamp(origin, sequence, group);
		debug!(sender = ?sender, target = %target, event = %message.event_type(), sequence, "sent");
		self.record(TraceEntry::Sent {
			sender,
			sender_state,
			target: target.clone(),
			event: message.event_type().name().to_string(),
			sequence,
		});

		let mut quiescence = None;
		match cell {
			None => self.dropped(target, message),
			Some(cell) => {
				quiescence = Some(cell.operation);
				let status = cell.mailbox.lock().enqueue(message);
				match status {
					EnqueueStatus::Dropped(message) => self.dropped(target, message),
					EnqueueStatus::EventHandlerNotRunning => {
						self.scheduler.enable(cell.operation)
					}
					_ => {}
				}
			}
		}

		match (execute, quiescence) {
			(true, Some(target_operation)) => {
				self.scheduler.set_status(operation, OperationStatus::Quiescence(target_operation));
				self.schedule(operation, SchedulingPoint::Join)
			}
			_ => Ok(()),
		}
	}

	fn dropped(&self, target: &ActorId, message: Message) {
		debug!(target = %target, event = %message.event_type(), "dropped");
		self.record(TraceEntry::Dropped {
			target: target.clone(),
			event: message.event_type().name().to_string(),
			sequence: message.sequence(),
		});
		if let Some(handler) = &self.config.drop_handler {
			handler(target, &message);
		}
	}

	fn retire(&self, id: &ActorId) {
		self.actors.lock().insert(id.value(), Binding::Halted(id.clone()));
	}

	fn live(&self, id: &ActorId) -> Option<Arc<ActorCell>> {
		match self.actors.lock().get(&id.value()) {
			Some(Binding::Live(cell)) => Some(cell.clone()),
			_ => None,
		}
	}

	fn spawn_operation<F>(self: &Arc<Self>, name: &str, body: F) -> Result<OperationId>
	where
		F: FnOnce(OperationId) -> Result<()> + Send + 'static,
	{
		let operation = self.scheduler.register(name)?;
		let label = name.to_string();
		let shared = self.clone();
		let handle = thread::Builder::new()
			.name(format!("weave-{}", name))
			.spawn(move || {
				let result = shared.scheduler.wait_for_turn(operation).and_then(|_| {
					catch_unwind(AssertUnwindSafe(|| body(operation))).unwrap_or_else(|payload| {
						Err(Error::Panicked {
							operation: format!("{} {}", label, operation),
							message: panic_message(payload.as_ref()),
						})
					})
				});
				if let Err(error) = result {
					shared.scheduler.report_bug(&error);
				}
				shared.scheduler.complete(operation);
			})
			.map_err(|e| Error::Internal(format!("failed to spawn operation thread: {}", e)))?;
		self.threads.lock().push(handle);
		Ok(operation)
	}

	fn join_threads(&self) {
		loop {
			let handles = std::mem::take(&mut *self.threads.lock());
			if handles.is_empty() {
				break;
			}
			for handle in handles {
				if handle.join().is_err() {
					warn!("operation thread panicked outside of the scheduler");
				}
			}
		}
	}
}

/// Runtime services of one operation: the harness, a task or an actor.
pub(crate) struct OperationHost {
	shared: Arc<Shared>,
	operation: OperationId,
	actor: Option<Arc<ActorCell>>,
	group: Mutex<Option<OperationGroupId>>,
}

impl OperationHost {
	fn new(
		shared: Arc<Shared>,
		operation: OperationId,
		actor: Option<Arc<ActorCell>>,
		group: Option<OperationGroupId>,
	) -> Self {
		Self {
			shared,
			operation,
			actor,
			group: Mutex::new(group),
		}
	}
}

impl Host for OperationHost {
	fn send(&self, origin: Option<Origin>, target: &ActorId, message: Message) -> Result<()> {
		self.shared.send(self.operation, origin, target, message, *self.group.lock(), false)
	}

	fn create(&self, creator: Option<&ActorId>, request: CreateRequest) -> Result<ActorId> {
		self.shared.create(self.operation, creator, request, *self.group.lock())
	}

	fn create_actor_id(&self, actor_type: &str) -> ActorId {
		self.shared.create_actor_id(actor_type)
	}

	fn monitor(&self, key: &MonitorKey, message: Message) -> Result<()> {
		if self.shared.scheduler.is_terminated() {
			return Err(Error::Canceled);
		}
		self.shared.monitors.dispatch(key, message, self)
	}

	fn random_boolean(&self, max_value: u64) -> Result<bool> {
		self.shared.schedule(self.operation, SchedulingPoint::Choice)?;
		let value = self.shared.scheduler.next_boolean(self.operation, max_value)?;
		self.shared.record(TraceEntry::RandomBoolean {
			operation: self.operation,
			value,
		});
		Ok(value)
	}

	fn random_integer(&self, max_value: u64) -> Result<u64> {
		self.shared.schedule(self.operation, SchedulingPoint::Choice)?;
		let value = self.shared.scheduler.next_integer(self.operation, max_value)?;
		self.shared.record(TraceEntry::RandomInteger {
			operation: self.operation,
			value,
		});
		Ok(value)
	}

	fn receive(&self, types: &[EventType]) -> Result<Message> {
		match &self.actor {
			Some(cell) => actor::receive(&self.shared, cell, self, types),
			None => Err(self.shared.fail(usage_error!("only actors can receive events"))),
		}
	}

	fn start_timer(&self, owner: &ActorId, due: Duration, period: Option<Duration>) -> Result<TimerHandle> {
		let handle = TimerHandle::new(owner.clone(), due, period);
		if let Some(cell) = self.shared.live(owner) {
			cell.timers.lock().push(handle.clone());
		}
		timer::start(self, &handle)?;
		Ok(handle)
	}

	fn stop_timer(&self, handle: &TimerHandle) -> Result<()> {
		if handle.cancel() {
			debug!(timer = handle.id(), owner = %handle.owner(), "timer stopped");
		}
		Ok(())
	}

	fn operation_group(&self) -> Option<OperationGroupId> {
		*self.group.lock()
	}

	fn set_operation_group(&self, group: Option<OperationGroupId>) {
		*self.group.lock() = group;
	}

	fn record(&self, entry: TraceEntry) {
		self.shared.record(entry)
	}

	fn fail(&self, error: &Error) {
		self.shared.scheduler.report_bug(error)
	}

	fn strict(&self) -> bool {
		self.shared.config.strict_transitions
	}
}

/// Handle through which a harness or task drives the systematic runtime.
#[derive(Clone)]
pub struct SystematicRuntime {
	host: Arc<OperationHost>,
}

impl SystematicRuntime {
	fn shared(&self) -> &Arc<Shared> {
		&self.host.shared
	}

	/// The operation this handle belongs to.
	pub fn operation(&self) -> OperationId {
		self.host.operation
	}

	pub fn operation_group(&self) -> Option<OperationGroupId> {
		self.host.operation_group()
	}

	/// Messages sent through this handle carry `group`.
	pub fn set_operation_group(&self, group: Option<OperationGroupId>) {
		self.host.set_operation_group(group)
	}

	/// Current state of the monitor `M`, if it has been created.
	pub fn monitor_state<M: Monitor>(&self) -> Option<String> {
		self.shared().monitors.state_of(&MonitorKey::of::<M>())
	}

	fn instantiate<D, S>(&self, machine: &Machine<D, S>, data: D, id: Option<ActorId>, initial: Option<Message>, execute: bool) -> Result<ActorId>
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

	fn operations(&self, tasks: &[TaskId]) -> Vec<OperationId> {
		tasks.iter().map(|task| OperationId(task.0)).collect()
	}
}

impl fmt::Debug for SystematicRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SystematicRuntime").field("operation", &self.host.operation).finish()
	}
}

impl ActorRuntime for SystematicRuntime {
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
		self.shared().send(self.host.operation, None, target, Message::new(event), self.operation_group(), false)
	}

	fn send_event_and_execute<E: Event>(&self, target: &ActorId, event: E) -> Result<()> {
		self.shared().send(self.host.operation, None, target, Message::new(event), self.operation_group(), true)
	}

	fn register_monitor<M: Monitor>(&self) -> Result<()> {
		self.shared().monitors.register(&MonitorKey::of::<M>(), self.host.as_ref())
	}

	fn monitor<M: Monitor, E: Event>(&self, event: E) -> Result<()> {
		self.host.monitor(&MonitorKey::of::<M>(), Message::new(event))
	}

	fn random_boolean(&self) -> Result<bool> {
		self.host.random_boolean(2)
	}

	fn random_integer(&self, max_value: u64) -> Result<u64> {
		if max_value == 0 {
			return Err(self.shared().fail(usage_error!("random integer bound must be positive")));
		}
		self.host.random_integer(max_value)
	}

	fn assert(&self, predicate: bool, message: impl fmt::Display) -> Result<()> {
		if predicate {
			Ok(())
		} else {
			Err(self.shared().fail(Error::Assertion(message.to_string())))
		}
	}

	fn spawn_task<F>(&self, task: F) -> Result<TaskId>
	where
		F: FnOnce(Self) -> Result<()> + Send + 'static,
	{
		let shared = self.shared().clone();
		let group = self.operation_group();
		let operation = self.shared().spawn_operation("task", move |operation| {
			let runtime = SystematicRuntime {
				host: Arc::new(OperationHost::new(shared, operation, None, group)),
			};
			task(runtime)
		})?;
		debug!(task = %operation, parent = %self.host.operation, "task spawned");
		self.shared().schedule(self.host.operation, SchedulingPoint::Create)?;
		Ok(TaskId(operation.0))
	}

	fn wait_all(&self, tasks: &[TaskId]) -> Result<()> {
		self.shared().scheduler.set_status(self.host.operation, OperationStatus::WaitAll(self.operations(tasks)));
		self.shared().schedule(self.host.operation, SchedulingPoint::Join)
	}

	fn wait_any(&self, tasks: &[TaskId]) -> Result<TaskId> {
		if tasks.is_empty() {
			return Err(self.shared().fail(usage_error!("wait_any needs at least one task")));
		}
		let operations = self.operations(tasks);
		self.shared().scheduler.set_status(self.host.operation, OperationStatus::WaitAny(operations.clone()));
		self.shared().schedule(self.host.operation, SchedulingPoint::Join)?;
		operations
			.into_iter()
			.find(|operation| self.shared().scheduler.status(*operation).is_none_or(|s| s == OperationStatus::Completed))
			.map(|operation| TaskId(operation.0))
			.ok_or_else(|| Error::Internal("woken from wait_any without a completed task".to_string()))
	}
}

/// Run `test` once as the harness operation under `strategy`.
///
/// The strategy is handed back so that it can carry state across iterations.
pub fn execute<F>(config: &RuntimeConfig, strategy: Box<dyn Strategy>, test: F) -> (ExecutionResult, Box<dyn Strategy>)
where
	F: FnOnce(SystematicRuntime) -> Result<()> + Send + 'static,
{
	let shared = Arc::new(Shared::new(config.clone(), strategy));
	let runtime = SystematicRuntime {
		host: Arc::new(OperationHost::new(shared.clone(), OperationId::HARNESS, None, None)),
	};

	let harness = {
		let shared = shared.clone();
		thread::Builder::new().name("weave-harness".to_string()).spawn(move || {
			let result = shared.scheduler.wait_for_turn(OperationId::HARNESS).and_then(|_| {
				catch_unwind(AssertUnwindSafe(|| test(runtime))).unwrap_or_else(|payload| {
					Err(Error::Panicked {
						operation: "harness".to_string(),
						message: panic_message(payload.as_ref()),
					})
				})
			});
			if let Err(error) = result {
				shared.scheduler.report_bug(&error);
			}
			shared.scheduler.complete(OperationId::HARNESS);
		})
	};
	match harness {
		Ok(handle) => shared.threads.lock().push(handle),
		Err(e) => {
			shared.scheduler.report_bug(&Error::Internal(format!("failed to spawn harness thread: {}", e)));
		}
	}

	shared.scheduler.wait_for_termination();
	shared.join_threads();

	let mut outcome = shared.scheduler.outcome();
	if outcome.bug.is_none() && !outcome.step_bound_reached {
		let hot = shared.monitors.hot();
		if !hot.is_empty() {
			let message = hot.iter().map(|monitor| monitor.to_string()).collect::<Vec<_>>().join(", ");
			outcome.bug = Some(Error::Liveness(format!("{} at the end of the execution", message)));
		}
	}

	let log = std::mem::take(&mut *shared.log.lock());
	let verdict = match outcome.bug {
		Some(error) => {
			if let Some(handler) = &config.failure_handler {
				handler(&error);
			}
			let kind = BugKind::classify(&error).unwrap_or(BugKind::Usage);
			debug!(kind = %kind, error = %error, steps = outcome.steps, "execution found a bug");
			Verdict::BugFound(BugReport {
				kind,
				message: error.to_string(),
				schedule: outcome.schedule.clone(),
				log: log.clone(),
			})
		}
		None => Verdict::NoBugFound,
	};

	let strategy = shared.scheduler.take_strategy(Box::new(RoundRobinStrategy::new()));
	let result = ExecutionResult {
		verdict,
		schedule: outcome.schedule,
		log,
		steps: outcome.steps,
		step_bound_reached: outcome.step_bound_reached,
		distinct_states: outcome.distinct_states,
	};
	(result, strategy)
}
