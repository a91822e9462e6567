// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! State-machine actors with two interchangeable runtimes.
//!
//! Actors are declared as [`Machine`]s and driven through the
//! [`ActorRuntime`] surface. [`SystematicRuntime`] serializes every actor and
//! task under a controlled scheduler so that a [`Strategy`] decides each
//! interleaving and random choice, which makes bugs reproducible from their
//! [`ScheduleTrace`]. [`ProductionRuntime`] runs the same machines on real
//! threads.

pub mod actor;
mod cache;
pub mod config;
pub mod event;
pub mod monitor;
pub mod production;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod systematic;
pub mod timer;
pub mod trace;

pub use actor::{
	context::{Context, Owner},
	machine::{Machine, MachineBuilder, StateBuilder, StateId, Temperature},
};
pub use config::{DropHandler, FailureHandler, RuntimeConfig};
pub use event::{Event, EventType, Halt, Message, Origin};
pub use monitor::{HotMonitor, Monitor, MonitorKey};
pub use production::{CancellationToken, ProductionRuntime};
pub use report::{BugKind, BugReport, ExecutionResult, Verdict};
pub use runtime::{ActorRuntime, TaskId};
pub use scheduler::{
	OperationStatus, SchedulingPoint,
	strategy::{
		CycleDetectionStrategy, PriorityStrategy, RandomStrategy, ReplayStrategy, RoundRobinStrategy, Step, Strategy,
		TemperatureCheckingStrategy,
	},
};
pub use systematic::SystematicRuntime;
pub use timer::{TimerElapsed, TimerHandle};
pub use trace::{ScheduleStep, ScheduleTrace, TraceEntry};
pub use weave_type::{ActorId, Error, Hash64, OperationGroupId, OperationId, Result};
