// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! # weave
//!
//! Applications are written as state-machine actors that exchange messages.
//! The same machines run under two runtimes:
//!
//! - [`ProductionRuntime`]: every actor on its own thread
//! - [`SystematicRuntime`]: one operation at a time, with every interleaving and
//!   random choice decided by a [`Strategy`] so that bugs can be replayed
//!
//! [`TestEngine`] runs a harness over many systematic executions and reports the
//! first assertion failure, unhandled event, deadlock or liveness violation it
//! finds, together with the [`ScheduleTrace`] that reproduces it.

pub use weave_runtime::*;
pub use weave_testing::{
	LivenessCheck, LogFormat, StrategyKind, TestConfiguration, TestEngine, TestFn, TestReport, init_logging,
	init_test_logging,
};
pub use weave_type::{StateHasher, usage_error};

/// Per-execution entry point of the systematic runtime.
pub use weave_runtime::systematic::execute;
