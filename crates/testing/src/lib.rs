// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

pub mod config;
pub mod engine;
pub mod logging;

pub use config::{LivenessCheck, StrategyKind, TestConfiguration};
pub use engine::{TestEngine, TestFn, TestReport};
pub use logging::{LogFormat, init_logging, init_test_logging};
