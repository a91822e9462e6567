// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Drives a test harness through many systematic executions.

use std::{fmt, sync::Arc, time::Instant};

use tracing::{debug, info, instrument, warn};
use weave_runtime::{
	BugReport, CycleDetectionStrategy, ExecutionResult, ReplayStrategy, ScheduleTrace, Strategy, SystematicRuntime,
	TemperatureCheckingStrategy, systematic,
};
use weave_type::Result;

use crate::config::{LivenessCheck, TestConfiguration};

/// A harness entry point; called once per iteration.
pub type TestFn = Arc<dyn Fn(SystematicRuntime) -> Result<()> + Send + Sync>;

/// Statistics of a run, plus the first bug found.
#[derive(Debug, Clone)]
pub struct TestReport {
	pub strategy: String,
	pub iterations: usize,
	pub bug: Option<BugReport>,
	/// Iteration (starting at 0) that found the bug.
	pub bug_iteration: Option<usize>,
	pub total_steps: usize,
	pub max_steps: usize,
	/// Executions that hit the step bound.
	pub bounded_iterations: usize,
	/// Sum of the distinct execution states of every iteration.
	pub distinct_states: usize,
	pub elapsed_ms: u128,
}

impl TestReport {
	pub fn found_bug(&self) -> bool {
		self.bug.is_some()
	}
}

impl fmt::Display for TestReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "strategy: {}", self.strategy)?;
		writeln!(f, "iterations: {}", self.iterations)?;
		writeln!(f, "steps: {} total, {} max", self.total_steps, self.max_steps)?;
		writeln!(f, "step bound reached: {} iterations", self.bounded_iterations)?;
		writeln!(f, "distinct states: {}", self.distinct_states)?;
		match (&self.bug, self.bug_iteration) {
			(Some(bug), Some(iteration)) => write!(f, "bug in iteration {}: {}", iteration, bug),
			(Some(bug), None) => write!(f, "bug: {}", bug),
			_ => write!(f, "no bug found"),
		}
	}
}

pub struct TestEngine {
	config: TestConfiguration,
	test: TestFn,
}

impl TestEngine {
	pub fn new<F>(config: TestConfiguration, test: F) -> Self
	where
		F: Fn(SystematicRuntime) -> Result<()> + Send + Sync + 'static,
	{
		Self {
			config,
			test: Arc::new(test),
		}
	}

	pub fn config(&self) -> &TestConfiguration {
		&self.config
	}

	/// Run up to `iterations` executions, stopping at the first bug.
	#[instrument(name = "engine::run", level = "debug", skip(self), fields(iterations = self.config.iterations))]
	pub fn run(&self) -> TestReport {
		let started = Instant::now();
		let runtime_config = self.config.runtime_config();
		let mut strategy = self.config.build_strategy();
		let mut report = TestReport {
			strategy: strategy.description(),
			iterations: 0,
			bug: None,
			bug_iteration: None,
			total_steps: 0,
			max_steps: 0,
			bounded_iterations: 0,
			distinct_states: 0,
			elapsed_ms: 0,
		};

		for iteration in 0..self.config.iterations {
			if !strategy.prepare_next_iteration() {
				debug!(iteration, "strategy exhausted");
				break;
			}
			let (result, returned) = systematic::execute(&runtime_config, strategy, self.harness());
			strategy = returned;

			report.iterations += 1;
			report.total_steps += result.steps;
			report.max_steps = report.max_steps.max(result.steps);
			report.distinct_states += result.distinct_states;
			if result.step_bound_reached {
				report.bounded_iterations += 1;
			}

			if let Some(bug) = result.verdict.bug() {
				warn!(iteration, kind = %bug.kind, message = %bug.message, "bug found");
				report.bug = Some(bug.clone());
				report.bug_iteration = Some(iteration);
				break;
			}
		}

		report.elapsed_ms = started.elapsed().as_millis();
		info!(
			iterations = report.iterations,
			steps = report.total_steps,
			bug = report.bug.is_some(),
			elapsed_ms = report.elapsed_ms as u64,
			"test run finished"
		);
		report
	}

	/// Re-run the harness following `trace` exactly.
	#[instrument(name = "engine::replay", level = "debug", skip_all, fields(steps = trace.len()))]
	pub fn replay(&self, trace: &ScheduleTrace) -> ExecutionResult {
		let replay = ReplayStrategy::new(trace.clone());
		let mut strategy: Box<dyn Strategy> = match self.config.liveness {
			LivenessCheck::None => Box::new(replay),
			LivenessCheck::CycleDetection => Box::new(CycleDetectionStrategy::new(replay)),
			LivenessCheck::Temperature {
				threshold,
			} => Box::new(TemperatureCheckingStrategy::new(replay, threshold)),
		};
		strategy.prepare_next_iteration();
		let (result, _) = systematic::execute(&self.config.runtime_config(), strategy, self.harness());
		result
	}

	fn harness(&self) -> impl FnOnce(SystematicRuntime) -> Result<()> + Send + 'static {
		let test = self.test.clone();
		move |runtime| test(runtime)
	}
}

#[cfg(test)]
mod tests {
	use weave_runtime::{ActorRuntime, BugKind, Verdict};

	use super::*;
	use crate::config::StrategyKind;

	#[test]
	fn test_no_bug() {
		let engine = TestEngine::new(TestConfiguration::new().iterations(10), |runtime| {
			let value = runtime.random_integer(4)?;
			runtime.assert(value < 4, "out of range")
		});
		let report = engine.run();
		assert!(!report.found_bug());
		assert_eq!(report.iterations, 10);
		assert!(report.total_steps > 0);
	}

	#[test]
	fn test_stops_at_first_bug_and_replays() {
		let engine = TestEngine::new(TestConfiguration::new().iterations(200).seed(7), |runtime| {
			let first = runtime.random_boolean()?;
			let second = runtime.random_boolean()?;
			runtime.assert(!(first && second), "both choices were true")
		});
		let report = engine.run();
		let bug = report.bug.clone().expect("a bug within 200 iterations");
		assert_eq!(bug.kind, BugKind::Assertion);
		assert_eq!(report.iterations, report.bug_iteration.unwrap() + 1);

		let replayed = engine.replay(&bug.schedule);
		match replayed.verdict {
			Verdict::BugFound(replayed) => {
				assert_eq!(replayed.kind, BugKind::Assertion);
				assert_eq!(replayed.schedule, bug.schedule);
			}
			Verdict::NoBugFound => panic!("replay did not reproduce the bug"),
		}
	}

	#[test]
	fn test_round_robin_runs_once() {
		let engine = TestEngine::new(
			TestConfiguration::new().iterations(5).strategy(StrategyKind::RoundRobin),
			|_| Ok(()),
		);
		let report = engine.run();
		assert_eq!(report.iterations, 1);
		assert_eq!(report.strategy, "round-robin");
	}
}
