// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use weave::{
	ActorRuntime, BugKind, LivenessCheck, Machine, Monitor, Result, TestConfiguration, TestEngine,
	init_test_logging,
};

#[derive(Debug)]
struct Start;

#[derive(Debug)]
struct Finish;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProgressState {
	Idle,
	Busy,
}

#[derive(Default)]
struct Progress;

impl Monitor for Progress {
	type State = ProgressState;

	fn machine() -> Result<Machine<Self, ProgressState>> {
		Machine::builder("Progress")
			.start(ProgressState::Idle)
			.state(ProgressState::Idle, |s| s.goto_on::<Start>(ProgressState::Busy).ignore::<Finish>())
			.state(ProgressState::Busy, |s| s.hot().goto_on::<Finish>(ProgressState::Idle).ignore::<Start>())
			.build()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WorkerState {
	Working,
}

/// Starts work and, if `finishes`, reports it done before halting.
fn worker(finishes: bool) -> Machine<(), WorkerState> {
	Machine::builder("Worker")
		.start(WorkerState::Working)
		.state(WorkerState::Working, move |s| {
			s.on_entry(move |_, ctx| {
				ctx.monitor::<Progress, _>(Start)?;
				if finishes {
					ctx.monitor::<Progress, _>(Finish)?;
				}
				ctx.halt()
			})
		})
		.build()
		.unwrap()
}

#[test]
fn test_hot_monitor_at_termination() {
	init_test_logging();
	let engine = TestEngine::new(TestConfiguration::new().iterations(3), |runtime| {
		runtime.create_actor(&worker(false), (), None)?;
		Ok(())
	});
	let report = engine.run();
	let bug = report.bug.expect("liveness violation");
	assert_eq!(bug.kind, BugKind::Liveness);
	assert!(!bug.kind.is_safety());
	assert!(bug.message.contains("Progress"), "{}", bug.message);
	assert!(bug.message.contains("Busy"), "{}", bug.message);
}

#[test]
fn test_monitor_that_cools_down() {
	init_test_logging();
	for liveness in [LivenessCheck::None, LivenessCheck::CycleDetection, LivenessCheck::Temperature {
		threshold: 100,
	}] {
		let engine = TestEngine::new(TestConfiguration::new().iterations(50).liveness(liveness), |runtime| {
			runtime.create_actor(&worker(true), (), None)?;
			runtime.create_actor(&worker(true), (), None)?;
			Ok(())
		});
		let report = engine.run();
		assert!(report.bug.is_none(), "{:?}: {:?}", liveness, report.bug);
		assert_eq!(report.iterations, 50);
	}
}

#[derive(Debug)]
struct Spin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SpinState {
	Spinning,
}

/// Keeps sending itself `Spin` without ever finishing its work.
fn spinner() -> Machine<(), SpinState> {
	Machine::builder("Spinner")
		.start(SpinState::Spinning)
		.state(SpinState::Spinning, |s| {
			s.on_entry(|_, ctx| {
				ctx.monitor::<Progress, _>(Start)?;
				match ctx.id() {
					Some(id) => ctx.send(id, Spin),
					None => Ok(()),
				}
			})
			.on::<Spin, _>(|_, ctx, _| match ctx.id() {
				Some(id) => ctx.send(id, Spin),
				None => Ok(()),
			})
		})
		.build()
		.unwrap()
}

#[test]
fn test_step_bound_gives_no_verdict() {
	init_test_logging();
	let engine = TestEngine::new(TestConfiguration::new().iterations(2).max_steps(300), |runtime| {
		runtime.create_actor(&spinner(), (), None)?;
		Ok(())
	});
	let report = engine.run();
	assert!(report.bug.is_none());
	assert_eq!(report.bounded_iterations, 2);
}

#[test]
fn test_cycle_detection_finds_hot_loop() {
	init_test_logging();
	let engine = TestEngine::new(
		TestConfiguration::new().iterations(5).max_steps(2_000).liveness(LivenessCheck::CycleDetection),
		|runtime| {
			runtime.create_actor(&spinner(), (), None)?;
			Ok(())
		},
	);
	let report = engine.run();
	let bug = report.bug.expect("liveness violation");
	assert_eq!(bug.kind, BugKind::Liveness);
	assert_eq!(report.bug_iteration, Some(0));
	assert!(bug.message.contains("cycle"), "{}", bug.message);

	let replayed = engine.replay(&bug.schedule);
	assert_eq!(replayed.verdict.bug().map(|bug| bug.kind), Some(BugKind::Liveness));
}

#[test]
fn test_temperature_threshold() {
	init_test_logging();
	let engine = TestEngine::new(
		TestConfiguration::new().iterations(5).max_steps(2_000).liveness(LivenessCheck::Temperature {
			threshold: 50,
		}),
		|runtime| {
			runtime.create_actor(&spinner(), (), None)?;
			Ok(())
		},
	);
	let report = engine.run();
	let bug = report.bug.expect("liveness violation");
	assert_eq!(bug.kind, BugKind::Liveness);
	assert!(report.total_steps < 2_000);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CountState {
	Counting,
}

/// Like the spinner, but its counter makes every state distinct.
fn counting_spinner() -> Machine<u64, CountState> {
	Machine::<u64, CountState>::builder("CountingSpinner")
		.start(CountState::Counting)
		.hash_with(|count: &u64| *count)
		.state(CountState::Counting, |s| {
			s.on_entry(|_, ctx| {
				ctx.monitor::<Progress, _>(Start)?;
				match ctx.id() {
					Some(id) => ctx.send(id, Spin),
					None => Ok(()),
				}
			})
			.on::<Spin, _>(|count, ctx, _| {
				*count += 1;
				match ctx.id() {
					Some(id) => ctx.send(id, Spin),
					None => Ok(()),
				}
			})
		})
		.build()
		.unwrap()
}

#[test]
fn test_hashed_data_distinguishes_states() {
	init_test_logging();
	let engine = TestEngine::new(
		TestConfiguration::new().iterations(2).max_steps(400).liveness(LivenessCheck::CycleDetection),
		|runtime| {
			runtime.create_actor(&counting_spinner(), 0, None)?;
			Ok(())
		},
	);
	let report = engine.run();
	assert!(report.bug.is_none(), "{:?}", report.bug);
	assert_eq!(report.bounded_iterations, 2);
	assert!(report.distinct_states > 100);
}
