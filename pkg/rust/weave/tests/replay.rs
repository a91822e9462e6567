// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use weave::{
	ActorId, ActorRuntime, BugKind, Machine, ReplayStrategy, RuntimeConfig, ScheduleStep, ScheduleTrace, StrategyKind,
	TestConfiguration, TestEngine, Verdict, execute, init_test_logging,
};

#[derive(Debug)]
struct Write(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RegisterState {
	Ready,
}

/// Expects writes in increasing order, which two racing writers break.
fn register() -> Machine<u64, RegisterState> {
	Machine::<u64, RegisterState>::builder("Register")
		.start(RegisterState::Ready)
		.state(RegisterState::Ready, |s| {
			s.on::<Write, _>(|last, ctx, write| {
				ctx.assert(write.0 > *last, format!("write {} after {}", write.0, last))?;
				*last = write.0;
				Ok(())
			})
		})
		.build()
		.unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WriterState {
	Writing,
}

fn writer() -> Machine<(ActorId, u64), WriterState> {
	Machine::<(ActorId, u64), WriterState>::builder("Writer")
		.start(WriterState::Writing)
		.state(WriterState::Writing, |s| {
			s.on_entry(|(target, value): &mut (ActorId, u64), ctx| {
				let value = *value + ctx.random_integer(2)?;
				ctx.send(target, Write(value))?;
				ctx.halt()
			})
		})
		.build()
		.unwrap()
}

fn racing_writers(config: TestConfiguration) -> TestEngine {
	TestEngine::new(config, |runtime| {
		let register = runtime.create_actor(&register(), 0, None)?;
		runtime.create_actor(&writer(), (register.clone(), 10), None)?;
		runtime.create_actor(&writer(), (register, 1), None)?;
		Ok(())
	})
}

#[test]
fn test_replay_reproduces_bug() {
	init_test_logging();
	let engine = racing_writers(TestConfiguration::new().iterations(500).seed(11));
	let report = engine.run();
	let bug = report.bug.expect("racing writers");
	assert_eq!(bug.kind, BugKind::Assertion);

	let first = engine.replay(&bug.schedule);
	let second = engine.replay(&bug.schedule);
	for replayed in [&first, &second] {
		let replayed_bug = replayed.verdict.bug().expect("replayed bug");
		assert_eq!(replayed_bug.kind, bug.kind);
		assert_eq!(replayed_bug.message, bug.message);
		assert_eq!(replayed.schedule, bug.schedule);
		assert_eq!(replayed.log, bug.log);
	}
}

#[test]
fn test_replay_through_json() {
	init_test_logging();
	let engine = racing_writers(TestConfiguration::new().iterations(500).seed(3).strategy(StrategyKind::Priority {
		switches: 2,
	}));
	let report = engine.run();
	let bug = report.bug.expect("racing writers");

	let json = bug.schedule.to_json().unwrap();
	let trace = ScheduleTrace::from_json(&json).unwrap();
	let replayed = engine.replay(&trace);
	assert_eq!(replayed.verdict.bug().map(|bug| bug.message.clone()), Some(bug.message));
}

#[test]
fn test_replay_rejects_divergence() {
	init_test_logging();
	let trace: ScheduleTrace = vec![ScheduleStep::Operation(weave::OperationId(7))].into_iter().collect();
	let mut strategy = ReplayStrategy::new(trace);
	weave::Strategy::prepare_next_iteration(&mut strategy);
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(strategy), |runtime| {
		runtime.create_actor(&register(), 0, None)?;
		Ok(())
	});
	match result.verdict {
		Verdict::BugFound(bug) => assert!(bug.message.contains("schedule trace"), "{}", bug.message),
		Verdict::NoBugFound => panic!("diverging replay must be reported"),
	}
}

/// Always hands the turn to another enabled operation when there is one.
struct Yielding;

impl weave::Strategy for Yielding {
	fn prepare_next_iteration(&mut self) -> bool {
		true
	}

	fn next_operation(
		&mut self,
		enabled: &[weave::OperationId],
		current: weave::OperationId,
	) -> weave::Result<weave::OperationId> {
		Ok(enabled.iter().copied().find(|id| *id != current).unwrap_or(current))
	}

	fn next_boolean(&mut self, _current: weave::OperationId, _max_value: u64) -> weave::Result<bool> {
		Ok(false)
	}

	fn next_integer(&mut self, _current: weave::OperationId, _max_value: u64) -> weave::Result<u64> {
		Ok(0)
	}

	fn is_fair(&self) -> bool {
		false
	}

	fn description(&self) -> String {
		"yielding".to_string()
	}
}

#[test]
fn test_create_and_send_yield_before_taking_effect() {
	init_test_logging();
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(Yielding), |runtime| {
		let register = runtime.create_actor(&register(), 0, None)?;
		runtime.send_event(&register, Write(1))
	});
	assert_eq!(result.verdict, Verdict::NoBugFound);

	// the register did not exist yet at the create point, so only the harness could run
	let harness = weave::OperationId::HARNESS;
	let register = weave::OperationId(1);
	assert_eq!(result.schedule.get(0), Some(ScheduleStep::Operation(harness)));
	// at the send point the register ran first, before the write reached its mailbox
	assert_eq!(result.schedule.get(1), Some(ScheduleStep::Operation(register)));
	let register_id = ActorId::new(1, "Register");
	let dequeued: Vec<_> = result.log.iter().filter_map(|entry| entry.as_dequeue(&register_id)).collect();
	assert_eq!(dequeued, vec![("Write", Some(0))]);
}
