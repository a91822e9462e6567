// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use weave::{
	ActorId, ActorRuntime, BugKind, Machine, RandomStrategy, RuntimeConfig, TestConfiguration, TestEngine, TraceEntry,
	Verdict, execute, init_test_logging,
};

#[derive(Debug)]
struct Pong;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PingState {
	WaitPong,
	Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PongState {
	Replying,
}

fn ping() -> Machine<(), PingState> {
	Machine::builder("Ping")
		.start(PingState::WaitPong)
		.state(PingState::WaitPong, |s| s.goto_on::<Pong>(PingState::Done))
		.state(PingState::Done, |s| s)
		.build()
		.unwrap()
}

fn pong() -> Machine<ActorId, PongState> {
	Machine::<ActorId, PongState>::builder("Pong")
		.start(PongState::Replying)
		.state(PongState::Replying, |s| s.on_entry(|ping: &mut ActorId, ctx| ctx.send(ping, Pong)))
		.build()
		.unwrap()
}

#[test]
fn test_ping_pong() {
	init_test_logging();
	for seed in 0..20 {
		let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(seed)), |runtime| {
			let ping = runtime.create_actor(&ping(), (), None)?;
			runtime.create_actor(&pong(), ping, None)?;
			Ok(())
		});
		assert_eq!(result.verdict, Verdict::NoBugFound, "seed {}", seed);
		assert!(!result.step_bound_reached);

		let ping = ActorId::new(1, "Ping");
		let dequeued: Vec<_> = result.log.iter().filter_map(|entry| entry.as_dequeue(&ping)).collect();
		assert_eq!(dequeued, vec![("Pong", Some(0))], "seed {}", seed);
	}
}

#[derive(Debug)]
struct T;

#[derive(Debug)]
struct U;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FilterState {
	S,
}

#[test]
fn test_ignored_event_is_discarded() {
	init_test_logging();
	let handled = Arc::new(AtomicUsize::new(0));
	let receiver = {
		let handled = handled.clone();
		Machine::<(), FilterState>::builder("Receiver")
			.start(FilterState::S)
			.state(FilterState::S, move |s| {
				let handled = handled.clone();
				s.ignore::<T>().on::<U, _>(move |_: &mut (), _, _| {
					handled.fetch_add(1, Ordering::SeqCst);
					Ok(())
				})
			})
			.build()
			.unwrap()
	};

	for seed in 0..10 {
		let machine = receiver.clone();
		let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(seed)), move |runtime| {
			let id = runtime.create_actor(&machine, (), None)?;
			runtime.send_event(&id, T)?;
			runtime.send_event(&id, U)?;
			Ok(())
		});
		assert_eq!(result.verdict, Verdict::NoBugFound);

		let id = ActorId::new(1, "Receiver");
		let dequeued: Vec<_> = result.log.iter().filter_map(|entry| entry.as_dequeue(&id)).collect();
		assert_eq!(dequeued, vec![("U", Some(1))]);
		assert!(result.log.iter().any(|entry| matches!(entry, TraceEntry::Ignored { event, .. } if event == "T")));
	}
	assert_eq!(handled.load(Ordering::SeqCst), 10);
}

#[derive(Debug)]
struct Go;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TwoStep {
	A,
	B,
	C,
}

fn double_goto() -> Machine<(), TwoStep> {
	Machine::builder("Twice")
		.start(TwoStep::A)
		.state(TwoStep::A, |s| {
			s.on::<Go, _>(|_, ctx, _| {
				ctx.goto(TwoStep::B)?;
				ctx.goto(TwoStep::C)
			})
		})
		.state(TwoStep::B, |s| s)
		.state(TwoStep::C, |s| s)
		.build()
		.unwrap()
}

#[test]
fn test_two_mutating_statements_are_a_usage_error() {
	init_test_logging();
	let engine = TestEngine::new(TestConfiguration::new().iterations(5), |runtime| {
		let id = runtime.create_actor(&double_goto(), (), None)?;
		runtime.send_event(&id, Go)
	});
	let report = engine.run();
	let bug = report.bug.expect("usage error");
	assert_eq!(bug.kind, BugKind::Usage);
	assert!(bug.message.contains("'goto' after 'goto'"), "{}", bug.message);
	assert_eq!(report.bug_iteration, Some(0));
}

#[test]
fn test_exit_action_cannot_transition() {
	init_test_logging();
	let machine = Machine::<(), TwoStep>::builder("Exit")
		.start(TwoStep::A)
		.state(TwoStep::A, |s| s.on_exit(|_, ctx| ctx.goto(TwoStep::C)).goto_on::<Go>(TwoStep::B))
		.state(TwoStep::B, |s| s)
		.state(TwoStep::C, |s| s)
		.build()
		.unwrap();
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(0)), move |runtime| {
		let id = runtime.create_actor(&machine, (), None)?;
		runtime.send_event(&id, Go)
	});
	let bug = result.verdict.bug().expect("usage error");
	assert_eq!(bug.kind, BugKind::Usage);
	assert!(bug.message.contains("exit action"));
}

#[derive(Debug)]
struct X;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Waiting {
	Start,
	WaitX,
}

#[test]
fn test_receive_without_sender_is_a_deadlock() {
	init_test_logging();
	let machine = Machine::<(), Waiting>::builder("Waiter")
		.start(Waiting::Start)
		.state(Waiting::Start, |s| s.on_entry(|_, ctx| ctx.goto(Waiting::WaitX)))
		.state(Waiting::WaitX, |s| {
			s.on_entry(|_, ctx| {
				ctx.receive::<X>()?;
				Ok(())
			})
		})
		.build()
		.unwrap();

	let engine = TestEngine::new(TestConfiguration::new().iterations(3), move |runtime| {
		runtime.create_actor(&machine, (), None)?;
		Ok(())
	});
	let report = engine.run();
	let bug = report.bug.expect("deadlock");
	assert_eq!(bug.kind, BugKind::Deadlock);
	assert!(!bug.kind.is_safety());
}

#[derive(Debug)]
struct Unexpected;

#[test]
fn test_unhandled_event() {
	init_test_logging();
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(3)), |runtime| {
		let id = runtime.create_actor(&ping(), (), None)?;
		runtime.send_event(&id, Unexpected)
	});
	let bug = result.verdict.bug().expect("unhandled event");
	assert_eq!(bug.kind, BugKind::UnhandledEvent);
	assert!(bug.message.contains("Unexpected"));
}

#[test]
fn test_panic_in_handler() {
	init_test_logging();
	let machine = Machine::<(), TwoStep>::builder("Panicky")
		.start(TwoStep::A)
		.state(TwoStep::A, |s| s.on::<Go, _>(|_, _, _| panic!("handler exploded")))
		.build()
		.unwrap();
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(0)), move |runtime| {
		let id = runtime.create_actor(&machine, (), None)?;
		runtime.send_event(&id, Go)
	});
	let bug = result.verdict.bug().expect("panic");
	assert_eq!(bug.kind, BugKind::Panic);
	assert!(bug.message.contains("handler exploded"));
}

#[test]
fn test_send_to_unbound_id() {
	init_test_logging();
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(0)), |runtime| {
		let id = runtime.create_actor_id("Ping");
		runtime.send_event(&id, Pong)
	});
	assert_eq!(result.verdict.bug().map(|bug| bug.kind), Some(BugKind::Usage));
}

#[test]
fn test_unhandled_hook_replaces_error() {
	init_test_logging();
	let unhandled = Arc::new(AtomicUsize::new(0));
	let machine = {
		let unhandled = unhandled.clone();
		Machine::<(), PingState>::builder("Tolerant")
			.start(PingState::WaitPong)
			.state(PingState::WaitPong, |s| s.goto_on::<Pong>(PingState::Done))
			.state(PingState::Done, |s| s)
			.on_unhandled(move |_, ctx| {
				if ctx.event_as::<Unexpected>().is_some() {
					unhandled.fetch_add(1, Ordering::SeqCst);
				}
				Ok(())
			})
			.build()
			.unwrap()
	};
	let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(5)), move |runtime| {
		let id = runtime.create_actor(&machine, (), None)?;
		runtime.send_event(&id, Unexpected)?;
		runtime.send_event(&id, Pong)
	});
	assert_eq!(result.verdict, Verdict::NoBugFound);
	assert_eq!(unhandled.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Request;

#[derive(Debug)]
struct Reply(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ClientState {
	Asking,
}

#[test]
fn test_receive_any_leaves_other_messages_queued() {
	init_test_logging();
	let replies = Arc::new(AtomicUsize::new(0));
	let client = {
		let replies = replies.clone();
		Machine::<(), ClientState>::builder("Client")
			.start(ClientState::Asking)
			.state(ClientState::Asking, move |s| {
				s.on::<Request, _>(|_, ctx, _| {
					let message = ctx.receive_any(&[weave::EventType::of::<Reply>()])?;
					let reply = message.downcast_ref::<Reply>().map(|reply| reply.0);
					ctx.assert(reply == Some(7), format!("unexpected reply {:?}", reply))
				})
				.on::<U, _>(move |_, _, _| {
					replies.fetch_add(1, Ordering::SeqCst);
					Ok(())
				})
			})
			.build()
			.unwrap()
	};

	let engine = TestEngine::new(TestConfiguration::new().iterations(20), move |runtime| {
		let id = runtime.create_actor(&client, (), None)?;
		runtime.send_event(&id, Request)?;
		runtime.send_event(&id, U)?;
		runtime.send_event(&id, Reply(7))
	});
	let report = engine.run();
	assert!(report.bug.is_none(), "{:?}", report.bug);
	assert_eq!(replies.load(Ordering::SeqCst), 20);
}

#[derive(Debug)]
struct Kick;

#[derive(Debug)]
struct Open;

#[derive(Debug)]
struct Later;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DoorState {
	Closed,
	Opened,
}

fn door() -> Machine<Arc<AtomicUsize>, DoorState> {
	Machine::<Arc<AtomicUsize>, DoorState>::builder("Door")
		.start(DoorState::Closed)
		.state(DoorState::Closed, |s| {
			s.defer::<Later>().on::<Kick, _>(|_, ctx, _| ctx.raise(Later)).goto_on::<Open>(DoorState::Opened)
		})
		.state(DoorState::Opened, |s| {
			s.on::<Later, _>(|handled, _, _| {
				handled.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
		})
		.build()
		.unwrap()
}

#[test]
fn test_raised_event_deferred_until_goto() {
	init_test_logging();
	for seed in 0..20 {
		let handled = Arc::new(AtomicUsize::new(0));
		let (result, _) = execute(&RuntimeConfig::new(), Box::new(RandomStrategy::new(seed)), {
			let handled = handled.clone();
			move |runtime| {
				let door = runtime.create_actor(&door(), handled.clone(), None)?;
				runtime.send_event(&door, Kick)?;
				runtime.send_event(&door, Open)
			}
		});
		assert_eq!(result.verdict, Verdict::NoBugFound, "seed {}", seed);
		assert_eq!(handled.load(Ordering::SeqCst), 1, "seed {}", seed);
	}
}
