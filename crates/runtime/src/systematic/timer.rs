// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Mock timers: a timer is an ordinary actor that keeps sending itself a tick
//! and lets the scheduler decide, at every tick, whether the timer elapses.

use weave_type::Result;

use super::OperationHost;
use crate::{
	actor::{
		context::{Context, CreateRequest, Host},
		core::MachineCore,
		machine::Machine,
	},
	timer::TimerHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerState {
	Ticking,
}

#[derive(Debug)]
struct Tick;

struct Timer {
	handle: TimerHandle,
}

fn machine() -> Result<Machine<Timer, TimerState>> {
	Machine::builder("Timer")
		.start(TimerState::Ticking)
		.state(TimerState::Ticking, |s| {
			s.on_entry(|_: &mut Timer, ctx| tick(ctx)).on::<Tick, _>(|timer, ctx, _| {
				if timer.handle.is_cancelled() {
					return ctx.halt();
				}
				if ctx.random_boolean()? {
					ctx.send(timer.handle.owner(), timer.handle.elapsed())?;
					if timer.handle.period().is_none() {
						return ctx.halt();
					}
				}
				tick(ctx)
			})
		})
		.build()
}

fn tick(ctx: &mut Context<'_, TimerState>) -> Result<()> {
	match ctx.id() {
		Some(id) => ctx.send(id, Tick),
		None => Ok(()),
	}
}

pub(super) fn start(host: &OperationHost, handle: &TimerHandle) -> Result<()> {
	let creator = host.actor.as_ref().map(|cell| cell.id.clone());
	host.create(
		creator.as_ref(),
		CreateRequest {
			instance: Box::new(MachineCore::new(
				machine()?,
				Timer {
					handle: handle.clone(),
				},
			)),
			id: None,
			initial: None,
			execute: false,
		},
	)?;
	Ok(())
}
