// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Timers owned by actors.
//!
//! A timer delivers [`TimerElapsed`] to its owner once, or repeatedly for a
//! periodic timer, until stopped. Under systematic testing the elapse is a
//! nondeterministic choice of the scheduler and the durations are ignored.

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use weave_type::ActorId;

/// Event delivered to the owner of a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerElapsed {
	pub timer: u64,
}

/// Handle to a started timer.
#[derive(Clone)]
pub struct TimerHandle {
	id: u64,
	owner: ActorId,
	due: Duration,
	period: Option<Duration>,
	cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
	pub(crate) fn new(owner: ActorId, due: Duration, period: Option<Duration>) -> Self {
		Self {
			id: next_timer_id(),
			owner,
			due,
			period,
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Returns `true` if this call cancelled the timer.
	pub fn cancel(&self) -> bool {
		self.cancelled.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn owner(&self) -> &ActorId {
		&self.owner
	}

	pub fn due(&self) -> Duration {
		self.due
	}

	pub fn period(&self) -> Option<Duration> {
		self.period
	}

	pub(crate) fn elapsed(&self) -> TimerElapsed {
		TimerElapsed {
			timer: self.id,
		}
	}
}

impl std::fmt::Debug for TimerHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TimerHandle")
			.field("id", &self.id)
			.field("owner", &self.owner)
			.field("periodic", &self.period.is_some())
			.field("cancelled", &self.is_cancelled())
			.finish()
	}
}

static TIMER_ID: AtomicU64 = AtomicU64::new(1);

fn next_timer_id() -> u64 {
	TIMER_ID.fetch_add(1, Ordering::Relaxed)
}
