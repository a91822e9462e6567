// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Timers backed by sleeping threads.

use std::{sync::Arc, thread, time::Duration};

use tracing::debug;
use weave_type::{Error, Result};

use super::Shared;
use crate::{event::Message, timer::TimerHandle};

/// Upper bound on one sleep, so that cancellation is noticed promptly.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep for `duration`; returns `false` if the timer or the runtime was
/// cancelled meanwhile.
fn sleep(shared: &Shared, handle: &TimerHandle, duration: Duration) -> bool {
	let mut remaining = duration;
	while !remaining.is_zero() {
		if handle.is_cancelled() || shared.cancel.is_cancelled() {
			return false;
		}
		let step = remaining.min(CANCEL_CHECK_INTERVAL);
		thread::sleep(step);
		remaining -= step;
	}
	!(handle.is_cancelled() || shared.cancel.is_cancelled())
}

fn elapse(shared: &Shared, handle: &TimerHandle) -> bool {
	match shared.deliver(None, handle.owner(), Message::new(handle.elapsed()), None, None) {
		Ok(delivered) => delivered,
		Err(error) => {
			debug!(timer = handle.id(), error = %error, "timer stopped");
			false
		}
	}
}

pub(super) fn start(shared: Arc<Shared>, handle: TimerHandle) -> Result<()> {
	thread::Builder::new()
		.name(format!("weave-timer-{}", handle.id()))
		.spawn(move || {
			if !sleep(&shared, &handle, handle.due()) || !elapse(&shared, &handle) {
				return;
			}
			if let Some(period) = handle.period() {
				// the owner halting ends the timer
				while sleep(&shared, &handle, period) && elapse(&shared, &handle) {}
			}
		})
		.map(|_| ())
		.map_err(|e| Error::Internal(format!("failed to spawn timer thread: {}", e)))
}
