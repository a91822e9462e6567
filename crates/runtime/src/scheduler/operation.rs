// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use weave_type::OperationId;

/// Why an operation is, or is not, schedulable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationStatus {
	Enabled,
	/// An actor with nothing dequeuable in its mailbox.
	Idle,
	/// An actor blocked in an explicit receive.
	BlockedOnReceive,
	/// Waiting for every listed operation to complete.
	WaitAll(Vec<OperationId>),
	/// Waiting for any listed operation to complete.
	WaitAny(Vec<OperationId>),
	/// Waiting for the operation to become idle or complete.
	Quiescence(OperationId),
	Completed,
}

impl OperationStatus {
	/// Statuses that leave the run deadlocked when nothing else is enabled.
	pub fn is_blocked(&self) -> bool {
		matches!(
			self,
			OperationStatus::BlockedOnReceive
				| OperationStatus::WaitAll(_)
				| OperationStatus::WaitAny(_)
				| OperationStatus::Quiescence(_)
		)
	}
}

/// Where an operation handed control back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPoint {
	Start,
	Create,
	Send,
	Dequeue,
	Receive,
	Join,
	Choice,
	Idle,
	Halt,
	Complete,
}

impl fmt::Display for SchedulingPoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

#[derive(Debug, Clone)]
pub(crate) struct Operation {
	pub name: String,
	pub status: OperationStatus,
	pub last_point: SchedulingPoint,
}

impl Operation {
	pub(crate) fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			status: OperationStatus::Enabled,
			last_point: SchedulingPoint::Start,
		}
	}
}

/// Whether `id` may run, resolving join and quiescence waits against the
/// statuses of the awaited operations.
pub(crate) fn is_enabled(operations: &BTreeMap<OperationId, Operation>, id: OperationId) -> bool {
	let completed = |other: &OperationId| {
		operations.get(other).is_none_or(|operation| operation.status == OperationStatus::Completed)
	};
	match operations.get(&id).map(|operation| &operation.status) {
		Some(OperationStatus::Enabled) => true,
		Some(OperationStatus::WaitAll(others)) => others.iter().all(completed),
		Some(OperationStatus::WaitAny(others)) => others.is_empty() || others.iter().any(completed),
		// a target parked in a receive has processed all it can until someone sends
		Some(OperationStatus::Quiescence(target)) => operations.get(target).is_none_or(|operation| {
			matches!(
				operation.status,
				OperationStatus::Idle | OperationStatus::BlockedOnReceive | OperationStatus::Completed
			)
		}),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(statuses: Vec<OperationStatus>) -> BTreeMap<OperationId, Operation> {
		statuses
			.into_iter()
			.enumerate()
			.map(|(i, status)| {
				let mut operation = Operation::new(format!("op{}", i));
				operation.status = status;
				(OperationId(i as u64), operation)
			})
			.collect()
	}

	#[test]
	fn test_wait_all_and_any() {
		let ops = table(vec![
			OperationStatus::WaitAll(vec![OperationId(2), OperationId(3)]),
			OperationStatus::WaitAny(vec![OperationId(2), OperationId(3)]),
			OperationStatus::Completed,
			OperationStatus::Enabled,
		]);
		assert!(!is_enabled(&ops, OperationId(0)));
		assert!(is_enabled(&ops, OperationId(1)));
		assert!(!is_enabled(&ops, OperationId(2)));
		assert!(is_enabled(&ops, OperationId(3)));
	}

	#[test]
	fn test_quiescence() {
		let ops = table(vec![
			OperationStatus::Quiescence(OperationId(1)),
			OperationStatus::Idle,
			OperationStatus::Quiescence(OperationId(3)),
			OperationStatus::BlockedOnReceive,
			OperationStatus::Quiescence(OperationId(5)),
			OperationStatus::Enabled,
		]);
		assert!(is_enabled(&ops, OperationId(0)));
		assert!(is_enabled(&ops, OperationId(2)));
		assert!(!is_enabled(&ops, OperationId(4)));
		assert!(OperationStatus::BlockedOnReceive.is_blocked());
		assert!(!OperationStatus::Idle.is_blocked());
	}
}
