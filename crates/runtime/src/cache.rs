// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Execution-state fingerprints.
//!
//! A fingerprint abstracts the state of a whole execution at a scheduling
//! point: every live actor (state stack, optional data hash and queued event
//! types), every monitor and every operation status. Two points with the same
//! fingerprint are treated as the same state by cycle detection.

use std::{
	collections::{BTreeMap, HashSet},
	hash::Hash,
};

use weave_type::{Hash64, OperationId, StateHasher};

use crate::{monitor::HotMonitor, scheduler::operation::Operation};

/// State of actors and monitors captured by the running operation before it
/// enters the scheduler.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
	pub hash: Hash64,
	pub hot: Vec<HotMonitor>,
}

/// Builds the actor and monitor part of a [`Snapshot`].
pub(crate) struct SnapshotBuilder {
	hasher: StateHasher,
}

impl SnapshotBuilder {
	pub(crate) fn new() -> Self {
		Self {
			hasher: StateHasher::new(),
		}
	}

	/// Add one actor. Callers add actors in id order.
	pub(crate) fn actor<'a>(&mut self, id: u64, machine: Hash64, queued: impl Iterator<Item = &'a str>) {
		id.hash(&mut self.hasher);
		machine.hash(&mut self.hasher);
		for name in queued {
			self.hasher.write_str(name);
		}
		self.hasher.write_str("|");
	}

	pub(crate) fn hasher(&mut self) -> &mut StateHasher {
		&mut self.hasher
	}

	pub(crate) fn finish(self, hot: Vec<HotMonitor>) -> Snapshot {
		Snapshot {
			hash: self.hasher.finish64(),
			hot,
		}
	}
}

/// Mix operation statuses and last scheduling points into a snapshot hash.
pub(crate) fn with_operations(base: Hash64, operations: &BTreeMap<OperationId, Operation>) -> Hash64 {
	let mut hasher = StateHasher::new();
	base.hash(&mut hasher);
	for (id, operation) in operations {
		id.0.hash(&mut hasher);
		operation.status.hash(&mut hasher);
		operation.last_point.hash(&mut hasher);
	}
	hasher.finish64()
}

/// Distinct fingerprints visited during one execution.
#[derive(Debug, Default)]
pub(crate) struct ExecutionStateCache {
	seen: HashSet<Hash64>,
}

impl ExecutionStateCache {
	/// Returns `true` the first time `state` is seen.
	pub(crate) fn visit(&mut self, state: Hash64) -> bool {
		self.seen.insert(state)
	}

	pub(crate) fn distinct(&self) -> usize {
		self.seen.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scheduler::operation::OperationStatus;

	fn snapshot(queued: &[&str]) -> Hash64 {
		let mut builder = SnapshotBuilder::new();
		builder.actor(1, Hash64(7), queued.iter().copied());
		builder.finish(Vec::new()).hash
	}

	#[test]
	fn test_queue_contents_change_the_hash() {
		assert_eq!(snapshot(&["Ping"]), snapshot(&["Ping"]));
		assert_ne!(snapshot(&["Ping"]), snapshot(&["Ping", "Ping"]));
		assert_ne!(snapshot(&["Ping", "Pong"]), snapshot(&["Pong", "Ping"]));
	}

	#[test]
	fn test_operation_status_changes_the_hash() {
		let mut operations = BTreeMap::new();
		operations.insert(OperationId(0), Operation::new("harness"));
		let enabled = with_operations(Hash64(1), &operations);
		if let Some(operation) = operations.get_mut(&OperationId(0)) {
			operation.status = OperationStatus::Idle;
		}
		assert_ne!(enabled, with_operations(Hash64(1), &operations));
	}

	#[test]
	fn test_cache_counts_distinct() {
		let mut cache = ExecutionStateCache::default();
		assert!(cache.visit(Hash64(1)));
		assert!(!cache.visit(Hash64(1)));
		assert!(cache.visit(Hash64(2)));
		assert_eq!(cache.distinct(), 2);
	}
}
