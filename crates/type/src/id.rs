// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Identity of one actor instance.
///
/// Values are assigned monotonically by the owning runtime. The declared actor
/// type travels with the id so a pre-allocated id can be validated when it is
/// finally bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
	value: u64,
	actor_type: Arc<str>,
}

impl ActorId {
	pub fn new(value: u64, actor_type: impl Into<Arc<str>>) -> Self {
		Self {
			value,
			actor_type: actor_type.into(),
		}
	}

	pub fn value(&self) -> u64 {
		self.value
	}

	pub fn actor_type(&self) -> &str {
		&self.actor_type
	}
}

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.actor_type, self.value)
	}
}

/// Identity of a scheduler-visible unit of progress.
///
/// `OperationId::HARNESS` is the test entry point; actors and tasks get the
/// following ids in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
	pub const HARNESS: OperationId = OperationId(0);
}

impl fmt::Display for OperationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "op#{}", self.0)
	}
}

/// Groups causally related work; messages carry the group of their sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationGroupId(pub u64);

impl fmt::Display for OperationGroupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "group#{}", self.0)
	}
}
