// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! xxHash3 digests for execution-state fingerprints.

use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{self, Xxh3};

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash64(pub u64);

impl From<u64> for Hash64 {
	fn from(value: u64) -> Self {
		Hash64(value)
	}
}

impl From<Hash64> for u64 {
	fn from(hash: Hash64) -> Self {
		hash.0
	}
}

impl Hash for Hash64 {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.0)
	}
}

/// Compute xxHash3 64-bit hash of data.
#[inline]
pub fn xxh3_64(data: &[u8]) -> Hash64 {
	Hash64(xxh3::xxh3_64(data))
}

/// Streaming xxh3 hasher.
///
/// Unlike `DefaultHasher` the output is stable across processes, so a digest
/// computed while exploring can be compared with one computed during replay.
pub struct StateHasher {
	inner: Xxh3,
}

impl StateHasher {
	pub fn new() -> Self {
		Self {
			inner: Xxh3::new(),
		}
	}

	pub fn write_str(&mut self, value: &str) {
		self.inner.update(value.as_bytes());
		self.inner.update(&[0xff]);
	}

	pub fn finish64(&self) -> Hash64 {
		Hash64(self.inner.digest())
	}
}

impl Default for StateHasher {
	fn default() -> Self {
		Self::new()
	}
}

impl Hasher for StateHasher {
	fn finish(&self) -> u64 {
		self.inner.digest()
	}

	fn write(&mut self, bytes: &[u8]) {
		self.inner.update(bytes);
	}
}
