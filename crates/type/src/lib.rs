// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Shared building blocks for the weave actor runtime.
//!
//! - [`Error`] and [`Result`]: the single error type every runtime layer returns
//! - [`ActorId`], [`OperationId`], [`OperationGroupId`]: identities handed out by a runtime
//! - [`Hash64`] and [`StateHasher`]: xxh3 based digests used for execution-state hashing

pub mod error;
pub mod hash;
pub mod id;

pub use error::{Error, Result};
pub use hash::{Hash64, StateHasher, xxh3_64};
pub use id::{ActorId, OperationGroupId, OperationId};
