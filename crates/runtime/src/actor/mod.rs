// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

pub mod context;
pub(crate) mod core;
pub mod machine;
pub(crate) mod mailbox;
