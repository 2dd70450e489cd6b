// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the relay and its backends.

pub mod adapter;
pub mod store;

pub use adapter::PluginAdapter;
pub use store::ChatStore;
