// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account instances for Drover.
//!
//! An [`AccountInstance`] ties an account's channel pool to its gateway
//! session so job lifecycles see connectivity and a disabled account fails
//! its jobs. The [`InstanceRegistry`] keeps instances in step with the
//! configuration and routes jobs across accounts.

mod disabler;
pub mod instance;
pub mod registry;

pub use disabler::LogOnlyDisabler;
pub use instance::{AccountInstance, InstanceDeps};
pub use registry::{InstanceRegistry, Placement, RefreshSummary};
