// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job scheduling for Drover accounts.
//!
//! Each account owns a [`ChannelPool`]: one [`Channel`] per upstream
//! channel, each with a bounded FIFO, a resizable [`ConcurrencyGate`] and a
//! worker task that paces submissions and drives every job through its
//! lifecycle.

pub mod channel;
pub mod context;
pub mod error;
pub mod gate;
mod lifecycle;
pub mod pool;
pub mod selector;
pub mod stats;
mod worker;

pub use channel::{Channel, ChannelSettings, PendingJob};
pub use context::PoolContext;
pub use error::{GateError, LifecycleError};
pub use gate::ConcurrencyGate;
pub use pool::{CHANNEL_REMOVED, ChannelPool};
pub use selector::{
    ChannelSelector, IdleFirstSelector, LeastLoadSelector, RoundRobinSelector, selector_for,
};
pub use stats::{ChannelStats, PoolSnapshot};
