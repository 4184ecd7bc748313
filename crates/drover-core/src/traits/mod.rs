// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator contracts between the scheduler, the gateway session, and
//! the systems Drover does not own (persistence, notification, the remote
//! message pipeline).

pub mod account;
pub mod connectivity;
pub mod dispatch;
pub mod job_sink;
pub mod message;
pub mod transport;

pub use account::AccountDisabler;
pub use connectivity::Connectivity;
pub use dispatch::{DispatchEvent, DispatchFlow, DispatchSink};
pub use job_sink::{BroadcastJobSink, JobChangeEvent, JobChangeSink};
pub use message::MessageActions;
pub use transport::{Connector, Frame, GatewayTransport};
