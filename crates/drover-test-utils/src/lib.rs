// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Drover integration tests.
//!
//! Deterministic stand-ins for the gateway transport and for the
//! collaborators the scheduler and the session talk to.
//!
//! # Components
//!
//! - [`MockConnector`] - scripted gateway connections with captured outbound frames
//! - [`RecordingJobSink`], [`RecordingDisabler`], [`RecordingDispatchSink`],
//!   [`RecordingMessageActions`] - call recorders
//! - [`StaticConnectivity`] - connection state the test controls directly
//! - [`fixtures`] - configuration builders

pub mod fixtures;
pub mod mock_transport;
pub mod recorders;

pub use mock_transport::{ConnectScript, MockConnector, ScriptStep, SentFrame};
pub use recorders::{
    RecordingDisabler, RecordingDispatchSink, RecordingJobSink, RecordingMessageActions,
    StaticConnectivity,
};
