// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame <-> payload conversion. Binary frames are raw-deflate compressed
//! JSON and are inflated before decoding.

use std::io::Read;

use drover_core::{DroverError, Frame};
use flate2::read::DeflateDecoder;

use crate::protocol::GatewayPayload;

/// Decode a data frame. Close frames are not payloads and yield `None`.
pub fn decode(frame: &Frame) -> Result<Option<GatewayPayload>, DroverError> {
    match frame {
        Frame::Text(text) => Ok(Some(serde_json::from_str(text)?)),
        Frame::Binary(bytes) => {
            let text = inflate(bytes)?;
            Ok(Some(serde_json::from_str(&text)?))
        }
        Frame::Close(_) => Ok(None),
    }
}

pub fn encode(payload: &GatewayPayload) -> Result<Frame, DroverError> {
    Ok(Frame::Text(serde_json::to_string(payload)?))
}

/// Largest payload a binary frame may inflate to.
pub const MAX_INFLATED_BYTES: u64 = 16 * 1024 * 1024;

fn inflate(bytes: &[u8]) -> Result<String, DroverError> {
    inflate_capped(bytes, MAX_INFLATED_BYTES)
}

fn inflate_capped(bytes: &[u8], limit: u64) -> Result<String, DroverError> {
    let mut text = String::new();
    DeflateDecoder::new(bytes)
        .take(limit + 1)
        .read_to_string(&mut text)
        .map_err(|e| DroverError::Protocol(format!("failed to inflate binary frame: {e}")))?;
    if text.len() as u64 > limit {
        return Err(DroverError::Protocol(format!(
            "binary frame inflates past {limit} bytes"
        )));
    }
    Ok(text)
}
