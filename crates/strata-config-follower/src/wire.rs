//! Frame encoding for follower envelopes.
//!
//! Format: `[u32 big-endian length][postcard-encoded body]`.

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use strata_constants::follower::MAX_FOLLOWER_FRAME_SIZE;

use crate::error::DecodeSnafu;
use crate::error::EncodeSnafu;
use crate::error::TransportError;

const LENGTH_HEADER_SIZE: usize = 4;

/// Encode `message` as a length-prefixed frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    let body = postcard::to_allocvec(message).context(EncodeSnafu)?;
    if body.len() > MAX_FOLLOWER_FRAME_SIZE as usize {
        return Err(TransportError::FrameTooLarge {
            size: body.len(),
            max: MAX_FOLLOWER_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a length-prefixed frame.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(frame: &[u8]) -> Result<T, TransportError> {
    let Some((header, body)) = frame.split_at_checked(LENGTH_HEADER_SIZE) else {
        return Err(TransportError::Truncated {
            expected: LENGTH_HEADER_SIZE,
            actual: frame.len(),
        });
    };
    let mut len_buf = [0u8; LENGTH_HEADER_SIZE];
    len_buf.copy_from_slice(header);
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FOLLOWER_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len as usize,
            max: MAX_FOLLOWER_FRAME_SIZE,
        });
    }
    if body.len() != len as usize {
        return Err(TransportError::Truncated {
            expected: len as usize,
            actual: body.len(),
        });
    }
    postcard::from_bytes(body).context(DecodeSnafu)
}
