//! # chat-types
//!
//! Wire format types for the pairchat relay protocol.
//!
//! This crate provides the foundational types used across all pairchat crates:
//! - [`UserId`], [`MessageId`] - Identity and ordering types
//! - [`InboundFrame`], [`OutboundFrame`] - JSON frames exchanged over the socket
//! - [`KeyRecord`] - Public key directory entry
//! - [`ErrorKind`], [`FrameError`] - Error taxonomy shared by relay and client

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod frames;
mod ids;

pub use error::{ErrorKind, FrameError};
pub use frames::{InboundFrame, KeyRecord, OutboundFrame};
pub use ids::{MessageId, UserId};
