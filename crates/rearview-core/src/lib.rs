//! Rearview Core - Shared frame types and content fingerprinting
//!
//! This crate provides the foundational types used across all Rearview
//! components: the raw [`FrameBuffer`], the [`Signature`] fingerprint that
//! gates byte-exact identity checks, configuration and the common error
//! type.

pub mod config;
pub mod error;
pub mod frame;
pub mod signature;

pub use config::{DeltaConfig, PoolConfig};
pub use error::{Error, Result};
pub use frame::{FrameBuffer, BYTES_PER_PIXEL};
pub use signature::{frames_identical, Signature};
