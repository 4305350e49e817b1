//! Common utilities for Veles.
//!
//! This crate provides foundational types used across all Veles crates:
//!
//! - [`BinaryReader`] - Zero-copy little-endian reading from byte slices
//! - [`Memory`] - Reference-counted byte view shared between containers and the files mapped from them
//! - [`crc`] - CRC-32 (ZIP) and CRC-32C (MGX) checksums

mod error;
mod memory;
mod reader;

pub mod crc;

pub use error::{Error, Result};
pub use memory::Memory;
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
