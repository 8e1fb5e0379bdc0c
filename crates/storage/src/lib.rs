//! Sample storage for psrstore
//!
//! This crate implements the memory substrate for profile samples:
//! - SwapArena: first-fit allocator over a growable memory-mapped temp file
//! - SwapBuffer: an `[f32]` view of one arena block, released on drop
//! - AmpStorage / AmpBuffer: heap-or-swap policy and the buffer it produces

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod amps;
pub mod swap;

pub use amps::{AmpBuffer, AmpStorage};
pub use swap::{mapped_size_for, page_size, ArenaStats, SwapArena, SwapBuffer, BLOCK_ALIGN};
