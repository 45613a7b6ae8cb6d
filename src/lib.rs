//! # beatcast - beat-synchronized color patterns over multicast
//!
//! One authoring surface edits short looping color sequences ("patterns")
//! and broadcasts them on a local multicast group. Any number of playback
//! clients cache the pattern for their channel and sample it at the step
//! given by a shared, tempo-quantized tick.
//!
//! ## Pieces
//!
//! - [`clock`]: tick sources, free-running or phase-locked to a beat clock
//! - [`pattern`] and [`wire`]: the pattern model and its datagram format
//! - [`distributor`]: publisher/subscriber sockets on the multicast group
//! - [`controller`]: the authoring state machine and its publish loop
//! - [`player`]: the client loop feeding a render callback
//!
//! ## Quick Start
//!
//! ```rust
//! use beatcast::color::Rgba;
//! use beatcast::pattern::ColorPattern;
//!
//! let pattern = ColorPattern::new(16);
//! pattern.set_color_at(0, Rgba::new(255, 0, 0, 255));
//!
//! let bytes = pattern.encode(2);
//! assert_eq!(bytes.len(), 8 + 16 * 4);
//!
//! let client = ColorPattern::new(16);
//! client.decode(&bytes, 2);
//! assert_eq!(client.color_at(0), Some(Rgba::new(255, 0, 0, 255)));
//! ```
//!
//! Channel 0 is the wildcard: every client applies messages tagged 0, and a
//! client configured for channel 0 applies only those.

pub mod clock;
pub mod color;
pub mod config;
pub mod controller;
pub mod distributor;
pub mod error;
pub mod logging;
pub mod palette;
pub mod pattern;
pub mod player;
pub mod render;
pub mod shutdown;
pub mod surface;
pub mod terminal;
pub mod wire;

pub use error::{Error, Result};
