//! Connection management for a single droid
//!
//! This module handles:
//! - The handshake and optional pairing animation
//! - Keepalive heartbeats while the link is up
//! - Decoding notifications and routing command responses

mod manager;
mod notify;

pub use manager::{ConnectionConfig, DroidConnection};
pub use notify::MotorEvent;
