//! Session configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// How long to wait for the backend to acknowledge a move intent before
/// treating it as failed and rolling the optimistic mutation back. Generous
/// for one round trip; a user staring at an unconfirmed drag for longer
/// than this is better served by a visible revert.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the best-effort "leaving" notification during teardown.
/// `leave()` must never block indefinitely on a dead connection.
pub const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the session event broadcast channel. Slow subscribers that
/// lag past this many events miss the oldest ones; every event carries (or
/// is followed by) enough state to recover by re-reading the session.
pub const SESSION_EVENT_BUFFER: usize = 64;
