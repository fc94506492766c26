// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Waiting for new frames.

use std::time::Duration;

/// The suspension point of every worker: wait a bounded time for the producer to write
/// more frames, then re-check.
///
/// Workers never block anywhere else. Tests substitute a clock that produces frames
/// itself, making whole recordings deterministic.
pub trait FrameClock: Send + Sync {
    /// Waits at most `timeout`.
    fn wait(&self, timeout: Duration);
}

/// Sleeps for the full timeout, pacing workers to the real producer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SleepClock;

impl FrameClock for SleepClock {
    fn wait(&self, timeout: Duration) {
        std::thread::sleep(timeout);
    }
}
