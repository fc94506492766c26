// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Engine context.
//!
//! [`EngineContext`] bundles the collaborators every session needs: the attached ring,
//! the encoder and writer factories, and the clock workers wait on. It is built once by
//! the process entry point and handed to every component; nothing in the engine is a
//! global.

use std::sync::Arc;

use crate::{
    EncoderFactory, FileWriterFactory, FrameClock, RawEncoderFactory, RecorderSettings, Result,
    RingAccess, SleepClock, WriterFactory,
};

/// Shared handles used by recording sessions.
///
/// Cheap to clone; clones share the same ring mapping and factories.
///
/// # Examples
///
/// ```no_run
/// use ringrec::{EngineContext, RecorderSettings};
///
/// # fn main() -> Result<(), ringrec::Error> {
/// let settings = RecorderSettings::load("/etc/ringrec.json")?;
/// let context = EngineContext::attach(&settings)?;
/// println!("{} channel(s)", context.ring().channel_count());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EngineContext {
    ring: RingAccess,
    encoders: Arc<dyn EncoderFactory>,
    writers: Arc<dyn WriterFactory>,
    clock: Arc<dyn FrameClock>,
}

impl EngineContext {
    /// Creates a context over an attached ring with the built-in raw encoder, file
    /// writers and a sleeping clock.
    pub fn new(ring: RingAccess) -> Self {
        Self {
            ring,
            encoders: Arc::new(RawEncoderFactory),
            writers: Arc::new(FileWriterFactory),
            clock: Arc::new(SleepClock),
        }
    }

    /// Attaches to the region named by `settings`, retrying as configured.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AttachFailed`] if the region does not appear in time.
    pub fn attach(settings: &RecorderSettings) -> Result<Self> {
        let ring = RingAccess::attach(
            &settings.domain,
            settings.timecode_source,
            &settings.attach_options(),
        )?;
        Ok(Self::new(ring))
    }

    pub fn with_encoders(mut self, encoders: Arc<dyn EncoderFactory>) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn with_writers(mut self, writers: Arc<dyn WriterFactory>) -> Self {
        self.writers = writers;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ring(&self) -> &RingAccess {
        &self.ring
    }

    pub fn encoders(&self) -> &Arc<dyn EncoderFactory> {
        &self.encoders
    }

    pub fn writers(&self) -> &Arc<dyn WriterFactory> {
        &self.writers
    }

    pub fn clock(&self) -> &Arc<dyn FrameClock> {
        &self.clock
    }
}
