// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Write side of the shared capture region.
//!
//! The recorder never writes frames; this side exists for the capture simulator and for
//! tests that need a real region to read from.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use ringrec_sys::CONTROL_MAGIC;
use tracing::info;

use crate::{
    Error, FrameWriteAccess, Result, RingGeometry,
    ring::{
        reader::write_source_name,
        region::{ControlMapping, RingMappingMut, control_path, ring_path},
    },
};

pub(crate) struct ProducerContext {
    pub(crate) control: ControlMapping,
    rings: Vec<RingMappingMut>,
    /// One flag per channel while a frame is open for writing.
    open: Vec<AtomicBool>,
    pub(crate) geometry: RingGeometry,
}

impl ProducerContext {
    /// Publishes `frame` as the channel's last written frame.
    pub(crate) fn commit(&self, channel: usize, frame: i64) {
        self.control.block().channel[channel]
            .last_frame
            .store(frame as i32, Ordering::Release);
        self.open[channel].store(false, Ordering::Release);
    }

    pub(crate) fn cancel(&self, channel: usize) {
        self.open[channel].store(false, Ordering::Release);
    }
}

/// Creates a shared region and fills its rings.
///
/// # Examples
///
/// ```no_run
/// use ringrec::{FrameRate, RingGeometry, RingProducer, Timecode};
///
/// # fn main() -> Result<(), ringrec::Error> {
/// let geometry = RingGeometry::packed(2, 50, FrameRate::PAL, (720, 576), (360, 288), 1920);
/// let producer = RingProducer::create("/dev/shm/ringrec", geometry)?;
///
/// let mut frame = producer.open_frame(0)?;
/// frame.set_signal_ok(true);
/// frame.set_ltc(&Timecode::from_text("10:00:00:00", 25));
/// frame.commit();
/// # Ok(())
/// # }
/// ```
pub struct RingProducer {
    context: Arc<ProducerContext>,
    domain: PathBuf,
}

impl RingProducer {
    /// Creates (or replaces) the region in `domain` and publishes it.
    ///
    /// Every channel starts with no frames written.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidGeometry`] if `geometry` does not validate
    /// - [`Error::Io`] if the directory or files cannot be created
    pub fn create(domain: impl AsRef<Path>, geometry: RingGeometry) -> Result<Self> {
        let domain = domain.as_ref();
        geometry.validate()?;
        std::fs::create_dir_all(domain)?;

        let mut control = ControlMapping::create(&control_path(domain))?;
        // SAFETY
        // The control file was just truncated and mapped; the magic is still zero, so no
        // reader uses the block yet.
        let block = unsafe { control.block_mut() };
        geometry.write_control(block)?;
        for channel in &block.channel {
            channel.last_frame.store(-1, Ordering::Relaxed);
        }

        let rings = (0..geometry.channels)
            .map(|channel| RingMappingMut::create(&ring_path(domain, channel), geometry.ring_size()))
            .collect::<Result<Vec<_>>>()?;
        control.block().magic.store(CONTROL_MAGIC, Ordering::Release);
        info!(
            "Published region {} ({} channel(s) of {} frames)",
            domain.display(),
            geometry.channels,
            geometry.ring_len
        );

        Ok(Self {
            context: Arc::new(ProducerContext {
                control,
                rings,
                open: (0..geometry.channels).map(|_| AtomicBool::new(false)).collect(),
                geometry,
            }),
            domain: domain.to_path_buf(),
        })
    }

    pub fn domain(&self) -> &Path {
        &self.domain
    }

    pub fn geometry(&self) -> &RingGeometry {
        &self.context.geometry
    }

    /// Last committed frame of `channel` (-1 before the first).
    pub fn last_frame(&self, channel: usize) -> Result<i64> {
        self.check_channel(channel)?;
        Ok(self.context.control.block().channel[channel]
            .last_frame
            .load(Ordering::Acquire) as i64)
    }

    /// Opens the next frame of `channel` for writing.
    ///
    /// The returned access commits with [`FrameWriteAccess::commit`]; dropping it
    /// without committing leaves the cursor unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelOutOfRange`] for an unknown channel
    /// - [`Error::Other`] if a frame of this channel is already open
    pub fn open_frame(&self, channel: usize) -> Result<FrameWriteAccess<'_>> {
        self.check_channel(channel)?;
        if self.context.open[channel]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Other(format!(
                "A frame of channel {channel} is already open."
            )));
        }
        let geometry = &self.context.geometry;
        let number = self.last_frame(channel)? + 1;
        let slot = number.rem_euclid(geometry.ring_len as i64) as usize;
        // SAFETY
        // The open flag guarantees a single writer per channel, and the slot lies inside
        // the ring, whose size was validated at creation.
        let payload = unsafe {
            self.context.rings[channel]
                .slice_mut(slot * geometry.element_size, geometry.element_size)
        };
        Ok(FrameWriteAccess::new(
            self.context.clone(),
            channel,
            number,
            payload,
        ))
    }

    /// Records frames lost by the (simulated) capture hardware.
    pub fn add_hardware_dropped(&self, channel: usize, frames: i32) -> Result<()> {
        self.check_channel(channel)?;
        self.context.control.block().channel[channel]
            .hw_dropped
            .fetch_add(frames, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_source_name(&self, channel: usize, name: &str) -> Result<()> {
        self.check_channel(channel)?;
        write_source_name(&self.context.control.block().channel[channel].source_name, name);
        Ok(())
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.context.geometry.channels {
            return Err(Error::ChannelOutOfRange(channel));
        }
        Ok(())
    }
}
