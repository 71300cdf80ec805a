//! Scoped cycle buffers
//!
//! Every buffer a pass needs is acquired through a [`BufferLedger`] and
//! returned to it when the [`ScopedBuffer`] is dropped, so early returns on
//! failure paths release exactly what was acquired. The ledger counts both
//! sides and can enforce a byte budget modelling the device's memory ceiling.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{CycleError, Result};
use crate::types::{FrameFormat, Resolution};

#[derive(Debug, Default)]
struct LedgerInner {
    acquired: AtomicU64,
    released: AtomicU64,
    bytes_in_use: AtomicUsize,
    budget: Option<usize>,
}

/// Shared acquisition counter for cycle buffers
#[derive(Debug, Clone, Default)]
pub struct BufferLedger {
    inner: Arc<LedgerInner>,
}

impl BufferLedger {
    /// Ledger without a byte ceiling
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that refuses acquisitions beyond `budget` bytes in use
    pub fn with_budget(budget: usize) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                budget: Some(budget),
                ..Default::default()
            }),
        }
    }

    /// Acquire an empty buffer with room for exactly `capacity` bytes.
    pub fn acquire(&self, capacity: usize) -> Result<ScopedBuffer> {
        let inner = &self.inner;
        if let Some(budget) = inner.budget {
            inner
                .bytes_in_use
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_use| {
                    in_use.checked_add(capacity).filter(|total| *total <= budget)
                })
                .map_err(|in_use| CycleError::Allocation {
                    requested: capacity,
                    reason: format!("budget {} bytes, {} in use", budget, in_use),
                })?;
        } else {
            inner.bytes_in_use.fetch_add(capacity, Ordering::AcqRel);
        }

        let mut data = Vec::new();
        if let Err(e) = data.try_reserve_exact(capacity) {
            inner.bytes_in_use.fetch_sub(capacity, Ordering::AcqRel);
            return Err(CycleError::Allocation {
                requested: capacity,
                reason: e.to_string(),
            });
        }

        inner.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(ScopedBuffer {
            data,
            reserved: capacity,
            ledger: Arc::clone(&self.inner),
        })
    }

    /// Total buffers handed out
    pub fn acquired(&self) -> u64 {
        self.inner.acquired.load(Ordering::Acquire)
    }

    /// Total buffers returned
    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Buffers currently alive
    pub fn outstanding(&self) -> u64 {
        self.acquired() - self.released()
    }

    /// Bytes reserved by buffers currently alive
    pub fn bytes_in_use(&self) -> usize {
        self.inner.bytes_in_use.load(Ordering::Acquire)
    }
}

/// Byte buffer returned to its ledger on drop
#[derive(Debug)]
pub struct ScopedBuffer {
    data: Vec<u8>,
    reserved: usize,
    ledger: Arc<LedgerInner>,
}

impl ScopedBuffer {
    /// Bytes this buffer may hold without reallocating
    pub fn capacity(&self) -> usize {
        self.reserved
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replace the contents; fails rather than growing past the reservation.
    pub fn fill_from(&mut self, bytes: &[u8]) -> std::result::Result<(), usize> {
        if bytes.len() > self.reserved {
            return Err(bytes.len());
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Set the length to `len`, zero-filling new bytes.
    pub fn resize_zeroed(&mut self, len: usize) -> std::result::Result<(), usize> {
        if len > self.reserved {
            return Err(len);
        }
        self.data.resize(len, 0);
        Ok(())
    }

    /// Append within the reservation, returning how many bytes fit.
    pub fn append_bounded(&mut self, bytes: &[u8]) -> usize {
        let room = self.reserved - self.data.len();
        let n = room.min(bytes.len());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        self.ledger
            .bytes_in_use
            .fetch_sub(self.reserved, Ordering::AcqRel);
        self.ledger.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// Encoded frame owned by the cycle that captured it
#[derive(Debug)]
pub struct CaptureFrame {
    buf: ScopedBuffer,
    format: FrameFormat,
}

impl CaptureFrame {
    /// Copy `bytes` into a ledger-counted buffer.
    pub fn copy_from(ledger: &BufferLedger, bytes: &[u8], format: FrameFormat) -> Result<Self> {
        let mut buf = ledger.acquire(bytes.len())?;
        buf.append_bounded(bytes);
        Ok(Self { buf, format })
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }
}

/// Packed RGB888 buffer at a declared resolution.
///
/// One instance is decode target, resize target and encode source for a
/// pass; the allocation is sized for the larger of the two shapes up front.
#[derive(Debug)]
pub struct PixelBuffer {
    buf: ScopedBuffer,
    resolution: Resolution,
}

impl PixelBuffer {
    /// Acquire a zeroed buffer at `resolution` with room for `capacity` bytes.
    pub fn acquire(ledger: &BufferLedger, capacity: usize, resolution: Resolution) -> Result<Self> {
        let needed = resolution.rgb_bytes();
        let mut buf = ledger.acquire(capacity.max(needed))?;
        // Cannot fail: reservation covers `needed`
        let _ = buf.resize_zeroed(needed);
        Ok(Self { buf, resolution })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    /// Bytes the allocation can hold
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Keep only the leading bytes, read as an image at a smaller resolution.
    pub fn truncate_to(&mut self, resolution: Resolution) -> Result<()> {
        let needed = resolution.rgb_bytes();
        if needed > self.buf.len() {
            return Err(CycleError::Resize(format!(
                "cannot grow {} image to {} in place",
                self.resolution, resolution
            )));
        }
        // Cannot fail: shrinking stays inside the reservation
        let _ = self.buf.resize_zeroed(needed);
        self.resolution = resolution;
        Ok(())
    }

    /// Overwrite the whole buffer with an image at a new resolution.
    pub fn overwrite(&mut self, resolution: Resolution, rgb: &[u8]) -> Result<()> {
        if rgb.len() != resolution.rgb_bytes() {
            return Err(CycleError::Resize(format!(
                "{} bytes do not describe a {} RGB image",
                rgb.len(),
                resolution
            )));
        }
        self.buf.fill_from(rgb).map_err(|needed| {
            CycleError::Resize(format!(
                "{} image needs {} bytes, buffer holds {}",
                resolution,
                needed,
                self.buf.capacity()
            ))
        })?;
        self.resolution = resolution;
        Ok(())
    }
}
