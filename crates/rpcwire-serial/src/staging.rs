//! Staging buffers for stream-targeted collection I/O.
//!
//! A stream cannot be written through a pointer, so element bytes are
//! staged in memory first. The tier is picked by total size:
//! - below the pooling threshold: a buffer borrowed from a shared pool
//! - up to the maximum single-buffer size: a one-shot heap buffer
//! - beyond that: one bounded chunk reused in a read/write loop

use std::io::{ErrorKind, Read, Write};
use std::ops::Range;
use std::sync::Arc;

use object_pool::Pool;
use tracing::trace;

use crate::error::{Result, SerialError};

/// Default upper bound (exclusive) for pooled staging buffers: 1 KiB.
pub const DEFAULT_POOL_THRESHOLD: usize = 1024;

/// Default maximum single staging allocation: 1 MiB.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Default number of buffers kept in the pool.
pub const DEFAULT_POOL_CAPACITY: usize = 32;

/// Configuration for the staging policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingConfig {
    /// Totals strictly below this use a pooled buffer.
    pub pool_threshold: usize,
    /// Totals above this are streamed through a bounded chunk.
    pub max_buffer_size: usize,
    /// Buffers pre-allocated in the pool.
    pub pool_capacity: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            pool_threshold: DEFAULT_POOL_THRESHOLD,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

/// Staging strategy chosen for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTier {
    Pooled,
    OneShot,
    Chunked,
}

/// Shared staging policy; cheap to clone.
#[derive(Clone)]
pub struct StagingPolicy {
    config: StagingConfig,
    pool: Arc<Pool<Vec<u8>>>,
}

impl StagingPolicy {
    /// Create a policy with default configuration.
    pub fn new() -> Self {
        Self::with_config(StagingConfig::default())
    }

    /// Create a policy with explicit configuration.
    pub fn with_config(config: StagingConfig) -> Self {
        let threshold = config.pool_threshold;
        let pool = Pool::new(config.pool_capacity, move || Vec::with_capacity(threshold));
        Self {
            config,
            pool: Arc::new(pool),
        }
    }

    /// Current staging configuration.
    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// Tier used for a transfer of `total` bytes.
    pub fn tier_for(&self, total: usize) -> StagingTier {
        if total < self.config.pool_threshold {
            StagingTier::Pooled
        } else if total <= self.config.max_buffer_size {
            StagingTier::OneShot
        } else {
            StagingTier::Chunked
        }
    }

    /// Staging buffer length for `total` bytes of `unit`-sized elements.
    ///
    /// Chunks always hold whole elements, and at least one.
    pub fn chunk_len(&self, total: usize, unit: usize) -> usize {
        match self.tier_for(total) {
            StagingTier::Pooled | StagingTier::OneShot => total,
            StagingTier::Chunked => {
                let unit = unit.max(1);
                let whole = self.config.max_buffer_size - self.config.max_buffer_size % unit;
                whole.max(unit).min(total)
            }
        }
    }

    /// Stage `total` bytes into `dst`. `fill` receives the byte range of the
    /// transfer it is producing and the staging slice to fill.
    pub fn write_staged(
        &self,
        dst: &mut dyn Write,
        total: usize,
        unit: usize,
        mut fill: impl FnMut(Range<usize>, &mut [u8]) -> Result<()>,
    ) -> Result<usize> {
        if total == 0 {
            return Ok(0);
        }
        let chunk = self.chunk_len(total, unit);
        self.with_scratch(total, chunk, |buf| {
            let mut offset = 0usize;
            while offset < total {
                let len = chunk.min(total - offset);
                let staged = &mut buf[..len];
                fill(offset..offset + len, staged)?;
                dst.write_all(staged)?;
                offset += len;
            }
            Ok(total)
        })
    }

    /// Read `total` bytes from `src` through staging. `drain` receives the
    /// byte range of the transfer and the bytes read for it.
    ///
    /// A short read fails with `TruncatedStream`, counting every byte
    /// already consumed.
    pub fn read_staged(
        &self,
        src: &mut dyn Read,
        total: usize,
        unit: usize,
        mut drain: impl FnMut(Range<usize>, &[u8]) -> Result<()>,
    ) -> Result<usize> {
        if total == 0 {
            return Ok(0);
        }
        let chunk = self.chunk_len(total, unit);
        self.with_scratch(total, chunk, |buf| {
            let mut offset = 0usize;
            while offset < total {
                let len = chunk.min(total - offset);
                let staged = &mut buf[..len];
                read_exact_counted(src, staged).map_err(|err| err.consumed_after(offset))?;
                drain(offset..offset + len, staged)?;
                offset += len;
            }
            Ok(total)
        })
    }

    fn with_scratch<R>(&self, total: usize, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let tier = self.tier_for(total);
        trace!(total, len, ?tier, "staging buffer");
        match tier {
            StagingTier::Pooled => {
                let threshold = self.config.pool_threshold;
                // Returned to the pool when dropped, including on early error return.
                let mut pooled = self.pool.pull(|| Vec::with_capacity(threshold));
                pooled.clear();
                pooled.resize(len, 0);
                f(&mut pooled[..])
            }
            StagingTier::OneShot | StagingTier::Chunked => {
                let mut buf = vec![0u8; len];
                f(&mut buf)
            }
        }
    }
}

impl Default for StagingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StagingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingPolicy")
            .field("config", &self.config)
            .field("pooled", &self.pool.len())
            .finish()
    }
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
pub fn fill_from(src: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Fill `buf` completely or fail with `TruncatedStream`.
pub fn read_exact_counted(src: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    let filled = fill_from(src, buf)?;
    if filled < buf.len() {
        return Err(SerialError::TruncatedStream {
            expected: buf.len(),
            actual: filled,
            consumed: filled,
        });
    }
    Ok(())
}
