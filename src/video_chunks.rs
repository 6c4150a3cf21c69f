//! Client-side chunking for uploads larger than the storage limit.
//!
//! A video is cut into fixed-size pieces, each carrying its offset and a
//! SHA-256 digest, uploaded independently (with retry), and stitched back
//! together in index order on the other side.

use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_len: usize,
    pub chunk_size: usize,
    pub chunks: Vec<ChunkSpec>,
}

impl ChunkPlan {
    pub fn new(total_len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        let mut chunks = Vec::with_capacity(total_len.div_ceil(chunk_size));
        let mut offset = 0usize;
        while offset < total_len {
            let len = chunk_size.min(total_len - offset);
            chunks.push(ChunkSpec {
                index: chunks.len(),
                offset,
                len,
            });
            offset += len;
        }
        Ok(Self {
            total_len,
            chunk_size,
            chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoChunk {
    pub index: usize,
    pub total: usize,
    pub offset: usize,
    pub digest: String,
    pub data: Vec<u8>,
}

impl VideoChunk {
    /// Object name used for the chunk in storage.
    pub fn object_name(&self, job_id: &str) -> String {
        format!("{job_id}/chunk_{:05}_of_{:05}", self.index, self.total)
    }
}

pub fn digest_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn split_chunks(bytes: &[u8], chunk_size: usize) -> Result<Vec<VideoChunk>> {
    let plan = ChunkPlan::new(bytes.len(), chunk_size)?;
    let total = plan.len();
    Ok(plan
        .chunks
        .iter()
        .map(|spec| {
            let data = bytes[spec.offset..spec.offset + spec.len].to_vec();
            VideoChunk {
                index: spec.index,
                total,
                offset: spec.offset,
                digest: digest_hex(&data),
                data,
            }
        })
        .collect())
}

/// Rebuilds the original bytes. Chunks may arrive in any order; gaps,
/// duplicates and corrupted pieces are rejected.
pub fn reassemble(mut chunks: Vec<VideoChunk>) -> Result<Vec<u8>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    chunks.sort_by_key(|c| c.index);
    let total = chunks[0].total;
    if chunks.len() != total {
        bail!("expected {total} chunks, got {}", chunks.len());
    }
    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.index != expected {
            bail!("chunk {expected} missing or duplicated");
        }
        if chunk.total != total {
            bail!("chunk {} disagrees on total ({} vs {total})", chunk.index, chunk.total);
        }
        if chunk.offset != out.len() {
            bail!("chunk {} starts at {} but {} bytes precede it", chunk.index, chunk.offset, out.len());
        }
        if digest_hex(&chunk.data) != chunk.digest {
            bail!("chunk {} failed digest check", chunk.index);
        }
        out.extend_from_slice(&chunk.data);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `op` up to `policy.attempts` times, calling `sleep` between tries.
/// Returns the last error once attempts run out.
pub fn retry_with_backoff<T>(
    policy: RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut op: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < attempts {
                    sleep(policy.delay_after(attempt));
                }
                last_err = Some(err);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow!("no attempts made"))
        .context(format!("gave up after {attempts} attempts")))
}

pub fn thread_sleep(delay: Duration) {
    thread::sleep(delay);
}
