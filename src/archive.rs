//! Input safety checks for untrusted zip containers (xlsx, docx, plain zip).
//!
//! Only central-directory metadata is read. Nothing is decompressed, so the
//! check itself cannot be bomb-triggered.

use std::io::Cursor;

use crate::exec::error::{SandboxError, Violation};

pub const DEFAULT_MAX_COMPRESSION_RATIO: f64 = 50.0;
pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveLimits {
    /// Largest accepted uncompressed/compressed ratio, inclusive.
    pub max_compression_ratio: f64,
    /// Cap on the summed declared uncompressed size.
    pub max_uncompressed_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
        }
    }
}

/// Declared sizes summed over every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveStats {
    pub entries: usize,
    pub compressed: u64,
    pub uncompressed: u64,
}

impl ArchiveStats {
    /// Uncompressed / compressed. An archive that claims data out of zero
    /// compressed bytes has an infinite ratio; an empty one has ratio 0.
    pub fn ratio(&self) -> f64 {
        match (self.compressed, self.uncompressed) {
            (_, 0) => 0.0,
            (0, _) => f64::INFINITY,
            (c, u) => u as f64 / c as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveValidator {
    limits: ArchiveLimits,
}

impl ArchiveValidator {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Reject malformed, bomb-like, or oversized archives.
    pub fn validate(&self, bytes: &[u8]) -> Result<ArchiveStats, SandboxError> {
        let stats = inspect(bytes)?;

        let ratio = stats.ratio();
        if ratio > self.limits.max_compression_ratio {
            return Err(Violation::CompressionRatio {
                ratio,
                max_ratio: self.limits.max_compression_ratio,
            }
            .into());
        }

        if stats.uncompressed > self.limits.max_uncompressed_bytes {
            return Err(Violation::UncompressedSize {
                size: stats.uncompressed,
                max_size: self.limits.max_uncompressed_bytes,
            }
            .into());
        }

        tracing::debug!(
            entries = stats.entries,
            compressed = stats.compressed,
            uncompressed = stats.uncompressed,
            "archive passed safety checks"
        );
        Ok(stats)
    }
}

/// Validate with a custom ratio and the default size cap.
pub fn validate_archive(bytes: &[u8], max_compression_ratio: f64) -> Result<(), SandboxError> {
    ArchiveValidator::new(ArchiveLimits {
        max_compression_ratio,
        ..ArchiveLimits::default()
    })
    .validate(bytes)
    .map(|_| ())
}

fn inspect(bytes: &[u8]) -> Result<ArchiveStats, SandboxError> {
    let malformed = |e: zip::result::ZipError| Violation::MalformedArchive(e.to_string());

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;
    let mut stats = ArchiveStats {
        entries: archive.len(),
        ..ArchiveStats::default()
    };
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(malformed)?;
        stats.compressed = stats.compressed.saturating_add(entry.compressed_size());
        stats.uncompressed = stats.uncompressed.saturating_add(entry.size());
    }
    Ok(stats)
}
