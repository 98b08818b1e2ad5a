//! Binary delta encoding of snapshots against a base snapshot
//!
//! Snapshots taken at regular intervals are stored as diffs against the
//! session's base snapshot. The codec is a pluggable capability: the store only
//! relies on `decode(base, encode(base, target)) == target`, and on `decode`
//! refusing a diff that was produced from a different base.

mod lz4;


pub use lz4::{DIFF_MAGIC, DIFF_VERSION, Lz4DeltaCodec};

/// Encodes and decodes snapshot diffs relative to a base snapshot
pub trait DeltaCodec: Send + Sync + 'static {
    /// Produce a diff that reconstructs `target` when decoded against `base`
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Reconstruct the target snapshot from `base` and a diff produced by [`encode`]
    ///
    /// [`encode`]: DeltaCodec::encode
    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Error decoding a snapshot diff
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Snapshot is too large for the diff header's length fields
    #[error("snapshot of {len} bytes exceeds the diff size limit")]
    TooLarge { len: usize },

    /// Diff does not start with the expected magic bytes
    #[error("diff has an invalid magic header")]
    BadMagic,

    /// Diff was written by an unknown format version
    #[error("unsupported diff version {0}")]
    UnsupportedVersion(u8),

    /// Diff ends before its header is complete
    #[error("diff is truncated")]
    Truncated,

    /// The base supplied to `decode` is not the one the diff was encoded against
    #[error("diff was not encoded against the supplied base snapshot")]
    BaseMismatch,

    /// Compressed payload could not be decompressed
    #[error("failed to decompress diff payload: {0}")]
    Decompress(String),

    /// Decompressed payload length differs from the recorded target length
    #[error("decoded length {actual} does not match expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Reconstructed snapshot does not hash to the recorded target checksum
    #[error("reconstructed snapshot failed checksum verification")]
    ChecksumMismatch,
}
