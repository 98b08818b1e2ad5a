//! XOR + LZ4 delta codec
//!
//! The target is XORed byte-wise against the base (base bytes past its end read
//! as zero), so regions the simulation did not touch become zero runs that LZ4
//! collapses to almost nothing. Both buffers are fingerprinted with xxh3 so a
//! diff decoded against the wrong base is rejected instead of producing garbage.

use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use xxhash_rust::xxh3::xxh3_64;

use super::{CodecError, DeltaCodec};

/// Magic bytes at the start of every diff
pub const DIFF_MAGIC: [u8; 4] = *b"RWDF";

/// Current diff format version
pub const DIFF_VERSION: u8 = 1;

/// magic + version + base_len + base_hash + target_len + target_hash
const HEADER_SIZE: usize = 4 + 1 + 4 + 8 + 4 + 8;

/// Delta codec producing LZ4-compressed XOR diffs
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4DeltaCodec;

impl Lz4DeltaCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Length of a snapshot as stored in the header
fn header_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge { len })
}

/// XOR `data` against `base` in place
fn xor_with_base(data: &mut [u8], base: &[u8]) {
    for (byte, base_byte) in data.iter_mut().zip(base.iter()) {
        *byte ^= base_byte;
    }
}

impl DeltaCodec for Lz4DeltaCodec {
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        let base_len = header_len(base.len())?;
        let target_len = header_len(target.len())?;

        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&DIFF_MAGIC);
        header[4] = DIFF_VERSION;
        LittleEndian::write_u32(&mut header[5..9], base_len);
        LittleEndian::write_u64(&mut header[9..17], xxh3_64(base));
        LittleEndian::write_u32(&mut header[17..21], target_len);
        LittleEndian::write_u64(&mut header[21..29], xxh3_64(target));

        let mut xored = target.to_vec();
        xor_with_base(&mut xored, base);
        let payload = compress_prepend_size(&xored);

        let mut diff = Vec::with_capacity(HEADER_SIZE + payload.len());
        diff.extend_from_slice(&header);
        diff.extend_from_slice(&payload);
        Ok(diff)
    }

    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        if diff.len() < HEADER_SIZE {
            return if diff.len() >= 4 && diff[..4] != DIFF_MAGIC {
                Err(CodecError::BadMagic)
            } else {
                Err(CodecError::Truncated)
            };
        }

        let mut cursor = Cursor::new(diff);
        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| CodecError::Truncated)?;
        if magic != DIFF_MAGIC {
            return Err(CodecError::BadMagic);
        }

        let version = cursor.read_u8().map_err(|_| CodecError::Truncated)?;
        if version != DIFF_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let base_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)? as usize;
        let base_hash = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)?;
        if base_len != base.len() || base_hash != xxh3_64(base) {
            return Err(CodecError::BaseMismatch);
        }

        let target_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)? as usize;
        let target_hash = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)?;

        let payload = &diff[HEADER_SIZE..];
        let mut target = decompress_size_prepended(payload)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;
        if target.len() != target_len {
            return Err(CodecError::LengthMismatch {
                expected: target_len,
                actual: target.len(),
            });
        }

        xor_with_base(&mut target, base);
        if xxh3_64(&target) != target_hash {
            return Err(CodecError::ChecksumMismatch);
        }

        Ok(target)
    }
}
