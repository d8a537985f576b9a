//! Shared machinery for editing independent NUL-terminated strings that live
//! in a flat, non-resizable byte pool (`.debug_str`, the symbol string
//! table). Rewriting a string shorter than the original shifts every later
//! byte in the pool left to close the gap and zero-pads the freed space at
//! the end of the section, since the section itself can never shrink.
//!
//! Offsets handed to and returned by this type are always in the pool's
//! *original* coordinate space (as stored in whatever references the
//! string), not the post-shift physical layout; [`StringPool::resolve`]
//! translates between the two.

use super::path;
use super::{Error, Result};

/// Tracks the cumulative left-shift applied to the pool so later lookups by
/// original offset still land on the right bytes.
#[derive(Default)]
pub struct StringPool {
    edits: Vec<(usize, usize)>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate an offset expressed in the pool's original coordinate
    /// space into its current physical position.
    pub fn resolve(&self, original_offset: usize) -> usize {
        let shrink: usize = self
            .edits
            .iter()
            .filter(|&&(o, _)| o <= original_offset)
            .map(|&(_, s)| s)
            .sum();
        original_offset - shrink
    }

    fn record(&mut self, original_offset: usize, shrink: usize) {
        if shrink > 0 {
            self.edits.push((original_offset, shrink));
        }
    }
}

fn cstr_len(bytes: &[u8], offset: usize) -> Result<usize> {
    bytes[offset..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::dwarf("unterminated string in string pool"))
}

/// Rewrite the string at `original_offset` (if it starts with `base`) to
/// begin with `dest`, shifting the pool's tail left by the difference and
/// zero-padding the vacated space at the end of `bytes`. Returns `true` if a
/// rewrite occurred.
pub fn rewrite(
    pool: &mut StringPool,
    bytes: &mut [u8],
    original_offset: usize,
    base: &[u8],
    dest: &[u8],
    windows: bool,
) -> Result<bool> {
    let offset = pool.resolve(original_offset);
    let len = cstr_len(bytes, offset)?;
    if len < base.len() || &bytes[offset..offset + base.len()] != base {
        return Ok(false);
    }

    let shrink = base.len() - dest.len();
    bytes[offset..offset + dest.len()].copy_from_slice(dest);
    if shrink > 0 {
        let tail_start = offset + base.len();
        let move_len = bytes.len() - tail_start;
        bytes.copy_within(tail_start..tail_start + move_len, tail_start - shrink);
        let section_len = bytes.len();
        for b in &mut bytes[section_len - shrink..section_len] {
            *b = 0;
        }
    }

    let suffix_len = len - base.len();
    if windows {
        let suffix_start = offset + dest.len();
        path::to_windows_separators(&mut bytes[suffix_start..suffix_start + suffix_len]);
    }

    pool.record(original_offset, shrink);
    Ok(true)
}
