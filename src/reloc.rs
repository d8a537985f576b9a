//! Relocation index: a sorted, filtered view of the relocations that target
//! `.debug_info`, consulted by a single monotonic cursor as the DIE walker
//! advances forward through the section.

use object::{elf, Architecture, RelocationFlags, RelocationKind};

use super::byteio;
use super::image::ObjectImage;
use super::{Error, Result};

const ELIGIBLE_TARGETS: &[&str] = &[".debug_str", ".debug_line", ".debug_abbrev"];

struct Record {
    ptr: usize,
    addend: i64,
}

/// Resolved relocations into `.debug_info`, ordered by pointer.
pub struct RelocationIndex {
    records: Vec<Record>,
    cur: usize,
}

impl RelocationIndex {
    /// Build the index from the raw candidates an [`ObjectImage`] observed
    /// for `.debug_info`.
    pub fn build(image: &ObjectImage) -> Result<Self> {
        let Some(debug_info_offset) = image.section_offset(".debug_info") else {
            return Ok(RelocationIndex {
                records: Vec::new(),
                cur: 0,
            });
        };
        let debug_info_len = image.section_len(".debug_info").unwrap_or(0);
        let debug_info_address = image.debug_info_address();
        let architecture = image.architecture();

        let mut records = Vec::new();
        for candidate in image.debug_info_relocations() {
            let Some(target) = &candidate.target_section else {
                continue;
            };
            if !ELIGIBLE_TARGETS.contains(&target.as_str()) {
                continue;
            }
            if !allowed(architecture, candidate.kind, candidate.flags, candidate.size) {
                return Err(Error::dwarf(format!(
                    "unhandled relocation type {:?} for architecture {:?} on .debug_info",
                    candidate.kind, architecture
                )));
            }

            let local_offset = candidate
                .offset
                .checked_sub(debug_info_address)
                .ok_or_else(|| Error::dwarf("relocation offset precedes .debug_info address"))?
                as usize;
            if local_offset + 4 > debug_info_len {
                return Err(Error::dwarf("relocation offset exceeds .debug_info"));
            }
            let ptr = debug_info_offset + local_offset;

            if candidate.implicit_addend {
                if candidate.symbol_value == 0 {
                    // Section-symbol noise: REL entries with a zero-valued
                    // symbol carry no useful relocation information here.
                    continue;
                }
                let raw = byteio::read_u32(image.data(), ptr, image.endian())
                    .ok_or_else(|| Error::dwarf("truncated relocation target"))?;
                records.push(Record {
                    ptr,
                    addend: i64::from(raw) + candidate.symbol_value as i64,
                });
            } else {
                records.push(Record {
                    ptr,
                    addend: candidate.explicit_addend + candidate.symbol_value as i64,
                });
            }
        }

        records.sort_by_key(|r| r.ptr);

        Ok(RelocationIndex { records, cur: 0 })
    }

    /// Restart the cursor from the beginning; used between the editor's two
    /// passes.
    pub fn reset(&mut self) {
        self.cur = 0;
    }

    /// If a relocation record sits exactly at `ptr`, advance the cursor to
    /// it and return its resolved addend.
    pub fn value_at(&mut self, ptr: usize) -> Option<i64> {
        while self.cur < self.records.len() && self.records[self.cur].ptr < ptr {
            self.cur += 1;
        }
        if self.cur < self.records.len() && self.records[self.cur].ptr == ptr {
            Some(self.records[self.cur].addend)
        } else {
            None
        }
    }
}

fn allowed(architecture: Architecture, kind: RelocationKind, flags: RelocationFlags, size: u8) -> bool {
    match architecture {
        Architecture::X86_64 | Architecture::I386 => {
            matches!(kind, RelocationKind::Absolute) && size == 32
        }
        Architecture::Sparc32Plus | Architecture::Sparc64 => match flags {
            RelocationFlags::Elf { r_type } => r_type == elf::R_SPARC_32 || r_type == elf::R_SPARC_UA32,
            _ => false,
        },
        Architecture::PowerPc | Architecture::PowerPc64 => match flags {
            RelocationFlags::Elf { r_type } => r_type == elf::R_PPC_ADDR32 || r_type == elf::R_PPC_UADDR32,
            _ => false,
        },
        Architecture::S390x => match flags {
            RelocationFlags::Elf { r_type } => r_type == elf::R_390_32,
            _ => false,
        },
        // Itanium (R_IA64_SECREL32LSB) is not represented in `object`'s
        // `Architecture` enum; objects for that target are not supported.
        _ => false,
    }
}
