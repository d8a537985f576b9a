//! The object-file collaborator: owns the mutable file bytes and answers the
//! handful of container-layer questions the editor needs (section ranges,
//! relocations, symbols). Parsing of the container format itself -- ELF
//! section headers, symbol table layout, relocation records -- is delegated
//! to `object`; this module never interprets DWARF.

use std::collections::HashSet;

use object::read::{Object, ObjectSection, ObjectSymbol, RelocationTarget};
use object::{Architecture, Endianness, RelocationFlags, RelocationKind, SymbolKind};

use super::{Error, Result};

const DEBUG_SECTIONS: &[&str] = &[".debug_info", ".debug_abbrev", ".debug_line", ".debug_str"];

/// A candidate relocation targeting `.debug_info`, with enough information
/// for the relocation index to decide whether it is eligible and what its
/// resolved addend is. Produced by [`ObjectImage::debug_info_relocations`].
pub struct RelocationCandidate {
    /// Offset of the relocation within `.debug_info`'s address space (i.e.
    /// relative to its `sh_addr`, not the file).
    pub offset: u64,
    pub implicit_addend: bool,
    pub explicit_addend: i64,
    pub symbol_value: u64,
    pub target_section: Option<String>,
    pub kind: RelocationKind,
    pub flags: RelocationFlags,
    pub size: u8,
}

/// A `STT_FILE` symbol's name, located by its absolute byte offset into the
/// owning image so the symbol-table rewriter can edit it in place.
pub struct FileSymbolName {
    pub offset: usize,
    pub len: usize,
}

/// Mutable in-memory image of an object file plus the read-only metadata
/// extracted from it at construction time.
pub struct ObjectImage {
    data: Vec<u8>,
    endian: Endianness,
    architecture: Architecture,
    sections: Vec<(String, usize, usize)>,
    dirty: HashSet<String>,
    debug_info_address: u64,
    file_symbols: Vec<FileSymbolName>,
    debug_info_relocations: Vec<RelocationCandidate>,
}

impl ObjectImage {
    /// Parse `data` and snapshot everything the editor needs before handing
    /// back ownership of the raw bytes for in-place mutation.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let file = object::read::File::parse(&*data).map_err(Error::object)?;

        let endian = file.endianness();
        let architecture = file.architecture();

        let mut sections = Vec::new();
        for section in file.sections() {
            let Ok(name) = section.name() else {
                continue;
            };
            if let Some((offset, size)) = section.file_range() {
                sections.push((name.to_string(), offset as usize, size as usize));
            }
        }

        let debug_info_address = file
            .section_by_name(".debug_info")
            .map(|s| s.address())
            .unwrap_or(0);

        let mut file_symbols = Vec::new();
        for symbol in file.symbols() {
            if symbol.kind() != SymbolKind::File {
                continue;
            }
            let Ok(name) = symbol.name_bytes() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            // `object` parses names as zero-copy slices of `data`; recover
            // the absolute offset by pointer arithmetic against the buffer
            // we are about to take ownership of.
            let base = data.as_ptr() as usize;
            let ptr = name.as_ptr() as usize;
            if ptr < base || ptr + name.len() > base + data.len() {
                continue;
            }
            file_symbols.push(FileSymbolName {
                offset: ptr - base,
                len: name.len(),
            });
        }

        let mut debug_info_relocations = Vec::new();
        if let Some(section) = file.section_by_name(".debug_info") {
            for (offset, relocation) in section.relocations() {
                let RelocationTarget::Symbol(symbol_index) = relocation.target() else {
                    continue;
                };
                let symbol_value = file
                    .symbol_by_index(symbol_index)
                    .map(|s| s.address())
                    .unwrap_or(0);
                let target_section = file
                    .symbol_by_index(symbol_index)
                    .ok()
                    .and_then(|s| match s.section() {
                        object::read::SymbolSection::Section(index) => {
                            file.section_by_index(index).ok()
                        }
                        _ => None,
                    })
                    .and_then(|s| s.name().ok().map(|n| n.to_string()));
                debug_info_relocations.push(RelocationCandidate {
                    offset,
                    implicit_addend: relocation.has_implicit_addend(),
                    explicit_addend: relocation.addend(),
                    symbol_value,
                    target_section,
                    kind: relocation.kind(),
                    flags: relocation.flags(),
                    size: relocation.size(),
                });
            }
        }

        Ok(ObjectImage {
            data,
            endian,
            architecture,
            sections,
            dirty: HashSet::new(),
            debug_info_address,
            file_symbols,
            debug_info_relocations,
        })
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn debug_info_address(&self) -> u64 {
        self.debug_info_address
    }

    pub fn debug_info_relocations(&self) -> &[RelocationCandidate] {
        &self.debug_info_relocations
    }

    pub fn file_symbols(&self) -> &[FileSymbolName] {
        &self.file_symbols
    }

    /// Known `.debug_*` section names present in the object but not
    /// understood by this editor (soft warning, not fatal per spec).
    pub fn unknown_debug_sections(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|(name, _, _)| name.starts_with(".debug_"))
            .filter(|(name, _, _)| !DEBUG_SECTIONS.contains(&name.as_str()))
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    fn range(&self, name: &str) -> Option<(usize, usize)> {
        self.sections
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|&(_, o, s)| (o, s))
    }

    pub fn section_len(&self, name: &str) -> Option<usize> {
        self.range(name).map(|(_, len)| len)
    }

    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        let (offset, size) = self.range(name)?;
        self.data.get(offset..offset + size)
    }

    pub fn section_bytes_mut(&mut self, name: &str) -> Option<&mut [u8]> {
        let (offset, size) = self.range(name)?;
        self.data.get_mut(offset..offset + size)
    }

    /// Borrow two distinct sections mutably at once, for edits that touch
    /// both `.debug_info` and `.debug_str` in the same pass. Panics if `a`
    /// and `b` name the same section.
    pub fn section_pair_mut(&mut self, a: &str, b: &str) -> Option<(&mut [u8], &mut [u8])> {
        assert_ne!(a, b, "section_pair_mut requires two distinct sections");
        let (a_off, a_len) = self.range(a)?;
        let (b_off, b_len) = self.range(b)?;
        if a_off < b_off {
            let (left, right) = self.data.split_at_mut(b_off);
            Some((&mut left[a_off..a_off + a_len], &mut right[..b_len]))
        } else {
            let (left, right) = self.data.split_at_mut(a_off);
            Some((&mut right[..a_len], &mut left[b_off..b_off + b_len]))
        }
    }

    /// Absolute file offset of the start of section `name`, used to turn a
    /// `.debug_info`-relative relocation offset into a pointer into `data`.
    pub fn section_offset(&self, name: &str) -> Option<usize> {
        self.range(name).map(|(o, _)| o)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn mark_dirty(&mut self, name: &str) {
        self.dirty.insert(name.to_string());
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    pub fn dirty_sections(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(|s| s.as_str())
    }
}

impl std::fmt::Debug for ObjectImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectImage")
            .field("len", &self.data.len())
            .field("architecture", &self.architecture)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
