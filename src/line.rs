//! Line-program header editor: parses the directory and file tables at the
//! head of one `.debug_line` program, emits the absolute source paths they
//! describe, and -- when a destination prefix is configured -- rewrites both
//! tables in place.
//!
//! Runs once per compilation unit, during pass 0 (see `editor.rs`), so it
//! always sees the CU's `comp_dir` as it appeared in the original file: pass
//! 1 is the only pass that may have already rewritten `.debug_info`.

use object::Endianness;

use super::byteio::{read_u16, read_u32, read_uleb128};
use super::config::Config;
use super::image::ObjectImage;
use super::path;
use super::sink::{emit_under_prefix, SourceListSink};
use super::{Error, Result};

struct DirEntry {
    offset: usize,
    len: usize,
}

struct FileEntry {
    name_offset: usize,
    name_len: usize,
    dir_index: u32,
    /// Byte range of the three verbatim uLEBs (dir-index, mtime, length)
    /// that follow the filename; copied through unexamined on rewrite.
    uleb_start: usize,
    uleb_end: usize,
}

struct Header {
    /// Offset, within `.debug_line`, where the table region we may rewrite
    /// starts (right after `standard_opcode_lengths`).
    table_start: usize,
    /// Offset where the opcode stream begins; the rewritten table region
    /// must still end exactly here, since `header_length` never changes.
    program_start: usize,
    dirs: Vec<DirEntry>,
    files: Vec<FileEntry>,
}

fn cstr_len(data: &[u8], offset: usize) -> Result<usize> {
    data.get(offset..)
        .ok_or_else(|| Error::dwarf("line-program table runs past its section"))?
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::dwarf("unterminated string in line-program header"))
}

fn parse_header(data: &[u8], offset: usize, endian: Endianness) -> Result<Header> {
    let mut pos = offset;
    let unit_length =
        read_u32(data, pos, endian).ok_or_else(|| Error::dwarf("truncated line-program unit length"))?;
    if unit_length == 0xffff_ffff {
        return Err(Error::dwarf("64-bit DWARF line program is not supported"));
    }
    pos += 4;
    let unit_end = pos
        .checked_add(unit_length as usize)
        .ok_or_else(|| Error::dwarf("line-program unit length overflows"))?;
    if unit_end > data.len() {
        return Err(Error::dwarf("line-program extent exceeds its section"));
    }

    let version =
        read_u16(data, pos, endian).ok_or_else(|| Error::dwarf("truncated line-program version"))?;
    if !(2..=4).contains(&version) {
        return Err(Error::dwarf(format!(
            "unsupported line-program version {version}"
        )));
    }
    pos += 2;

    let header_length = read_u32(data, pos, endian)
        .ok_or_else(|| Error::dwarf("truncated line-program header length"))?;
    pos += 4;
    let program_start = pos
        .checked_add(header_length as usize)
        .ok_or_else(|| Error::dwarf("line-program header length overflows"))?;
    if program_start > unit_end {
        return Err(Error::dwarf(
            "line-program header length exceeds its unit",
        ));
    }

    pos += 1; // minimum_instruction_length
    if version >= 4 {
        pos += 1; // maximum_operations_per_instruction
    }
    pos += 1; // default_is_stmt
    pos += 1; // line_base
    pos += 1; // line_range
    let opcode_base = *data
        .get(pos)
        .ok_or_else(|| Error::dwarf("truncated line-program opcode base"))?;
    pos += 1;
    pos = pos
        .checked_add(opcode_base.saturating_sub(1) as usize)
        .ok_or_else(|| Error::dwarf("line-program opcode table overflows"))?;
    if pos > program_start {
        return Err(Error::dwarf(
            "line-program standard opcode lengths exceed header",
        ));
    }

    let table_start = pos;

    let mut dirs = Vec::new();
    loop {
        let len = cstr_len(data, pos)?;
        if len == 0 {
            pos += 1;
            break;
        }
        dirs.push(DirEntry { offset: pos, len });
        pos += len + 1;
    }

    let mut files = Vec::new();
    loop {
        let name_len = cstr_len(data, pos)?;
        if name_len == 0 {
            pos += 1;
            break;
        }
        let name_offset = pos;
        pos += name_len + 1;
        let uleb_start = pos;
        let dir_index = read_uleb128(data, &mut pos)
            .ok_or_else(|| Error::dwarf("truncated file-table directory index"))?;
        read_uleb128(data, &mut pos).ok_or_else(|| Error::dwarf("truncated file-table mtime"))?;
        read_uleb128(data, &mut pos).ok_or_else(|| Error::dwarf("truncated file-table length"))?;
        let uleb_end = pos;
        if dir_index as usize > dirs.len() {
            return Err(Error::dwarf("file-table directory index out of range"));
        }
        files.push(FileEntry {
            name_offset,
            name_len,
            dir_index,
            uleb_start,
            uleb_end,
        });
    }

    if pos > program_start {
        return Err(Error::dwarf(
            "line-program directory/file tables exceed header length",
        ));
    }

    Ok(Header {
        table_start,
        program_start,
        dirs,
        files,
    })
}

/// Join `comp_dir`, a directory-table entry, and a filename into an absolute
/// path per the priority rule: an absolute filename wins outright; otherwise
/// an absolute directory entry wins; otherwise fall back to `comp_dir`.
fn build_path(comp_dir: &[u8], dir: Option<&[u8]>, filename: &[u8]) -> Vec<u8> {
    if filename.first() == Some(&b'/') {
        return filename.to_vec();
    }
    let dir = dir.unwrap_or(b".");
    let mut out = Vec::with_capacity(comp_dir.len() + dir.len() + filename.len() + 2);
    if dir.first() == Some(&b'/') {
        out.extend_from_slice(dir);
    } else {
        out.extend_from_slice(comp_dir);
        if !out.is_empty() && out.last() != Some(&b'/') {
            out.push(b'/');
        }
        out.extend_from_slice(dir);
    }
    if !out.is_empty() && out.last() != Some(&b'/') {
        out.push(b'/');
    }
    out.extend_from_slice(filename);
    out
}

/// Rewrite a single directory-table entry: substitute `base` for `dest` when
/// it matches, canonicalizing the remainder; otherwise canonicalize the
/// whole entry. Returns the rewritten bytes (never longer than the input).
fn rewrite_dir_entry(raw: &[u8], config: &Config, windows: bool) -> Vec<u8> {
    if let (Some(base), Some(dest)) = (config.base(), config.dest()) {
        if raw.starts_with(base) {
            let mut remainder = raw[base.len()..].to_vec();
            path::canonicalize(&mut remainder);
            if windows {
                path::to_windows_separators(&mut remainder);
            }
            let mut out = dest.to_vec();
            // An empty remainder means the entry *was* exactly `base`; don't
            // append canonicalize's "." for an empty path in that case.
            if !remainder.is_empty() && remainder != b"." {
                out.extend_from_slice(&remainder);
            }
            return out;
        }
    }
    let mut whole = raw.to_vec();
    path::canonicalize(&mut whole);
    if windows {
        path::to_windows_separators(&mut whole);
    }
    whole
}

fn rewrite_file_name(raw: &[u8], config: &Config) -> Vec<u8> {
    if let (Some(base), Some(dest)) = (config.base(), config.dest()) {
        if raw.starts_with(base) {
            let mut out = dest.to_vec();
            out.extend_from_slice(&raw[base.len()..]);
            return out;
        }
    }
    raw.to_vec()
}

/// Process one line-program header: emit its files to `sink` and, when
/// `dest` is configured, rewrite the directory and file tables in place.
pub fn process(
    image: &mut ObjectImage,
    mut sink: Option<&mut dyn SourceListSink>,
    config: &Config,
    debug_line_offset: usize,
    comp_dir: &[u8],
) -> Result<()> {
    let endian = image.endian();
    let debug_line = image
        .section_bytes(".debug_line")
        .ok_or_else(|| Error::dwarf("stmt_list refers to a missing .debug_line section"))?;
    let header = parse_header(debug_line, debug_line_offset, endian)?;

    // Emission reads the *original* tables, before any rewrite below.
    if sink.is_some() {
        for file in &header.files {
            let filename = &debug_line[file.name_offset..file.name_offset + file.name_len];
            let dir = if file.dir_index == 0 {
                None
            } else {
                let entry = &header.dirs[file.dir_index as usize - 1];
                Some(&debug_line[entry.offset..entry.offset + entry.len])
            };
            let mut abs = build_path(comp_dir, dir, filename);
            path::canonicalize(&mut abs);
            if let Some(sink) = sink.as_deref_mut() {
                emit_under_prefix(sink, &abs, config.base(), config.dest());
            }
        }
    }

    if config.dest().is_none() {
        return Ok(());
    }
    let windows = config.win_path;

    // Directory indices are positional, not byte offsets, so entries can
    // freely change length without needing to renumber file-table references.
    let mut table = Vec::new();
    for dir in &header.dirs {
        let raw = &debug_line[dir.offset..dir.offset + dir.len];
        let rewritten = rewrite_dir_entry(raw, config, windows);
        table.extend_from_slice(&rewritten);
        table.push(0);
    }
    table.push(0); // directory-table terminator

    for file in &header.files {
        let raw = &debug_line[file.name_offset..file.name_offset + file.name_len];
        let rewritten = rewrite_file_name(raw, config);
        table.extend_from_slice(&rewritten);
        table.push(0);
        table.extend_from_slice(&debug_line[file.uleb_start..file.uleb_end]);
    }
    table.push(0); // file-table terminator

    let original_span = header.program_start - header.table_start;
    if table.len() > original_span {
        // Can only happen if dest is longer than base, which Config::new
        // already forbids.
        return Err(Error::dwarf(
            "rewritten line-program tables no longer fit their header",
        ));
    }
    table.resize(original_span, 0);

    let debug_line_mut = image
        .section_bytes_mut(".debug_line")
        .ok_or_else(|| Error::dwarf("stmt_list refers to a missing .debug_line section"))?;
    let region = &mut debug_line_mut[header.table_start..header.program_start];
    if region != table.as_slice() {
        region.copy_from_slice(&table);
        image.mark_dirty(".debug_line");
    }

    Ok(())
}
