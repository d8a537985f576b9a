//! DIE walker: streams through the compilation units of `.debug_info`,
//! stepping every attribute of every DIE per its form, and acts on the
//! three attributes this editor cares about (`DW_AT_comp_dir`,
//! `DW_AT_name`, `DW_AT_stmt_list`).
//!
//! Runs twice, driven by `editor.rs`: once to observe (capture values, drive
//! the line-program editor, emit to the list sink) and once to mutate
//! (`.debug_info` and `.debug_str`). See [`Pass`].

use object::Endianness;

use super::abbrev::{AbbrevTable, Form};
use super::byteio::{read_u16, read_u32, read_uleb128};
use super::config::Config;
use super::image::ObjectImage;
use super::line;
use super::reloc::RelocationIndex;
use super::sink::{emit_under_prefix, SourceListSink};
use super::strpool::{self, StringPool};
use super::{Error, Result};

const DW_TAG_COMPILE_UNIT: u32 = 0x11;
const DW_TAG_PARTIAL_UNIT: u32 = 0x3c;
const DW_AT_NAME: u32 = 0x03;
const DW_AT_COMP_DIR: u32 = 0x1b;
const DW_AT_STMT_LIST: u32 = 0x10;

/// Which of the two passes over `.debug_info` this call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Capture `comp_dir`/`stmt_list`, drive the line-program editor, emit
    /// to the list sink. Never mutates `.debug_info` or `.debug_str`.
    Observe,
    /// Rewrite `comp_dir`/`name` values that start with the configured base
    /// prefix. Never touches `.debug_line` or the list sink.
    Mutate,
}

enum AttrValue {
    /// A `string`-form value: a NUL-terminated run inline in `.debug_info`.
    Inline { offset: usize, len: usize },
    /// A `strp`/`data4`/`sec_offset`-form value: the raw 4 bytes stored at
    /// `pos`, before relocation is applied.
    OffsetRef { pos: usize, raw: u32 },
    Other,
}

struct CuHeader {
    version: u16,
    abbrev_offset: u32,
    address_size: u8,
    cu_end: usize,
}

const CU_HEADER_LEN: usize = 11;

fn parse_cu_header(data: &[u8], pos: usize, endian: Endianness) -> Result<CuHeader> {
    let unit_length =
        read_u32(data, pos, endian).ok_or_else(|| Error::dwarf("truncated compilation unit"))?;
    if unit_length == 0xffff_ffff {
        return Err(Error::dwarf("64-bit DWARF compilation unit is not supported"));
    }
    let cu_end = pos
        .checked_add(4)
        .and_then(|p| p.checked_add(unit_length as usize))
        .ok_or_else(|| Error::dwarf("compilation unit length overflows"))?;
    if cu_end > data.len() {
        return Err(Error::dwarf("compilation unit extent exceeds its section"));
    }
    let version = read_u16(data, pos + 4, endian)
        .ok_or_else(|| Error::dwarf("truncated compilation unit version"))?;
    if !(2..=4).contains(&version) {
        return Err(Error::dwarf(format!(
            "unsupported compilation unit version {version}"
        )));
    }
    let abbrev_offset = read_u32(data, pos + 6, endian)
        .ok_or_else(|| Error::dwarf("truncated compilation unit abbrev offset"))?;
    let address_size = *data
        .get(pos + 10)
        .ok_or_else(|| Error::dwarf("truncated compilation unit address size"))?;
    Ok(CuHeader {
        version,
        abbrev_offset,
        address_size,
        cu_end,
    })
}

fn cstr_len(data: &[u8], offset: usize) -> Result<usize> {
    data.get(offset..)
        .ok_or_else(|| Error::dwarf("DIE string runs past its section"))?
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::dwarf("unterminated string in .debug_info"))
}

/// Advance `pos` past one attribute's value, per `form`, returning what was
/// read when it is a form this editor acts on.
fn read_attribute(
    data: &[u8],
    pos: &mut usize,
    form: Form,
    version: u16,
    address_size: u8,
    endian: Endianness,
) -> Result<AttrValue> {
    let need = |data: &[u8], pos: usize, n: usize| -> Result<()> {
        if pos + n > data.len() {
            Err(Error::dwarf("DIE attribute runs past its section"))
        } else {
            Ok(())
        }
    };
    Ok(match form {
        Form::Addr => {
            let n = address_size as usize;
            need(data, *pos, n)?;
            *pos += n;
            AttrValue::Other
        }
        Form::Block2 => {
            let len = read_u16(data, *pos, endian)
                .ok_or_else(|| Error::dwarf("truncated block2 length"))?;
            *pos += 2;
            need(data, *pos, len as usize)?;
            *pos += len as usize;
            AttrValue::Other
        }
        Form::Block4 => {
            let len = read_u32(data, *pos, endian)
                .ok_or_else(|| Error::dwarf("truncated block4 length"))?;
            *pos += 4;
            need(data, *pos, len as usize)?;
            *pos += len as usize;
            AttrValue::Other
        }
        Form::Data2 | Form::Ref2 => {
            need(data, *pos, 2)?;
            *pos += 2;
            AttrValue::Other
        }
        Form::Data4 | Form::SecOffset => {
            let raw =
                read_u32(data, *pos, endian).ok_or_else(|| Error::dwarf("truncated data4/sec_offset"))?;
            let at = *pos;
            *pos += 4;
            AttrValue::OffsetRef { pos: at, raw }
        }
        Form::Ref4 => {
            need(data, *pos, 4)?;
            *pos += 4;
            AttrValue::Other
        }
        Form::Data8 | Form::Ref8 | Form::RefSig8 => {
            need(data, *pos, 8)?;
            *pos += 8;
            AttrValue::Other
        }
        Form::String => {
            let start = *pos;
            let len = cstr_len(data, start)?;
            *pos = start + len + 1;
            AttrValue::Inline { offset: start, len }
        }
        Form::Block | Form::Exprloc => {
            let len = read_uleb128(data, pos).ok_or_else(|| Error::dwarf("truncated block length"))?;
            need(data, *pos, len as usize)?;
            *pos += len as usize;
            AttrValue::Other
        }
        Form::Block1 => {
            let len = *data.get(*pos).ok_or_else(|| Error::dwarf("truncated block1 length"))?;
            *pos += 1;
            need(data, *pos, len as usize)?;
            *pos += len as usize;
            AttrValue::Other
        }
        Form::Data1 | Form::Flag | Form::Ref1 => {
            need(data, *pos, 1)?;
            *pos += 1;
            AttrValue::Other
        }
        Form::Sdata | Form::Udata | Form::RefUdata => {
            read_uleb128(data, pos).ok_or_else(|| Error::dwarf("truncated uleb attribute"))?;
            AttrValue::Other
        }
        Form::Strp => {
            let raw = read_u32(data, *pos, endian).ok_or_else(|| Error::dwarf("truncated strp"))?;
            let at = *pos;
            *pos += 4;
            AttrValue::OffsetRef { pos: at, raw }
        }
        Form::RefAddr => {
            let n = if version >= 3 { 4 } else { address_size as usize };
            need(data, *pos, n)?;
            *pos += n;
            AttrValue::Other
        }
        Form::Indirect => {
            let code =
                read_uleb128(data, pos).ok_or_else(|| Error::dwarf("truncated indirect form code"))?;
            let actual = Form::from_code(code)
                .ok_or_else(|| Error::dwarf(format!("unknown indirect form 0x{code:x}")))?;
            return read_attribute(data, pos, actual, version, address_size, endian);
        }
        Form::FlagPresent => AttrValue::Other,
    })
}

fn resolve_offset(reloc: &mut RelocationIndex, debug_info_base: usize, local_pos: usize, raw: u32) -> u32 {
    reloc
        .value_at(debug_info_base + local_pos)
        .map(|addend| addend as u32)
        .unwrap_or(raw)
}

fn derive_comp_dir(name: &[u8]) -> Vec<u8> {
    match name.iter().rposition(|&b| b == b'/') {
        Some(0) => b"/".to_vec(),
        Some(idx) => name[..idx].to_vec(),
        None => name.to_vec(),
    }
}

/// Per-CU state accumulated while observing.
#[derive(Default)]
struct Capture {
    comp_dir: Option<Vec<u8>>,
    stmt_list: Option<u32>,
    name: Option<Vec<u8>>,
}

struct ObserveCtx<'a> {
    data: &'a [u8],
    debug_str: &'a [u8],
    debug_info_base: usize,
    version: u16,
    address_size: u8,
    endian: Endianness,
}

fn string_attr_value(ctx: &ObserveCtx, value: &AttrValue, reloc: &mut RelocationIndex) -> Option<Vec<u8>> {
    match *value {
        AttrValue::Inline { offset, len } => Some(ctx.data[offset..offset + len].to_vec()),
        AttrValue::OffsetRef { pos, raw } => {
            let offset = resolve_offset(reloc, ctx.debug_info_base, pos, raw) as usize;
            let len = ctx.debug_str[offset..].iter().position(|&b| b == 0)?;
            Some(ctx.debug_str[offset..offset + len].to_vec())
        }
        AttrValue::Other => None,
    }
}

fn observe_die(
    ctx: &ObserveCtx,
    pos: &mut usize,
    abbrev: &AbbrevTable,
    reloc: &mut RelocationIndex,
    capture: &mut Capture,
) -> Result<()> {
    let code = read_uleb128(ctx.data, pos).ok_or_else(|| Error::dwarf("truncated DIE abbrev code"))?;
    if code == 0 {
        return Ok(());
    }
    let entry = abbrev
        .get(code)
        .ok_or_else(|| Error::dwarf(format!("unknown abbrev code {code}")))?;

    for attr in &entry.attributes {
        let pos_before = *pos;
        let value = read_attribute(
            ctx.data,
            pos,
            attr.form,
            ctx.version,
            ctx.address_size,
            ctx.endian,
        )?;
        match attr.attribute {
            DW_AT_COMP_DIR => {
                if let Some(s) = string_attr_value(ctx, &value, reloc) {
                    capture.comp_dir = Some(s);
                }
            }
            DW_AT_NAME if matches!(entry.tag, DW_TAG_COMPILE_UNIT | DW_TAG_PARTIAL_UNIT) => {
                if let Some(s) = string_attr_value(ctx, &value, reloc) {
                    capture.name = Some(s);
                }
            }
            DW_AT_STMT_LIST => {
                if let AttrValue::OffsetRef { pos: p, raw } = value {
                    capture.stmt_list = Some(resolve_offset(reloc, ctx.debug_info_base, pos_before, raw));
                    debug_assert_eq!(p, pos_before);
                }
            }
            _ => {}
        }
    }

    if entry.has_children {
        loop {
            let save = *pos;
            let peek = read_uleb128(ctx.data, pos).ok_or_else(|| Error::dwarf("truncated DIE code"))?;
            if peek == 0 {
                break;
            }
            *pos = save;
            observe_die(ctx, pos, abbrev, reloc, capture)?;
        }
    }
    Ok(())
}

struct MutateCtx<'a> {
    version: u16,
    address_size: u8,
    endian: Endianness,
    config: &'a Config,
}

fn rewrite_inline(data: &mut [u8], offset: usize, len: usize, config: &Config) -> bool {
    let (Some(base), Some(dest)) = (config.base(), config.dest()) else {
        return false;
    };
    if len < base.len() || &data[offset..offset + base.len()] != base {
        return false;
    }
    data[offset..offset + dest.len()].copy_from_slice(dest);
    let residual = base.len() - dest.len();
    let sep = if config.win_path { b'\\' } else { b'/' };
    for b in &mut data[offset + dest.len()..offset + dest.len() + residual] {
        *b = sep;
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn mutate_die(
    debug_info: &mut [u8],
    debug_str: &mut [u8],
    pool: &mut StringPool,
    pos: &mut usize,
    debug_info_base: usize,
    abbrev: &AbbrevTable,
    reloc: &mut RelocationIndex,
    ctx: &MutateCtx,
    dirty_info: &mut bool,
    dirty_str: &mut bool,
) -> Result<()> {
    let code = read_uleb128(debug_info, pos).ok_or_else(|| Error::dwarf("truncated DIE abbrev code"))?;
    if code == 0 {
        return Ok(());
    }
    let entry = abbrev
        .get(code)
        .ok_or_else(|| Error::dwarf(format!("unknown abbrev code {code}")))?;

    for attr in &entry.attributes {
        let pos_before = *pos;
        let value = read_attribute(debug_info, pos, attr.form, ctx.version, ctx.address_size, ctx.endian)?;
        let is_name = attr.attribute == DW_AT_NAME
            && matches!(entry.tag, DW_TAG_COMPILE_UNIT | DW_TAG_PARTIAL_UNIT);
        if attr.attribute != DW_AT_COMP_DIR && !is_name {
            continue;
        }
        match value {
            AttrValue::Inline { offset, len } => {
                if rewrite_inline(debug_info, offset, len, ctx.config) {
                    *dirty_info = true;
                }
            }
            AttrValue::OffsetRef { pos: p, raw } => {
                let offset = resolve_offset(reloc, debug_info_base, pos_before, raw) as usize;
                debug_assert_eq!(p, pos_before);
                if let (Some(base), Some(dest)) = (ctx.config.base(), ctx.config.dest()) {
                    if strpool::rewrite(pool, debug_str, offset, base, dest, ctx.config.win_path)? {
                        *dirty_str = true;
                    }
                }
            }
            AttrValue::Other => {}
        }
    }

    if entry.has_children {
        loop {
            let save = *pos;
            let peek = read_uleb128(debug_info, pos).ok_or_else(|| Error::dwarf("truncated DIE code"))?;
            if peek == 0 {
                break;
            }
            *pos = save;
            mutate_die(
                debug_info,
                debug_str,
                pool,
                pos,
                debug_info_base,
                abbrev,
                reloc,
                ctx,
                dirty_info,
                dirty_str,
            )?;
        }
    }
    Ok(())
}

/// Reborrow the sink for a single call without tying the borrow's lifetime
/// to the whole of `run`'s `sink` parameter (a plain `.as_deref_mut()` call
/// on a `&mut dyn Trait` inside a loop does not shrink the borrow the way it
/// would for a concrete type).
fn reborrow_sink<'a>(
    sink: &'a mut Option<&mut dyn SourceListSink>,
) -> Option<&'a mut dyn SourceListSink> {
    match sink {
        Some(s) => Some(&mut **s),
        None => None,
    }
}

/// Walk every compilation unit in `.debug_info` once, performing `pass`.
pub fn run(
    image: &mut ObjectImage,
    reloc: &mut RelocationIndex,
    mut sink: Option<&mut dyn SourceListSink>,
    config: &Config,
    pass: Pass,
) -> Result<()> {
    reloc.reset();
    let endian = image.endian();
    let abbrev_data = image
        .section_bytes(".debug_abbrev")
        .ok_or_else(|| Error::dwarf("object has no .debug_abbrev section"))?
        .to_vec();
    let debug_info_base = image
        .section_offset(".debug_info")
        .ok_or_else(|| Error::dwarf("object has no .debug_info section"))?;

    match pass {
        Pass::Observe => {
            let data = image.section_bytes(".debug_info").unwrap().to_vec();
            let debug_str = image
                .section_bytes(".debug_str")
                .map(|b| b.to_vec())
                .unwrap_or_default();

            let mut pos = 0usize;
            while pos < data.len() {
                let header = parse_cu_header(&data, pos, endian)?;
                let abbrev = AbbrevTable::parse(&abbrev_data, header.abbrev_offset as usize)?;
                let ctx = ObserveCtx {
                    data: &data,
                    debug_str: &debug_str,
                    debug_info_base,
                    version: header.version,
                    address_size: header.address_size,
                    endian,
                };
                let mut cursor = pos + CU_HEADER_LEN;
                let mut capture = Capture::default();
                observe_die(&ctx, &mut cursor, &abbrev, reloc, &mut capture)?;
                if cursor > header.cu_end {
                    return Err(Error::dwarf("compilation unit extent exceeds its section"));
                }

                if capture.comp_dir.is_none() {
                    if let Some(name) = &capture.name {
                        if name.first() == Some(&b'/') {
                            capture.comp_dir = Some(derive_comp_dir(name));
                        }
                    }
                }

                if let Some(stmt_list) = capture.stmt_list {
                    if let Some(comp_dir) = &capture.comp_dir {
                        line::process(image, reborrow_sink(&mut sink), config, stmt_list as usize, comp_dir)?;
                    }
                }
                if let (Some(sink), Some(comp_dir)) = (reborrow_sink(&mut sink), &capture.comp_dir) {
                    emit_under_prefix(sink, comp_dir, config.base(), config.dest());
                }

                pos = header.cu_end;
            }
        }
        Pass::Mutate => {
            let (debug_info, debug_str) = image
                .section_pair_mut(".debug_info", ".debug_str")
                .ok_or_else(|| Error::dwarf("object has no .debug_info/.debug_str section"))?;
            let mut pool = StringPool::new();
            let mut dirty_info = false;
            let mut dirty_str = false;
            let mut pos = 0usize;
            while pos < debug_info.len() {
                let header = parse_cu_header(debug_info, pos, endian)?;
                let abbrev = AbbrevTable::parse(&abbrev_data, header.abbrev_offset as usize)?;
                let ctx = MutateCtx {
                    version: header.version,
                    address_size: header.address_size,
                    endian,
                    config,
                };
                let mut cursor = pos + CU_HEADER_LEN;
                mutate_die(
                    debug_info,
                    debug_str,
                    &mut pool,
                    &mut cursor,
                    debug_info_base,
                    &abbrev,
                    reloc,
                    &ctx,
                    &mut dirty_info,
                    &mut dirty_str,
                )?;
                if cursor > header.cu_end {
                    return Err(Error::dwarf("compilation unit extent exceeds its section"));
                }
                pos = header.cu_end;
            }
            if dirty_info {
                image.mark_dirty(".debug_info");
            }
            if dirty_str {
                image.mark_dirty(".debug_str");
            }
        }
    }
    Ok(())
}
