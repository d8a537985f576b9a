//! Parses one `.debug_abbrev` subtable per compilation unit into a lookup
//! from abbreviation code to (tag, attribute/form list).

use std::collections::HashMap;

use super::byteio::read_uleb128;
use super::{Error, Result};

/// Forms recognized by the DIE walker: the classic DWARF 2-4 forms plus the
/// handful that later standards backported (`sec_offset`, `exprloc`,
/// `flag_present`, `ref_sig8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Addr,
    Block2,
    Block4,
    Data2,
    Data4,
    Data8,
    String,
    Block,
    Block1,
    Data1,
    Flag,
    Sdata,
    Strp,
    Udata,
    RefAddr,
    Ref1,
    Ref2,
    Ref4,
    Ref8,
    RefUdata,
    Indirect,
    SecOffset,
    Exprloc,
    FlagPresent,
    RefSig8,
}

impl Form {
    pub(crate) fn from_code(code: u32) -> Option<Form> {
        use Form::*;
        Some(match code {
            0x01 => Addr,
            0x03 => Block2,
            0x04 => Block4,
            0x05 => Data2,
            0x06 => Data4,
            0x07 => Data8,
            0x08 => String,
            0x09 => Block,
            0x0a => Block1,
            0x0b => Data1,
            0x0c => Flag,
            0x0d => Sdata,
            0x0e => Strp,
            0x0f => Udata,
            0x10 => RefAddr,
            0x11 => Ref1,
            0x12 => Ref2,
            0x13 => Ref4,
            0x14 => Ref8,
            0x15 => RefUdata,
            0x16 => Indirect,
            0x17 => SecOffset,
            0x18 => Exprloc,
            0x19 => FlagPresent,
            0x20 => RefSig8,
            _ => return None,
        })
    }
}

/// A DWARF attribute tag paired with its encoding form.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub attribute: u32,
    pub form: Form,
}

/// One abbreviation: the tag and ordered attribute/form list for a code.
#[derive(Debug, Clone)]
pub struct Abbrev {
    pub tag: u32,
    pub has_children: bool,
    pub attributes: Vec<AttrSpec>,
}

/// The abbreviation subtable for a single compilation unit.
pub struct AbbrevTable {
    entries: HashMap<u32, Abbrev>,
}

impl AbbrevTable {
    pub fn get(&self, code: u32) -> Option<&Abbrev> {
        self.entries.get(&code)
    }

    /// Parse the subtable starting at `offset` within `.debug_abbrev`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut pos = offset;
        loop {
            let code = read_uleb128(data, &mut pos)
                .ok_or_else(|| Error::dwarf("truncated abbrev code"))?;
            if code == 0 {
                break;
            }
            let tag =
                read_uleb128(data, &mut pos).ok_or_else(|| Error::dwarf("truncated abbrev tag"))?;
            let has_children = *data
                .get(pos)
                .ok_or_else(|| Error::dwarf("truncated abbrev children flag"))?
                != 0;
            pos += 1;

            let mut attributes = Vec::new();
            loop {
                let attribute = read_uleb128(data, &mut pos)
                    .ok_or_else(|| Error::dwarf("truncated abbrev attribute"))?;
                let form_code = read_uleb128(data, &mut pos)
                    .ok_or_else(|| Error::dwarf("truncated abbrev form"))?;
                if attribute == 0 && form_code == 0 {
                    break;
                }
                let form = Form::from_code(form_code)
                    .ok_or_else(|| Error::dwarf(format!("unknown abbrev form 0x{form_code:x}")))?;
                attributes.push(AttrSpec { attribute, form });
            }

            if entries
                .insert(
                    code,
                    Abbrev {
                        tag,
                        has_children,
                        attributes,
                    },
                )
                .is_some()
            {
                return Err(Error::dwarf(format!("duplicate abbrev code {code}")));
            }
        }
        Ok(AbbrevTable { entries })
    }
}
