//! Two-phase driver: builds the relocation index once, then walks
//! `.debug_info` twice -- observation (drives the line-program editor and
//! the list sink) followed by mutation (rewrites `.debug_info` and
//! `.debug_str`). See the module docs on [`die::Pass`] for why the phases
//! cannot be merged.

#[cfg(feature = "logging")]
use log::warn;

use super::config::Config;
use super::die::{self, Pass};
use super::image::ObjectImage;
use super::reloc::RelocationIndex;
use super::sink::SourceListSink;
use super::symtab;
use super::Result;

/// Edit `image` in place per `config`, optionally emitting the discovered
/// source file list to `sink`. Returns once both passes have completed;
/// which sections ended up dirty is visible via [`ObjectImage::is_dirty`].
pub fn edit(image: &mut ObjectImage, config: &Config, sink: Option<&mut dyn SourceListSink>) -> Result<()> {
    for name in image.unknown_debug_sections() {
        #[cfg(feature = "logging")]
        warn!("ignoring unrecognized debug section {name}");
        #[cfg(not(feature = "logging"))]
        let _ = &name;
    }

    let mut reloc = RelocationIndex::build(image)?;

    die::run(image, &mut reloc, sink, config, Pass::Observe)?;

    if config.dest().is_some() {
        die::run(image, &mut reloc, None, config, Pass::Mutate)?;
        symtab::rewrite(image, config)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;
    use object::write::{Object as WriteObject, SectionKind, Symbol, SymbolFlags, SymbolKind, SymbolScope, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness};

    fn encode_uleb(value: u32, out: &mut Vec<u8>) {
        let mut v = value;
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    /// Build a minimal, relocation-free ELF object with one CU whose
    /// `comp_dir` is a `DW_FORM_string` pointing at `/build/proj/` and a
    /// `.debug_line` program with a matching file table, to exercise the
    /// editor end to end without needing to fabricate relocations.
    fn build_fixture(comp_dir: &[u8]) -> Vec<u8> {
        // .debug_abbrev: one abbrev, code 1, DW_TAG_compile_unit,
        // has_children=0, DW_AT_comp_dir/DW_FORM_string, DW_AT_stmt_list/DW_FORM_data4.
        let mut abbrev = Vec::new();
        encode_uleb(1, &mut abbrev);
        encode_uleb(0x11, &mut abbrev);
        abbrev.push(0);
        encode_uleb(0x1b, &mut abbrev);
        encode_uleb(0x08, &mut abbrev); // DW_FORM_string
        encode_uleb(0x10, &mut abbrev);
        encode_uleb(0x06, &mut abbrev); // DW_FORM_data4
        encode_uleb(0, &mut abbrev);
        encode_uleb(0, &mut abbrev);
        encode_uleb(0, &mut abbrev);

        // .debug_line: header with one directory, one file, then a minimal program.
        let mut line_tail = Vec::new();
        line_tail.push(1u8); // minimum_instruction_length
        line_tail.push(1u8); // maximum_operations_per_instruction
        line_tail.push(1u8); // default_is_stmt
        line_tail.push(0xfbu8); // line_base
        line_tail.push(14u8); // line_range
        line_tail.push(13u8); // opcode_base
        line_tail.extend_from_slice(&[0u8; 12]);
        line_tail.extend_from_slice(b"/build/proj/src\0"); // directory 1 (absolute)
        line_tail.push(0); // directory terminator
        line_tail.extend_from_slice(b"main.c\0");
        encode_uleb(1, &mut line_tail); // dir index
        encode_uleb(0, &mut line_tail); // mtime
        encode_uleb(0, &mut line_tail); // length
        line_tail.push(0); // file terminator
        let line_program = vec![0x00u8, 0x01, 0x01];
        let header_length = line_tail.len() as u32;
        let mut debug_line = Vec::new();
        debug_line.extend_from_slice(&[0u8; 4]);
        debug_line.extend_from_slice(&2u16.to_le_bytes());
        debug_line.extend_from_slice(&header_length.to_le_bytes());
        debug_line.extend_from_slice(&line_tail);
        debug_line.extend_from_slice(&line_program);
        let unit_length = (debug_line.len() - 4) as u32;
        debug_line[0..4].copy_from_slice(&unit_length.to_le_bytes());

        // .debug_info: one CU with one DIE (code 1): comp_dir string, then
        // stmt_list pointing at offset 0 in .debug_line.
        let mut die = Vec::new();
        encode_uleb(1, &mut die);
        die.extend_from_slice(comp_dir);
        die.push(0);
        die.extend_from_slice(&0u32.to_le_bytes()); // stmt_list = 0

        let mut debug_info = Vec::new();
        debug_info.extend_from_slice(&[0u8; 4]);
        debug_info.extend_from_slice(&4u16.to_le_bytes()); // version
        debug_info.extend_from_slice(&0u32.to_le_bytes()); // abbrev_offset
        debug_info.push(8); // address_size
        debug_info.extend_from_slice(&die);
        let unit_length = (debug_info.len() - 4) as u32;
        debug_info[0..4].copy_from_slice(&unit_length.to_le_bytes());

        let mut obj = WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let abbrev_id = obj.add_section(Vec::new(), b".debug_abbrev".to_vec(), SectionKind::Debug);
        obj.section_mut(abbrev_id).set_data(abbrev, 1);
        let info_id = obj.add_section(Vec::new(), b".debug_info".to_vec(), SectionKind::Debug);
        obj.section_mut(info_id).set_data(debug_info, 1);
        let line_id = obj.add_section(Vec::new(), b".debug_line".to_vec(), SectionKind::Debug);
        obj.section_mut(line_id).set_data(debug_line, 1);
        let str_id = obj.add_section(Vec::new(), b".debug_str".to_vec(), SectionKind::Debug);
        obj.section_mut(str_id).set_data(Vec::new(), 1);

        let _ = obj.add_symbol(Symbol {
            name: b"main.c".to_vec(),
            value: 0,
            size: 0,
            kind: SymbolKind::File,
            scope: SymbolScope::Compilation,
            weak: false,
            section: SymbolSection::None,
            flags: SymbolFlags::None,
        });

        obj.write().unwrap()
    }

    #[test]
    fn rewrites_inline_comp_dir_and_line_table() {
        let data = build_fixture(b"/build/proj/");
        let mut image = ObjectImage::parse(data).unwrap();
        let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out/".to_vec()), false).unwrap();
        let mut sink = VecSink::new();
        edit(&mut image, &config, Some(&mut sink)).unwrap();

        assert!(image.is_dirty(".debug_info"));
        assert!(image.is_dirty(".debug_line"));

        let debug_info = image.section_bytes(".debug_info").unwrap();
        assert!(debug_info.windows(5).any(|w| w == b"/out/"));

        let debug_line = image.section_bytes(".debug_line").unwrap();
        assert!(debug_line.windows(4).any(|w| w == b"out/"));
    }

    #[test]
    fn observe_only_without_dest_emits_and_does_not_mutate() {
        let data = build_fixture(b"/build/proj/");
        let mut image = ObjectImage::parse(data).unwrap();
        let config = Config::new(Some(b"/build/".to_vec()), None, false).unwrap();
        let mut sink = VecSink::new();
        edit(&mut image, &config, Some(&mut sink)).unwrap();

        assert!(!image.is_dirty(".debug_info"));
        assert!(!sink.records.is_empty());
    }
}
