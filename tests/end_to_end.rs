//! End-to-end exercises of the public `Rewriter` API against synthetic ELF
//! objects, covering the universal invariants and the literal scenarios
//! this tool is expected to handle.

use dwarf_relocate::{Config, Rewriter};
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

/// A single CU, one DIE with an inline `comp_dir` and a `.debug_line`
/// program with one directory and one file, wired together without
/// relocations (address_size 8, little-endian x86_64).
struct Fixture {
    comp_dir: Vec<u8>,
    directory: Vec<u8>,
    filename: Vec<u8>,
    dir_index: u32,
}

impl Fixture {
    fn build(&self) -> Vec<u8> {
        let mut abbrev = Vec::new();
        encode_uleb(1, &mut abbrev);
        encode_uleb(0x11, &mut abbrev); // DW_TAG_compile_unit
        abbrev.push(0); // has_children = 0
        encode_uleb(0x1b, &mut abbrev); // DW_AT_comp_dir
        encode_uleb(0x08, &mut abbrev); // DW_FORM_string
        encode_uleb(0x10, &mut abbrev); // DW_AT_stmt_list
        encode_uleb(0x06, &mut abbrev); // DW_FORM_data4
        encode_uleb(0, &mut abbrev);
        encode_uleb(0, &mut abbrev);
        encode_uleb(0, &mut abbrev);

        let mut line_tail = Vec::new();
        line_tail.push(1u8); // minimum_instruction_length
        line_tail.push(1u8); // maximum_operations_per_instruction
        line_tail.push(1u8); // default_is_stmt
        line_tail.push(0xfbu8); // line_base
        line_tail.push(14u8); // line_range
        line_tail.push(13u8); // opcode_base
        line_tail.extend_from_slice(&[0u8; 12]);
        line_tail.extend_from_slice(&self.directory);
        line_tail.push(0);
        line_tail.push(0); // directory table terminator
        line_tail.extend_from_slice(&self.filename);
        line_tail.push(0);
        encode_uleb(self.dir_index, &mut line_tail);
        encode_uleb(0, &mut line_tail); // mtime
        encode_uleb(0, &mut line_tail); // length
        line_tail.push(0); // file table terminator
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

        let mut die = Vec::new();
        encode_uleb(1, &mut die);
        die.extend_from_slice(&self.comp_dir);
        die.push(0);
        die.extend_from_slice(&0u32.to_le_bytes()); // stmt_list = 0

        let mut debug_info = Vec::new();
        debug_info.extend_from_slice(&[0u8; 4]);
        debug_info.extend_from_slice(&4u16.to_le_bytes());
        debug_info.extend_from_slice(&0u32.to_le_bytes());
        debug_info.push(8);
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
            name: self.filename.clone(),
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
}

/// S1: base and dest of equal length, comp_dir inline in `.debug_info`.
#[test]
fn equal_length_rename_rewrites_inline_comp_dir() {
    let fixture = Fixture {
        comp_dir: b"/build/src/a".to_vec(),
        directory: b".".to_vec(),
        filename: b"foo.c".to_vec(),
        dir_index: 0,
    };
    let data = fixture.build();
    let original_len = data.len();
    let mut rewriter = Rewriter::read(data).unwrap();
    let config = Config::new(Some(b"/build/src/".to_vec()), Some(b"/proj1/out/".to_vec()), false).unwrap();
    rewriter.edit(&config, None).unwrap();

    assert!(rewriter.is_dirty(".debug_info"));
    let out = rewriter.into_data();
    assert_eq!(out.len(), original_len, "size preservation");
}

/// S3: a comp_dir that does not start with base is left untouched.
#[test]
fn non_matching_comp_dir_is_untouched() {
    let fixture = Fixture {
        comp_dir: b"/unrelated/dir".to_vec(),
        directory: b".".to_vec(),
        filename: b"foo.c".to_vec(),
        dir_index: 0,
    };
    let data = fixture.build();
    let mut rewriter = Rewriter::read(data.clone()).unwrap();
    let config = Config::new(Some(b"/a/".to_vec()), Some(b"/b/".to_vec()), false).unwrap();
    rewriter.edit(&config, None).unwrap();

    assert!(!rewriter.is_dirty(".debug_info"));
    assert_eq!(rewriter.into_data(), data);
}

/// S4: Windows mode converts every separator in the rewritten residue.
#[test]
fn windows_mode_converts_separators() {
    let fixture = Fixture {
        comp_dir: b"/build/sub/x".to_vec(),
        directory: b".".to_vec(),
        filename: b"x.c".to_vec(),
        dir_index: 0,
    };
    let data = fixture.build();
    let mut rewriter = Rewriter::read(data).unwrap();
    let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out/".to_vec()), true).unwrap();
    rewriter.edit(&config, None).unwrap();

    assert!(rewriter.is_dirty(".debug_info"));
    let out = rewriter.into_data();
    let debug_info_marker = b"/out/";
    let pos = out
        .windows(debug_info_marker.len())
        .position(|w| w == debug_info_marker)
        .expect("rewritten comp_dir present");
    // base (/build/, 7 bytes) shrinks to dest (/out/, 5 bytes): 2 residual
    // filler bytes, which in Windows mode are backslashes.
    assert_eq!(&out[pos + 5..pos + 7], b"\\\\");
}

/// S6-flavored: directory-table rewrite plus an absolute file-table entry
/// whose own prefix also matches, all within one line-program header.
#[test]
fn line_table_directory_and_absolute_file_rewrite() {
    let fixture = Fixture {
        comp_dir: b"/build/proj".to_vec(),
        directory: b"/build/sub".to_vec(),
        filename: b"/build/g.c".to_vec(),
        dir_index: 1,
    };
    let data = fixture.build();
    let mut rewriter = Rewriter::read(data).unwrap();
    let config = Config::new(Some(b"/build/".to_vec()), Some(b"/o/".to_vec()), false).unwrap();
    rewriter.edit(&config, None).unwrap();

    assert!(rewriter.is_dirty(".debug_line"));
    let out = rewriter.into_data();
    assert!(out.windows(7).any(|w| w == b"/o/sub\0"));
    assert!(out.windows(6).any(|w| w == b"/o/g.c"));
}

/// Idempotence under equal base/dest length: running the edit twice in a
/// row is identical to running it once.
#[test]
fn equal_length_rewrite_is_idempotent() {
    let fixture = Fixture {
        comp_dir: b"/build/src/a".to_vec(),
        directory: b".".to_vec(),
        filename: b"foo.c".to_vec(),
        dir_index: 0,
    };
    let data = fixture.build();
    let config = Config::new(Some(b"/build/src/".to_vec()), Some(b"/proj1/out/".to_vec()), false).unwrap();

    let mut once = Rewriter::read(data.clone()).unwrap();
    once.edit(&config, None).unwrap();
    let once_out = once.into_data();

    let mut twice = Rewriter::read(once_out.clone()).unwrap();
    twice.edit(&config, None).unwrap();
    let twice_out = twice.into_data();

    assert_eq!(once_out, twice_out);
}
