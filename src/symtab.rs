//! Symbol-table file rewriter: applies the same prefix substitution used
//! elsewhere to `STT_FILE` entries in `.strtab`.

use super::config::Config;
use super::image::ObjectImage;
use super::strpool::{self, StringPool};
use super::{Error, Result};

/// Rewrite every `STT_FILE` symbol name under `.strtab` that starts with
/// `config`'s base prefix. No-op if `dest` is not configured, or the object
/// carries no `.strtab`.
pub fn rewrite(image: &mut ObjectImage, config: &Config) -> Result<()> {
    let (Some(base), Some(dest)) = (config.base(), config.dest()) else {
        return Ok(());
    };
    let Some(strtab_offset) = image.section_offset(".strtab") else {
        return Ok(());
    };

    // `FileSymbolName` offsets are absolute (pointer arithmetic against the
    // whole file buffer at parse time); translate to .strtab-local before
    // touching it, so a shrink only shifts bytes within that section.
    let local_offsets: Vec<usize> = image
        .file_symbols()
        .iter()
        .filter_map(|symbol| symbol.offset.checked_sub(strtab_offset))
        .collect();

    let strtab = image
        .section_bytes_mut(".strtab")
        .ok_or_else(|| Error::dwarf("object has no .strtab section"))?;

    let mut pool = StringPool::new();
    let mut dirty = false;
    for offset in local_offsets {
        if strpool::rewrite(&mut pool, strtab, offset, base, dest, config.win_path)? {
            dirty = true;
        }
    }
    if dirty {
        image.mark_dirty(".strtab");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ObjectImage;
    use object::write::{Object as WriteObject, Symbol, SymbolFlags, SymbolKind, SymbolScope, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness};

    fn build_object_with_file_symbol(name: &[u8]) -> Vec<u8> {
        let mut obj = WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let _ = obj.add_symbol(Symbol {
            name: name.to_vec(),
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
    fn rewrites_matching_file_symbol() {
        let data = build_object_with_file_symbol(b"/build/src/main.c");
        let mut image = ObjectImage::parse(data).unwrap();
        let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out/".to_vec()), false).unwrap();
        rewrite(&mut image, &config).unwrap();
        assert!(image.is_dirty(".strtab"));
        let strtab = image.section_bytes(".strtab").unwrap();
        assert!(strtab.windows(5).any(|w| w == b"/out/"));
    }

    #[test]
    fn honors_win_path_flag_rather_than_forcing_it() {
        let data = build_object_with_file_symbol(b"/build/src/main.c");
        let mut image = ObjectImage::parse(data).unwrap();
        let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out/".to_vec()), false).unwrap();
        rewrite(&mut image, &config).unwrap();
        let strtab = image.section_bytes(".strtab").unwrap();
        assert!(!strtab.contains(&b'\\'));
    }

    #[test]
    fn leaves_unmatched_symbol_untouched() {
        let data = build_object_with_file_symbol(b"/elsewhere/main.c");
        let mut image = ObjectImage::parse(data).unwrap();
        let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out/".to_vec()), false).unwrap();
        rewrite(&mut image, &config).unwrap();
        assert!(!image.is_dirty(".strtab"));
    }
}
