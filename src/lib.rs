//! A library for rewriting embedded DWARF source paths in object files.
//!
//! Use the [`Rewriter`] struct to read a file, rewrite its debug paths in
//! place, and write it back. [`Config`] selects the base prefix to strip,
//! the destination prefix to substitute, and whether rewritten paths should
//! use Windows separators.
//!
//! Currently, only ELF files with DWARF versions 2 through 4 are supported.
//!
//! # Example
//! ```no_run
//! use dwarf_relocate::{Config, Rewriter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(
//!         Some(b"/build/proj/".to_vec()),
//!         Some(b"/usr/src/debug/proj/".to_vec()),
//!         false,
//!     )?;
//!
//!     let input = std::fs::read("path/to/input")?;
//!     let mut rewriter = Rewriter::read(input)?;
//!     rewriter.edit(&config, None)?;
//!     std::fs::write("path/to/output", rewriter.into_data())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations)]

mod abbrev;
mod byteio;
mod config;
mod die;
mod editor;
mod error;
mod image;
mod line;
mod path;
mod reloc;
mod sink;
mod strpool;
mod symtab;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use sink::{FileSink, SourceListSink};

use image::ObjectImage;

/// A rewriter for an object file's embedded DWARF source paths.
///
/// This struct provides a way to read a file, rewrite it, and write it back.
#[derive(Debug)]
pub struct Rewriter {
    image: ObjectImage,
}

impl Rewriter {
    /// Parse `data` as an object file, keeping ownership of the bytes for
    /// later in-place editing.
    pub fn read(data: Vec<u8>) -> Result<Self> {
        Ok(Self {
            image: ObjectImage::parse(data)?,
        })
    }

    /// Rewrite the file's debug paths according to `config`, optionally
    /// emitting the discovered source file list to `sink`.
    ///
    /// With no destination configured, this only emits to `sink`; the bytes
    /// are left untouched either way unless a destination is set.
    pub fn edit(&mut self, config: &Config, sink: Option<&mut dyn SourceListSink>) -> Result<()> {
        editor::edit(&mut self.image, config, sink)
    }

    /// Returns true if the named section was modified by the last [`edit`](Self::edit) call.
    pub fn is_dirty(&self, section: &str) -> bool {
        self.image.is_dirty(section)
    }

    /// Consume the rewriter and return the (possibly edited) file bytes.
    ///
    /// The length of the returned buffer always equals the length of the
    /// buffer passed to [`read`](Self::read): edits never resize the file.
    pub fn into_data(self) -> Vec<u8> {
        self.image.into_data()
    }
}
