//! The append-only source-list output sink.

use std::fs::File;
use std::io::Write;

#[cfg(feature = "logging")]
use log::warn;

/// Receives NUL-terminated source-path records in traversal order.
///
/// A short write is retried; any other I/O error abandons just that record
/// without aborting the edit (per the non-fatal error policy).
pub trait SourceListSink {
    fn emit(&mut self, path: &[u8]);
}

/// A [`SourceListSink`] that appends records to a file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        FileSink { file }
    }
}

impl SourceListSink for FileSink {
    fn emit(&mut self, path: &[u8]) {
        let mut record = Vec::with_capacity(path.len() + 1);
        record.extend_from_slice(path);
        record.push(0);

        let mut written = 0;
        while written < record.len() {
            match self.file.write(&record[written..]) {
                Ok(0) => {
                    #[cfg(feature = "logging")]
                    warn!("short write to source list, abandoning record");
                    return;
                }
                Ok(n) => written += n,
                Err(_) => {
                    #[cfg(feature = "logging")]
                    warn!("error writing to source list, abandoning record");
                    return;
                }
            }
        }
    }
}

/// Emit `path` to `sink` with whichever of `base`/`dest` it starts with
/// stripped off; prefers `dest` so re-running against an already-rewritten
/// object still reports the right suffix. No-op if neither prefix matches.
pub fn emit_under_prefix(sink: &mut dyn SourceListSink, path: &[u8], base: Option<&[u8]>, dest: Option<&[u8]>) {
    if let Some(dest) = dest {
        if path.starts_with(dest) {
            sink.emit(&path[dest.len()..]);
            return;
        }
    }
    if let Some(base) = base {
        if path.starts_with(base) {
            sink.emit(&path[base.len()..]);
        }
    }
}

#[cfg(test)]
pub(crate) struct VecSink {
    pub records: Vec<Vec<u8>>,
}

#[cfg(test)]
impl VecSink {
    pub fn new() -> Self {
        VecSink {
            records: Vec::new(),
        }
    }
}

#[cfg(test)]
impl SourceListSink for VecSink {
    fn emit(&mut self, path: &[u8]) {
        self.records.push(path.to_vec());
    }
}
