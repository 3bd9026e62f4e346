//! Scratch accumulation of the streamed response.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Collects response fragments in a temp file removed on drop.
///
/// The file is acquired before any network activity and deleted on every
/// exit path, including unwinding.
#[derive(Debug)]
pub struct ScratchSink {
    file: NamedTempFile,
}

impl ScratchSink {
    /// Create the scratch file in the system temp directory.
    pub fn create() -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("plume-response-")
            .suffix(".txt")
            .tempfile()?;
        Ok(Self { file })
    }

    /// Append one fragment.
    pub fn append(&mut self, fragment: &str) -> io::Result<()> {
        self.file.write_all(fragment.as_bytes())
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Path of the scratch file while it exists.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order_and_removes_on_drop() {
        let mut sink = ScratchSink::create().unwrap();
        sink.append("Hello").unwrap();
        sink.append(" world").unwrap();
        sink.flush().unwrap();

        let path = sink.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Hello world");

        drop(sink);
        assert!(!path.exists());
    }
}
