// ai
//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The disk was quiet. Too quiet. A lone process had been tasked with reading
//! a file, one line at a time. The file was gzipped. Nobody said it was gzipped.
//! Line 4,812,113 was `{"half": "a docu`. Line 4,812,114 was blank. The process
//! did not flinch.
//!
//! ## Knowledge Graph 🧠
//! - `FileSourceConfig` — the `[source]` table: file name (stdin when absent),
//!   gzip flag (sniffed from the magic bytes when absent), skip-broken.
//! - `open_input` — opens the file or stdin, wraps it in `MultiGzDecoder` when gzipped.
//! - `LineSource` — a lazy, consume-once sequence of trimmed, non-empty lines.
//!   Optionally drops lines that are not well-formed JSON.
//! - Blocking I/O by design of `std::io::BufRead`; the feeder runs it on
//!   `spawn_blocking` so the async workers never wait on the disk.
//!
//! 🦆 (mandatory, no notes)

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, info};

/// 🗜️ What every gzip stream starts with.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 📂 Where the lines come from.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileSourceConfig {
    /// 📄 Input file. `None` or `-` means stdin.
    #[serde(default)]
    pub file_name: Option<String>,
    /// 🗜️ Force gzip on or off. `None` sniffs the first two bytes.
    #[serde(default, alias = "gzip")]
    pub gzipped: Option<bool>,
    /// 🩹 Drop lines that are not valid JSON instead of sending them.
    #[serde(default)]
    pub skip_broken: bool,
}

impl FileSourceConfig {
    /// 🏷️ A human label for logs and the progress table.
    pub fn display_name(&self) -> &str {
        match self.file_name.as_deref() {
            Some(name) if name != "-" => name,
            _ => "<stdin>",
        }
    }
}

/// 📦 An opened input, ready to be read line by line.
pub struct OpenedInput {
    pub reader: Box<dyn BufRead + Send>,
    /// 📏 Size on disk, when known. Zero for stdin. Compressed size for gzip.
    pub size_hint: u64,
    pub gzipped: bool,
    pub name: String,
}

/// 🚪 Open the configured input: a file, or stdin when none is named.
///
/// # Errors
/// 💀 The file does not exist, cannot be read, or its first bytes cannot be peeked.
pub fn open_input(config: &FileSourceConfig) -> Result<OpenedInput> {
    let the_name = config.display_name().to_string();
    let (raw, size_hint): (Box<dyn io::Read + Send>, u64) = match config.file_name.as_deref() {
        Some(path) if path != "-" => {
            let the_file = File::open(Path::new(path)).with_context(|| {
                format!(
                    "💀 The door to '{path}' would not budge. It might not exist. \
                     The permissions might be wrong. The file remains unopened. We remain outside."
                )
            })?;
            let the_size = the_file.metadata().map(|m| m.len()).unwrap_or(0);
            (Box::new(the_file), the_size)
        }
        _ => (Box::new(io::stdin()), 0),
    };

    let mut the_buffered = BufReader::new(raw);
    let is_gzipped = match config.gzipped {
        Some(forced) => forced,
        None => the_buffered
            .fill_buf()
            .with_context(|| format!("💀 Could not peek at the first bytes of {the_name}"))?
            .starts_with(&GZIP_MAGIC),
    };

    let reader: Box<dyn BufRead + Send> = if is_gzipped {
        debug!("🗜️ {the_name} is gzipped, inflating on the fly");
        Box::new(BufReader::new(MultiGzDecoder::new(the_buffered)))
    } else {
        Box::new(the_buffered)
    };

    info!("📂 start reading from {the_name}");
    Ok(OpenedInput {
        reader,
        size_hint,
        gzipped: is_gzipped,
        name: the_name,
    })
}

/// ✅ Is this line a complete JSON value? Borrowed as raw, never materialized.
pub fn is_json(line: &str) -> bool {
    serde_json::from_str::<&RawValue>(line).is_ok()
}

/// 📜 Lines, trimmed, blanks dropped, broken JSON optionally dropped too.
///
/// Consume-once: after `None` it stays `None`.
pub struct LineSource<R> {
    reader: R,
    skip_broken: bool,
    verbose: bool,
    scratch: Vec<u8>,
    bytes_read: u64,
    lines_skipped: u64,
    exhausted: bool,
}

/// 🎁 The boxed flavor every real run uses.
pub type BoxedLineSource = LineSource<Box<dyn BufRead + Send>>;

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            skip_broken: false,
            verbose: false,
            scratch: Vec::with_capacity(4096),
            bytes_read: 0,
            lines_skipped: 0,
            exhausted: false,
        }
    }

    pub fn with_skip_broken(mut self, skip_broken: bool) -> Self {
        self.skip_broken = skip_broken;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 📏 Raw bytes consumed so far, newlines included (decompressed bytes for gzip).
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// 🩹 Lines dropped by skip-broken so far.
    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped
    }

    /// 📄 The next usable line, or `None` at end of input.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than fatal; the JSON check
    /// (or the cluster) gets the final say on whether the line is any good.
    ///
    /// # Errors
    /// 💀 The underlying reader failed (disk, pipe, corrupt gzip stream).
    pub fn next_line(&mut self) -> Result<Option<String>> {
        while !self.exhausted {
            self.scratch.clear();
            let the_count = self
                .reader
                .read_until(b'\n', &mut self.scratch)
                .context("💀 The input stream broke mid-read. The disk, the pipe, or the gzip trailer is lying.")?;
            if the_count == 0 {
                self.exhausted = true;
                break;
            }
            self.bytes_read += the_count as u64;

            let the_text = String::from_utf8_lossy(&self.scratch);
            let the_line = the_text.trim();
            if the_line.is_empty() {
                continue;
            }
            if self.skip_broken && !is_json(the_line) {
                self.lines_skipped += 1;
                if self.verbose {
                    info!("🩹 skipped line [{the_line}]");
                }
                continue;
            }
            return Ok(Some(the_line.to_string()));
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

impl BoxedLineSource {
    /// 🚪 Open the configured input and wrap it, settings applied.
    pub fn open(config: &FileSourceConfig, verbose: bool) -> Result<(Self, OpenedInput)> {
        let mut the_input = open_input(config)?;
        let the_reader = std::mem::replace(&mut the_input.reader, Box::new(io::empty()));
        let the_source = LineSource::new(the_reader)
            .with_skip_broken(config.skip_broken)
            .with_verbose(verbose);
        Ok((the_source, the_input))
    }
}

impl<R> std::fmt::Debug for LineSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("skip_broken", &self.skip_broken)
            .field("bytes_read", &self.bytes_read)
            .field("lines_skipped", &self.lines_skipped)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
