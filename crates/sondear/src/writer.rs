//! Output Writer / Aggregator
//!
//! Serializes collected data to a sink at flush time. Two sink roots exist:
//! a directory on disk (production) and an in-memory store (tests, embedded
//! hosts). A failed open or mid-stream write aborts that one flush and
//! surfaces a diagnostic; it never takes down the host process, and the
//! partial file it may leave behind ends without the block terminator so
//! readers can tell it apart from a complete record.
//!
//! Output names come from templates with substitution tokens. The resolved
//! name must be unique per context: `%p` (pid) plus `%c` (process-wide
//! flush counter) guarantee that, and `%t`/`%u`/`%s` are available for
//! humans. Collision between two contexts writing the same path would
//! interleave records and corrupt both outputs, so the default templates
//! always include `%p.%c`.

use crate::result::{SondearError, SondearResult};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide flush counter backing the `%c` token
static FLUSH_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Values substituted into output name templates
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// Process id (`%p`)
    pub pid: u32,
    /// Unix timestamp, seconds (`%t`)
    pub timestamp_secs: i64,
    /// Microsecond fraction (`%u`)
    pub micros: u32,
    /// Script name with directory components stripped (`%s`)
    pub script: String,
    /// Flush counter (`%c`)
    pub counter: u32,
}

impl TemplateContext {
    /// Capture the current process/time context and take the next flush
    /// counter value
    #[must_use]
    pub fn capture(script: &str) -> Self {
        let now = Utc::now();
        let script = Path::new(script)
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
        Self {
            pid: std::process::id(),
            timestamp_secs: now.timestamp(),
            micros: now.timestamp_subsec_micros(),
            script,
            counter: FLUSH_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Resolve an output name template.
///
/// Tokens: `%p` pid, `%t` timestamp, `%u` microseconds, `%s` script name,
/// `%c` flush counter, `%%` literal percent. Unknown tokens and a trailing
/// `%` are a `Template` error; the flush that needed the name is aborted.
pub fn resolve_output_name(template: &str, ctx: &TemplateContext) -> SondearResult<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('p') => {
                let _ = write!(out, "{}", ctx.pid);
            }
            Some('t') => {
                let _ = write!(out, "{}", ctx.timestamp_secs);
            }
            Some('u') => {
                let _ = write!(out, "{:06}", ctx.micros);
            }
            Some('s') => out.push_str(&ctx.script),
            Some('c') => {
                let _ = write!(out, "{}", ctx.counter);
            }
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(SondearError::Template {
                    template: template.to_string(),
                    message: format!("unknown token '%{other}'"),
                })
            }
            None => {
                return Err(SondearError::Template {
                    template: template.to_string(),
                    message: "trailing '%'".to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Where resolved output files land
#[derive(Debug)]
pub enum SinkRoot {
    /// Files under a directory
    Directory(PathBuf),
    /// Named in-memory buffers; hosts without a filesystem, and tests
    Memory(HashMap<String, Vec<u8>>),
}

impl SinkRoot {
    /// Directory-backed root
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    /// In-memory root
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(HashMap::new())
    }

    /// Contents of a named in-memory buffer
    #[must_use]
    pub fn buffer(&self, name: &str) -> Option<&[u8]> {
        match self {
            Self::Memory(buffers) => buffers.get(name).map(Vec::as_slice),
            Self::Directory(_) => None,
        }
    }

    /// Names of all in-memory buffers, sorted
    #[must_use]
    pub fn buffer_names(&self) -> Vec<&str> {
        match self {
            Self::Memory(buffers) => {
                let mut names: Vec<&str> = buffers.keys().map(String::as_str).collect();
                names.sort_unstable();
                names
            }
            Self::Directory(_) => Vec::new(),
        }
    }
}

/// One open output, writing either to a file or a memory buffer
#[derive(Debug)]
pub struct OutputWriter {
    target: WriterTarget,
    bytes_written: u64,
}

#[derive(Debug)]
enum WriterTarget {
    File { file: File },
    Memory { name: String, buffer: Vec<u8> },
}

impl OutputWriter {
    /// Open `name` under the sink root, truncating any previous content
    pub fn open(root: &SinkRoot, name: &str) -> SondearResult<Self> {
        let target = match root {
            SinkRoot::Directory(dir) => WriterTarget::File {
                file: File::create(dir.join(name))?,
            },
            SinkRoot::Memory(_) => WriterTarget::Memory {
                name: name.to_string(),
                buffer: Vec::new(),
            },
        };
        Ok(Self {
            target,
            bytes_written: 0,
        })
    }

    /// Write one chunk; counts bytes on success
    pub fn write_chunk(&mut self, chunk: &str) -> SondearResult<()> {
        match &mut self.target {
            WriterTarget::File { file } => file.write_all(chunk.as_bytes())?,
            WriterTarget::Memory { buffer, .. } => buffer.extend_from_slice(chunk.as_bytes()),
        }
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Finish the output, handing memory buffers back to the root.
    ///
    /// Returns the number of bytes written.
    pub fn finish(self, root: &mut SinkRoot) -> SondearResult<u64> {
        match self.target {
            WriterTarget::File { mut file } => file.flush()?,
            WriterTarget::Memory { name, buffer } => {
                if let SinkRoot::Memory(buffers) = root {
                    buffers.insert(name, buffer);
                }
            }
        }
        Ok(self.bytes_written)
    }

    /// Bytes written so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
