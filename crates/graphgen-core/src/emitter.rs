use crate::formatter::CodeFormatter;
use crate::formatter::FormatError;
use std::path::PathBuf;
use thiserror::Error;

type Result<T> = std::result::Result<T, EmitError>;

/// Control markers the bound `start_file`/`end_file` template functions
/// splice into a generation unit's rendered output. The emitter scans
/// the stream once and drives the buffer stack from them.
pub const FILE_START_MARK: char = '\u{0002}';
pub const FILE_PATH_MARK: char = '\u{0003}';
pub const FILE_END_MARK: char = '\u{0004}';

pub fn start_file_marker(path: &str) -> String {
    format!("{FILE_START_MARK}{path}{FILE_PATH_MARK}")
}

pub fn end_file_marker() -> String {
    FILE_END_MARK.to_string()
}

/// One finished output file, formatted and line-counted but not yet
/// written. The orchestrator performs all filesystem writes after the
/// join barrier so concurrent units can never race on a path.
#[derive(Clone, Debug, PartialEq)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub lines: usize,
}

#[derive(Debug, Default)]
struct FileBuffer {
    /// `None` for the untagged top-level buffer, whose content is
    /// accumulated and then discarded.
    path: Option<PathBuf>,
    buf: String,
}

/// Nested, named redirection of template output into physical files.
/// One instance per generation unit; instances never share buffers, so
/// no cross-instance locking exists or is needed.
#[derive(Debug)]
pub struct FileEmitter {
    active: FileBuffer,
    parents: Vec<FileBuffer>,
    finished: Vec<EmittedFile>,
    lines: usize,
}

impl FileEmitter {
    pub fn new() -> Self {
        Self {
            active: FileBuffer::default(),
            parents: vec![],
            finished: vec![],
            lines: 0,
        }
    }

    pub fn write(&mut self, text: &str) {
        self.active.buf.push_str(text);
    }

    /// Suspends the active buffer and makes a fresh buffer tagged with
    /// `path` active. Nesting is arbitrary: a file may be opened while
    /// another is still open.
    pub fn start_file(&mut self, path: impl Into<PathBuf>) {
        let parent = std::mem::replace(
            &mut self.active,
            FileBuffer {
                path: Some(path.into()),
                buf: String::new(),
            },
        );
        self.parents.push(parent);
    }

    /// Closes the active buffer: formats its content, counts the
    /// newline-terminated lines, and queues it for writing. An untagged
    /// buffer is discarded without writing.
    pub async fn end_file(&mut self, formatter: &CodeFormatter) -> Result<()> {
        let Some(parent) = self.parents.pop() else {
            return Err(EmitError::UnbalancedEndFile);
        };
        let closed = std::mem::replace(&mut self.active, parent);

        // An untagged buffer, or one tagged with an empty path, is
        // accumulation-only: discard without writing.
        if let Some(path) = closed.path.filter(|p| !p.as_os_str().is_empty()) {
            let bytes = formatter
                .format(closed.buf.as_bytes())
                .await
                .map_err(|err| EmitError::FormatterFailed {
                    path: path.clone(),
                    err,
                })?;
            let lines = count_lines(&bytes);
            self.lines += lines;
            self.finished.push(EmittedFile { path, bytes, lines });
        }

        Ok(())
    }

    /// Scans one rendered output stream, appending plain text to the
    /// active buffer and driving `start_file`/`end_file` from the
    /// embedded control markers.
    pub async fn consume(&mut self, rendered: &str, formatter: &CodeFormatter) -> Result<()> {
        let mut rest = rendered;
        while let Some(idx) = rest.find(|c| c == FILE_START_MARK || c == FILE_END_MARK) {
            self.write(&rest[..idx]);

            let marker = &rest[idx..];
            if marker.starts_with(FILE_START_MARK) {
                let after = &marker[FILE_START_MARK.len_utf8()..];
                let Some(path_end) = after.find(FILE_PATH_MARK) else {
                    return Err(EmitError::MalformedMarker);
                };
                self.start_file(&after[..path_end]);
                rest = &after[path_end + FILE_PATH_MARK.len_utf8()..];
            } else {
                self.end_file(formatter).await?;
                rest = &marker[FILE_END_MARK.len_utf8()..];
            }
        }
        self.write(rest);
        Ok(())
    }

    /// Every `start_file` must have been matched by exactly one
    /// `end_file` before the owning template execution completes.
    pub fn finish(self) -> Result<(Vec<EmittedFile>, usize)> {
        if let Some(parent) = self.parents.last() {
            let path = self
                .active
                .path
                .clone()
                .or_else(|| parent.path.clone())
                .unwrap_or_default();
            return Err(EmitError::UnclosedFile { path });
        }
        Ok((self.finished, self.lines))
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    #[cfg(test)]
    fn active_text(&self) -> &str {
        &self.active.buf
    }
}

impl Default for FileEmitter {
    fn default() -> Self {
        Self::new()
    }
}

fn count_lines(bytes: &[u8]) -> usize {
    memchr::memchr_iter(b'\n', bytes).count()
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("end_file called with no open file (unbalanced start_file/end_file)")]
    UnbalancedEndFile,

    #[error("generation unit finished with file {path:?} still open")]
    UnclosedFile {
        path: PathBuf,
    },

    #[error("malformed file marker in rendered output")]
    MalformedMarker,

    #[error("formatter failed for {path:?}: {err}")]
    FormatterFailed {
        path: PathBuf,
        err: FormatError,
    },
}
