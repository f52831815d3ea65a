use crate::ast;
use crate::loc::Span;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

type Result<T> = std::result::Result<T, SourceError>;

/// The combined schema text for one generator run. All configured
/// schema files are concatenated into a single in-memory document
/// before parsing; every `Span` in the run indexes into this text.
#[derive(Clone, Debug)]
pub struct SchemaSource {
    text: Arc<str>,
    line_offsets: Vec<usize>,
}

impl SchemaSource {
    pub fn from_str(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_offsets = line_offsets(&text);
        Self { text, line_offsets }
    }

    /// Concatenates one or more schema files, separated by newlines so
    /// that a file missing its trailing newline cannot glue two
    /// definitions together.
    pub fn from_files(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut combined = String::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)
                .map_err(|err| SourceError::FileReadError {
                    file_path: path.to_path_buf(),
                    err,
                })?;
            combined.push_str(&content);
            if !combined.ends_with('\n') {
                combined.push('\n');
            }
        }
        Ok(Self::from_str(combined))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte offset of a parser position. `graphql_parser` positions are
    /// 1-based line/column pairs.
    pub fn offset_of(&self, pos: ast::Pos) -> Option<usize> {
        let line_start = *self.line_offsets.get(pos.line.checked_sub(1)?)?;
        let offset = line_start + pos.column.checked_sub(1)?;
        (offset <= self.text.len()).then_some(offset)
    }

    /// Exact source substring covered by `span`.
    pub fn raw_text(&self, span: Span) -> &str {
        let end = span.end.min(self.text.len());
        let start = span.start.min(end);
        &self.text[start..end]
    }

    /// The contiguous block of `#`-prefixed lines immediately preceding
    /// the line containing `offset`, oldest line first, with leading
    /// `#` and whitespace stripped.
    ///
    /// Returns nothing if `offset` is not the first non-whitespace
    /// token on its line. A blank line between the comment block and
    /// the node detaches the block (zero-gap policy).
    pub fn doc_comment(&self, offset: usize) -> Vec<String> {
        let Some(line_idx) = self.line_index(offset) else {
            return vec![];
        };
        if !self.is_first_on_line(line_idx, offset) {
            return vec![];
        }

        let mut block = vec![];
        for idx in (0..line_idx).rev() {
            let line = self.line_text(idx).trim();
            let Some(comment) = line.strip_prefix('#') else {
                break;
            };
            block.push(comment.trim().to_string());
        }
        block.reverse();
        block
    }

    fn line_index(&self, offset: usize) -> Option<usize> {
        if offset > self.text.len() {
            return None;
        }
        Some(self.line_offsets.partition_point(|&start| start <= offset) - 1)
    }

    fn line_text(&self, line_idx: usize) -> &str {
        let start = self.line_offsets[line_idx];
        let end = self
            .line_offsets
            .get(line_idx + 1)
            .copied()
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\n')
    }

    fn is_first_on_line(&self, line_idx: usize, offset: usize) -> bool {
        let start = self.line_offsets[line_idx];
        self.text[start..offset].trim().is_empty()
    }
}

fn line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    offsets.extend(memchr::memchr_iter(b'\n', text.as_bytes()).map(|i| i + 1));
    offsets
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read schema file {file_path:?}: {err}")]
    FileReadError {
        file_path: PathBuf,
        err: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_of_maps_lines_and_columns() {
        let source = SchemaSource::from_str("type Query {\n  todo: Todo\n}\n");
        assert_eq!(source.offset_of(ast::Pos { line: 1, column: 1 }), Some(0));
        assert_eq!(source.offset_of(ast::Pos { line: 2, column: 3 }), Some(15));
        assert_eq!(source.offset_of(ast::Pos { line: 9, column: 1 }), None);
    }

    #[test]
    fn raw_text_returns_exact_substring() {
        let source = SchemaSource::from_str("type Todo { id: ID! }");
        assert_eq!(source.raw_text(Span::new(12, 19)), "id: ID!");
        assert_eq!(source.raw_text(Span::new(12, 999)), "id: ID! }");
    }

    #[test]
    fn doc_comment_collects_contiguous_block_oldest_first() {
        let source = SchemaSource::from_str(
            "# A todo item.\n# Second line.\ntype Todo { id: ID! }\n",
        );
        assert_eq!(
            source.doc_comment(30),
            vec!["A todo item.".to_string(), "Second line.".to_string()],
        );
    }

    #[test]
    fn doc_comment_blank_line_detaches_block() {
        let source = SchemaSource::from_str("# Orphaned comment.\n\ntype Todo\n");
        assert_eq!(source.doc_comment(21), Vec::<String>::new());
    }

    #[test]
    fn doc_comment_requires_first_token_on_line() {
        let source = SchemaSource::from_str("# Comment.\ntype Todo { id: ID }\n");
        // `id` is not the first token on its line.
        assert_eq!(source.doc_comment(23), Vec::<String>::new());
        assert_eq!(source.doc_comment(11), vec!["Comment.".to_string()]);
    }

    #[test]
    fn from_files_joins_with_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.graphql");
        let b = dir.path().join("b.graphql");
        std::fs::write(&a, "type Query { user: User }").unwrap();
        std::fs::write(&b, "type User { id: ID! }").unwrap();

        let source = SchemaSource::from_files(&[a, b]).unwrap();
        assert_eq!(
            source.text(),
            "type Query { user: User }\ntype User { id: ID! }\n",
        );
    }
}
