//! Document model: the block tree produced from markup text.
//!
//! [`build_document`] drives the [`Tokenizer`](crate::markup::Tokenizer) and resolves each
//! buffered table into a [`Block::Table`] via [`build_table`].

use serde::Serialize;
use tracing::debug;

use crate::markup::{Token, Tokenizer};

/// A contiguous span of text sharing one emphasis state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Heading at level 1, 2 or 3. `centered` is set for whole-line `**bold**` headings.
    Heading {
        level: u8,
        text: String,
        centered: bool,
    },
    Paragraph {
        runs: Vec<TextRun>,
    },
    BulletItem {
        text: String,
    },
    Rule,
    /// When `has_header` is set, `rows[0]` is the header row.
    Table {
        rows: Vec<Vec<String>>,
        has_header: bool,
    },
    EmptyParagraph,
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level,
            text: text.into(),
            centered: false,
        }
    }
}

/// Ordered block sequence of one generated document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// Turn the buffered rows of one table into a [`Block::Table`].
///
/// A header is present iff there are at least two rows and the second row, with its
/// cells concatenated, contains a `-`. The second row is then treated as the separator
/// and dropped. Rows of differing width are passed through as-is.
pub fn build_table(mut rows: Vec<Vec<String>>) -> Block {
    let has_header = rows.len() >= 2 && rows[1].concat().contains('-');
    if has_header {
        rows.remove(1);
    }
    debug!(rows = rows.len(), has_header, "Built table block");
    Block::Table { rows, has_header }
}

/// Parse markup text into a [`Document`]. Never fails: unrecognised lines become paragraphs.
pub fn build_document(text: &str) -> Document {
    let blocks: Vec<Block> = Tokenizer::new(text)
        .map(|token| match token {
            Token::Block(block) => block,
            Token::TableRows(rows) => build_table(rows),
        })
        .collect();
    debug!(blocks = blocks.len(), "Built document model");
    Document { blocks }
}
