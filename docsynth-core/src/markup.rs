//! Line-oriented markup tokenizer.
//!
//! Recognises a small fixed dialect: `#`/`##`/`###` headings, whole-line `**bold**`
//! headings, `* ` bullets, `|`-delimited tables, `---` rules and inline `**` emphasis.
//! Anything else is a plain paragraph; the tokenizer never fails.

use crate::model::{Block, TextRun};

/// Output of the tokenizer. Table rows are handed over unresolved so the model builder
/// can decide header presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Block(Block),
    /// Consecutive table rows, separator row included.
    TableRows(Vec<Vec<String>>),
}

/// Single-pass tokenizer over the lines of the input, with one line of lookahead for
/// tables. Restart by constructing a new tokenizer over the same text.
pub struct Tokenizer<'a> {
    lines: Vec<&'a str>,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lines: input.split('\n').map(str::trim).collect(),
            cursor: 0,
        }
    }

    /// Index of the next line to be classified.
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn collect_table(&mut self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        while let Some(line) = self.lines.get(self.cursor) {
            if !is_table_row(line) {
                break;
            }
            rows.push(split_cells(line));
            self.cursor += 1;
        }
        rows
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let line = *self.lines.get(self.cursor)?;

        if is_table_row(line) {
            return Some(Token::TableRows(self.collect_table()));
        }

        self.cursor += 1;
        Some(Token::Block(classify_line(line)))
    }
}

/// Classify one trimmed, non-table line.
fn classify_line(line: &str) -> Block {
    if line.is_empty() {
        return Block::EmptyParagraph;
    }
    if is_rule(line) {
        return Block::Rule;
    }
    for (prefix, level) in [("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Block::heading(level, rest.trim());
        }
    }
    // `***` counts: the two markers may share a star, leaving empty text.
    if line.len() >= 3 && line.starts_with("**") && line.ends_with("**") {
        return Block::Heading {
            level: 1,
            text: line.get(2..line.len() - 2).unwrap_or("").trim().to_string(),
            centered: true,
        };
    }
    if let Some(rest) = line.strip_prefix("* ") {
        return Block::BulletItem {
            text: rest.trim().to_string(),
        };
    }
    if line.contains("**") {
        return Block::Paragraph {
            runs: split_emphasis(line),
        };
    }
    Block::Paragraph {
        runs: vec![TextRun::plain(line)],
    }
}

/// `^-{3,}$`
fn is_rule(line: &str) -> bool {
    line.len() >= 3 && line.bytes().all(|b| b == b'-')
}

fn is_table_row(line: &str) -> bool {
    line.starts_with('|') && line.ends_with('|')
}

fn split_cells(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a line into runs, toggling bold at every `**`. Empty segments produce no run;
/// an unmatched trailing `**` leaves the tail in the current state.
pub fn split_emphasis(line: &str) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut bold = false;
    for (i, segment) in line.split("**").enumerate() {
        if i > 0 {
            bold = !bold;
        }
        if !segment.is_empty() {
            runs.push(TextRun {
                text: segment.to_string(),
                bold,
            });
        }
    }
    runs
}
