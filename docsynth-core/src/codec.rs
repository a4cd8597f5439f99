//! # codec: `.docx` packing of the document model
//!
//! Maps every [`Block`] one-to-one onto WordprocessingML constructs through `docx-rs`
//! and packs the result into a single zip byte buffer.
//!
//! The [`DocumentEncoder`] trait is the seam the persistence tiers use; an encoding
//! failure is reported as [`CodecError`] and handled by falling back to a lower tier.

use std::io::Cursor;

use docx_rs::{
    AbstractNumbering, AlignmentType, BorderType, Docx, IndentLevel, Level, LevelJc, LevelText,
    LineSpacing, NumberFormat, Numbering, NumberingId, Paragraph, ParagraphBorder,
    ParagraphBorderPosition, ParagraphBorders, Run, Shading, Start, Style, StyleType, Table, TableBorder,
    TableBorderPosition, TableCell, TableRow, WidthType,
};
use mockall::automock;
use thiserror::Error;
use tracing::{debug, error};

use crate::model::{Block, Document, TextRun};

/// `Docx::new()` already registers a decimal list under id 1.
const BULLET_NUMBERING_ID: usize = 2;
const RULE_COLOR: &str = "999999";
const TABLE_BORDER_COLOR: &str = "AAAAAA";
const HEADER_FILL: &str = "DDDDDD";
/// Table width in fiftieths of a percent.
const FULL_WIDTH_PCT: usize = 5000;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to pack document: {0}")]
    Pack(String),
}

/// Serialises a [`Document`] into a binary package.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DocumentEncoder: Send + Sync {
    /// File extension of the produced package, without the dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, document: &Document) -> Result<Vec<u8>, CodecError>;
}

/// Production encoder producing Office Open XML word documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxEncoder;

impl DocumentEncoder for DocxEncoder {
    fn extension(&self) -> &'static str {
        "docx"
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>, CodecError> {
        let mut buf = Cursor::new(Vec::new());
        package(document).build().pack(&mut buf).map_err(|e| {
            error!(error = ?e, "docx packing failed");
            CodecError::Pack(e.to_string())
        })?;

        let bytes = buf.into_inner();
        debug!(
            blocks = document.blocks.len(),
            size = bytes.len(),
            "Encoded document as docx"
        );
        Ok(bytes)
    }
}

fn package(document: &Document) -> Docx {
    document.blocks.iter().fold(base_package(), add_block)
}

/// Empty package with the heading styles and bullet numbering the blocks refer to.
fn base_package() -> Docx {
    let bullet = AbstractNumbering::new(BULLET_NUMBERING_ID).add_level(Level::new(
        0,
        Start::new(1),
        NumberFormat::new("bullet"),
        LevelText::new("•"),
        LevelJc::new("left"),
    ));

    Docx::new()
        .add_style(heading_style(1, 32))
        .add_style(heading_style(2, 26))
        .add_style(heading_style(3, 24))
        .add_abstract_numbering(bullet)
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID))
}

/// `size` is in half-points.
fn heading_style(level: u8, size: usize) -> Style {
    Style::new(&format!("Heading{level}"), StyleType::Paragraph)
        .name(&format!("Heading {level}"))
        .size(size)
        .bold()
}

fn spacing(before: u32, after: u32) -> LineSpacing {
    LineSpacing::new().before(before).after(after)
}

fn run(text_run: &TextRun) -> Run {
    let run = Run::new().add_text(&text_run.text);
    if text_run.bold {
        run.bold()
    } else {
        run
    }
}

fn add_block(docx: Docx, block: &Block) -> Docx {
    match block {
        Block::Heading {
            level,
            text,
            centered,
        } => {
            let p = Paragraph::new()
                .add_run(Run::new().add_text(text))
                .style(&format!("Heading{}", (*level).clamp(1, 3)))
                .line_spacing(spacing(200, 100));
            docx.add_paragraph(if *centered {
                p.align(AlignmentType::Center)
            } else {
                p
            })
        }
        Block::Paragraph { runs } => docx.add_paragraph(
            runs.iter()
                .fold(Paragraph::new(), |p, r| p.add_run(run(r)))
                .line_spacing(spacing(100, 100)),
        ),
        Block::BulletItem { text } => docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(text))
                .numbering(NumberingId::new(BULLET_NUMBERING_ID), IndentLevel::new(0))
                .line_spacing(spacing(100, 100)),
        ),
        Block::Rule => docx.add_paragraph(rule()),
        Block::Table { rows, has_header } => docx.add_table(table(rows, *has_header)),
        Block::EmptyParagraph => docx.add_paragraph(Paragraph::new()),
    }
}

/// Empty paragraph carrying only a bottom border.
fn rule() -> Paragraph {
    let mut p = Paragraph::new().line_spacing(spacing(200, 200));
    p.property = p.property.set_borders(
        ParagraphBorders::with_empty().set(
            ParagraphBorder::new(ParagraphBorderPosition::Bottom)
                .val(BorderType::Single)
                .size(6)
                .space(1)
                .color(RULE_COLOR),
        ),
    );
    p
}

fn table(rows: &[Vec<String>], has_header: bool) -> Table {
    let table_rows = rows
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let header = has_header && i == 0;
            // A row needs at least one cell to be valid.
            if cells.is_empty() {
                return TableRow::new(vec![table_cell("", header)]);
            }
            TableRow::new(cells.iter().map(|cell| table_cell(cell, header)).collect())
        })
        .collect();

    [
        TableBorderPosition::Top,
        TableBorderPosition::Bottom,
        TableBorderPosition::Left,
        TableBorderPosition::Right,
        TableBorderPosition::InsideH,
        TableBorderPosition::InsideV,
    ]
    .into_iter()
    .fold(
        Table::new(table_rows).width(FULL_WIDTH_PCT, WidthType::Pct),
        |t, position| {
            t.set_border(
                TableBorder::new(position)
                    .border_type(BorderType::Single)
                    .size(4)
                    .color(TABLE_BORDER_COLOR),
            )
        },
    )
}

fn table_cell(text: &str, header: bool) -> TableCell {
    if header {
        TableCell::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(text).bold()))
            .shading(Shading::new().fill(HEADER_FILL))
    } else {
        TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
    }
}
