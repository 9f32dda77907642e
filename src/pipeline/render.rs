//! Report rendering: [`AnalysisRecord`] → downloadable file.
//!
//! Rendering happens in two steps. [`layout`] turns the record into an
//! ordered list of styled lines, and that list fixes field presence and
//! order. A [`ReportRenderer`] then draws the lines as plain text or as an
//! A4 PDF. Both steps read only the record (the footer uses `createdAt`, not
//! the wall clock), so rendering the same record twice yields the same
//! bytes and a failed render can simply be retried.
//!
//! The PDF path goes through pdfium and therefore runs in `spawn_blocking`
//! ([`render_blocking_safe`]).

use crate::config::{AnalysisConfig, ReportFormat};
use crate::error::GradeLensError;
use crate::output::{format_number, AnalysisRecord, NarrativeSource, RenderedReport};
use crate::pipeline::text::bind_pdfium;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const REPORT_TITLE: &str = "Student Performance Report";

/// Visual role of a laid-out line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    /// Table row or list entry, indented.
    Item,
    /// Footer and notes.
    Muted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

/// Lay out a record as styled lines in report order.
///
/// Order: title, identity block, overall result, subject table, strengths,
/// improvements, recommendations, footer. Each narrative list is numbered
/// from 1.
pub fn layout(record: &AnalysisRecord) -> Vec<ReportLine> {
    use LineStyle::*;
    let mut lines = vec![ReportLine::new(Title, REPORT_TITLE)];

    lines.push(ReportLine::new(Heading, "Student"));
    for (label, value) in [
        ("Name", &record.student_name),
        ("Roll Number", &record.roll_number),
        ("Class", &record.class),
        ("Term", &record.term),
        ("Attendance", &record.attendance),
        ("Behaviour", &record.behaviour),
    ] {
        lines.push(ReportLine::new(Body, format!("{label}: {value}")));
    }

    lines.push(ReportLine::new(Heading, "Overall Result"));
    lines.push(ReportLine::new(
        Body,
        format!(
            "Overall: {}% - Grade {}",
            format_number(record.overall_percentage),
            record.overall_grade
        ),
    ));

    lines.push(ReportLine::new(Heading, "Subject-wise Performance"));
    for s in &record.subjects {
        let mut row = format!(
            "{}: {}/{} ({}%) - Grade {}",
            s.name,
            format_number(s.marks_obtained),
            format_number(s.max_marks),
            s.percentage().round(),
            s.grade
        );
        if !s.remarks.trim().is_empty() {
            row.push_str(&format!(" - Remarks: {}", s.remarks.trim()));
        }
        lines.push(ReportLine::new(Item, row));
    }

    for (heading, items) in [
        ("Strengths", &record.strengths),
        ("Areas for Improvement", &record.improvements),
        ("Recommendations", &record.recommendations),
    ] {
        lines.push(ReportLine::new(Heading, heading));
        for (i, item) in items.iter().enumerate() {
            lines.push(ReportLine::new(Item, format!("{}. {}", i + 1, item)));
        }
    }

    if record.narrative_source == NarrativeSource::Fallback {
        lines.push(ReportLine::new(
            Muted,
            "Note: the AI analysis was unavailable; feedback above was generated from the marks alone.",
        ));
    }
    lines.push(ReportLine::new(
        Muted,
        format!(
            "Generated {} | Report ID {}",
            record.created_at.format("%Y-%m-%d %H:%M UTC"),
            record.id
        ),
    ));
    lines
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `<student name with whitespace runs as underscores><suffix>`.
pub fn report_file_name(student_name: &str, format: ReportFormat) -> String {
    let stem = RE_WHITESPACE.replace_all(student_name.trim(), "_");
    let stem = stem.replace(['/', '\\'], "_");
    format!("{stem}{}", format.file_suffix())
}

/// Turns an [`AnalysisRecord`] into a downloadable file.
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, record: &AnalysisRecord) -> Result<RenderedReport, GradeLensError>;
}

/// Pick the renderer for a format.
pub fn renderer_for(format: ReportFormat, config: &AnalysisConfig) -> Arc<dyn ReportRenderer> {
    match format {
        ReportFormat::Text => Arc::new(TextReportRenderer),
        ReportFormat::Pdf => Arc::new(PdfReportRenderer::new(config.pdfium_lib_path.clone())),
    }
}

/// Run a renderer off the async worker threads.
pub async fn render_blocking_safe(
    renderer: Arc<dyn ReportRenderer>,
    record: AnalysisRecord,
) -> Result<RenderedReport, GradeLensError> {
    tokio::task::spawn_blocking(move || renderer.render(&record))
        .await
        .map_err(|e| GradeLensError::Internal(format!("Render task panicked: {}", e)))?
}

// ── Plain text ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TextReportRenderer;

impl TextReportRenderer {
    pub fn render_string(&self, record: &AnalysisRecord) -> String {
        let mut out = String::new();
        for line in layout(record) {
            match line.style {
                LineStyle::Title => {
                    out.push_str(&line.text);
                    out.push('\n');
                    out.push_str(&"=".repeat(line.text.chars().count()));
                    out.push('\n');
                }
                LineStyle::Heading => {
                    out.push('\n');
                    out.push_str(&line.text);
                    out.push('\n');
                    out.push_str(&"-".repeat(line.text.chars().count()));
                    out.push('\n');
                }
                LineStyle::Body => {
                    out.push_str(&line.text);
                    out.push('\n');
                }
                LineStyle::Item => {
                    out.push_str("  ");
                    out.push_str(&line.text);
                    out.push('\n');
                }
                LineStyle::Muted => {
                    out.push('\n');
                    out.push_str(&line.text);
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl ReportRenderer for TextReportRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Text
    }

    fn render(&self, record: &AnalysisRecord) -> Result<RenderedReport, GradeLensError> {
        Ok(RenderedReport {
            file_name: report_file_name(&record.student_name, ReportFormat::Text),
            bytes: self.render_string(record).into_bytes(),
            mime_type: ReportFormat::Text.mime_type().to_string(),
        })
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────────

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const ITEM_INDENT: f32 = 14.0;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

fn font_size(style: LineStyle) -> f32 {
    match style {
        LineStyle::Title => 18.0,
        LineStyle::Heading => 13.0,
        LineStyle::Body => 11.0,
        LineStyle::Item => 10.0,
        LineStyle::Muted => 8.0,
    }
}

fn space_before(style: LineStyle) -> f32 {
    match style {
        LineStyle::Heading => 10.0,
        LineStyle::Muted => 6.0,
        _ => 0.0,
    }
}

fn indent(style: LineStyle) -> f32 {
    if style == LineStyle::Item {
        ITEM_INDENT
    } else {
        0.0
    }
}

/// One text run at a fixed position on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f32,
    /// Baseline, measured from the bottom of the page.
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub text: String,
}

/// Greedy word wrap at `max_chars`; words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wrap and paginate laid-out lines onto A4 pages.
pub fn paginate(lines: &[ReportLine]) -> Vec<Vec<PlacedText>> {
    let mut pages: Vec<Vec<PlacedText>> = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let size = font_size(line.style);
        let leading = size * 1.4;
        let x = MARGIN + indent(line.style);
        let max_chars = ((PAGE_WIDTH - MARGIN - x) / (size * AVG_GLYPH_WIDTH)) as usize;
        let bold = matches!(line.style, LineStyle::Title | LineStyle::Heading);

        y -= space_before(line.style);
        for (i, chunk) in wrap_text(&line.text, max_chars).into_iter().enumerate() {
            if y - leading < MARGIN {
                pages.push(Vec::new());
                y = PAGE_HEIGHT - MARGIN;
            }
            y -= leading;
            let x = if i == 0 { x } else { x + ITEM_INDENT / 2.0 };
            if let Some(page) = pages.last_mut() {
                page.push(PlacedText {
                    x,
                    y,
                    size,
                    bold,
                    text: chunk,
                });
            }
        }
    }
    pages
}

/// Draws the report as an A4 PDF with pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfReportRenderer {
    lib_path: Option<PathBuf>,
}

impl PdfReportRenderer {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

impl ReportRenderer for PdfReportRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    fn render(&self, record: &AnalysisRecord) -> Result<RenderedReport, GradeLensError> {
        let pages = paginate(&layout(record));
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let bytes = draw_pdf(&pdfium, &pages).map_err(|e| GradeLensError::Render {
            detail: format!("{:?}", e),
        })?;
        debug!("Rendered {} PDF pages, {} bytes", pages.len(), bytes.len());

        Ok(RenderedReport {
            file_name: report_file_name(&record.student_name, ReportFormat::Pdf),
            bytes,
            mime_type: ReportFormat::Pdf.mime_type().to_string(),
        })
    }
}

fn draw_pdf(pdfium: &Pdfium, pages: &[Vec<PlacedText>]) -> Result<Vec<u8>, PdfiumError> {
    let mut document = pdfium.create_new_pdf()?;
    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();

    for placed in pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())?;
        for run in placed {
            page.objects_mut().create_text_object(
                PdfPoints::new(run.x),
                PdfPoints::new(run.y),
                run.text.as_str(),
                if run.bold { bold } else { regular },
                PdfPoints::new(run.size),
            )?;
        }
    }

    document.save_to_bytes()
}
