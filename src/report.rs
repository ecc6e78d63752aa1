//! # Report Assembly & Pagination
//!
//! The [`Report`] owns the page geometry, the section list, the optional
//! per-page header and footer blocks, and the shared font context. `run`
//! drives every section's story through the column cells of successive
//! pages, then post-processes the finished document: page numbers go into
//! the bottom strip of every page and captured table headers are replayed
//! at the top of each table continuation.
//!
//! Pagination is an explicit state machine. Each step does one thing:
//! start a page, place into the current cell, advance to the next cell, or
//! advance to the next section, possibly reusing the leftover space of the
//! one that just finished.

use std::path::Path;
use std::rc::Rc;

use log::{debug, info};

use crate::block::{BuildContext, ContentBlock, Options, StoryState};
use crate::error::{ReportError, Result};
use crate::font::FontContext;
use crate::geometry::{column_cells, Rect};
use crate::style::{Color, TextAlign};
use crate::surface::{Document, DocumentWriter};

const DEFAULT_MARGINS: (f64, f64, f64, f64) = (36.0, 36.0, 36.0, 30.0);
const DEFAULT_FOOTER_HEIGHT: f64 = 30.0;
const PAGE_NUMBER_STRIP: f64 = 30.0;
const PAGE_NUMBER_SIZE: f64 = 11.0;

/// One unit of report content with optional layout options.
pub struct Section {
    pub block: ContentBlock,
    pub options: Option<Options>,
}

impl Section {
    pub fn new(block: impl Into<ContentBlock>) -> Section {
        Section {
            block: block.into(),
            options: None,
        }
    }

    pub fn options(mut self, options: Options) -> Section {
        self.options = Some(options);
        self
    }
}

/// Pagination steps. Exactly one transition happens per step.
enum Phase {
    BeforeFirstPage,
    StartingNewPage,
    PlacingInCell,
    AdvancingCell,
    AdvancingSection,
    Done,
}

/// A paginated multi-column report.
pub struct Report {
    mediabox: Rect,
    margins: (f64, f64, f64, f64),
    columns: usize,
    sections: Vec<Section>,
    header: Vec<ContentBlock>,
    footer: Vec<ContentBlock>,
    css: String,
    fonts: FontContext,
}

impl Report {
    pub fn new(mediabox: Rect) -> Report {
        Report {
            mediabox,
            margins: DEFAULT_MARGINS,
            columns: 1,
            sections: Vec::new(),
            header: Vec::new(),
            footer: Vec::new(),
            css: String::new(),
            fonts: FontContext::new(),
        }
    }

    /// Margins as (left, top, right, bottom).
    pub fn margins(mut self, margins: (f64, f64, f64, f64)) -> Report {
        self.margins = margins;
        self
    }

    /// Default column count for sections without their own options.
    pub fn columns(mut self, columns: usize) -> Report {
        self.columns = columns.max(1);
        self
    }

    /// Report-level stylesheet, prepended to every block's own.
    pub fn css(mut self, css: impl Into<String>) -> Report {
        self.css = css.into();
        self
    }

    pub fn section(mut self, section: Section) -> Report {
        self.sections.push(section);
        self
    }

    /// Add a page header block, rendered at the top of every page.
    pub fn header(mut self, block: impl Into<ContentBlock>) -> Report {
        self.header.push(block.into());
        self
    }

    /// Add a page footer block, rendered above the page number strip.
    pub fn footer(mut self, block: impl Into<ContentBlock>) -> Report {
        self.footer.push(block.into());
        self
    }

    /// Register a custom font face usable from stylesheets.
    pub fn register_font(
        mut self,
        family: &str,
        weight: u32,
        italic: bool,
        data: Vec<u8>,
    ) -> Result<Report> {
        self.fonts.register(family, weight, italic, data)?;
        Ok(self)
    }

    /// Map stylesheet family names onto registered families. Unknown
    /// targets are skipped with a warning.
    pub fn font_families<'a, I>(mut self, families: I) -> Report
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (family, target) in families {
            self.fonts.alias(family, target);
        }
        self
    }

    /// Render and write the PDF to `path`. The file is only written after
    /// the whole document has rendered.
    pub fn run(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let doc = self.render()?;
        doc.save(path, &self.fonts)
    }

    /// Render and return the PDF bytes.
    pub fn run_to_bytes(&mut self) -> Result<Vec<u8>> {
        let doc = self.render()?;
        doc.to_bytes(&self.fonts)
    }

    /// Render all sections into an in-memory document.
    pub fn render(&mut self) -> Result<Document> {
        if self.sections.is_empty() {
            return Err(ReportError::EmptySections);
        }

        let css = self.css.clone();
        let fonts = Rc::new(self.fonts.clone());
        let margins = self.margins;
        let default_cols = self.columns;
        let report_mediabox = self.mediabox;

        let section_cols = |section: &Section| -> usize {
            match section.options {
                Some(opts) if opts.cols > 0 => opts.cols,
                _ => default_cols,
            }
        };
        // Bare sections break to a fresh page; explicit options only break
        // when newpage is set.
        let section_newpage = |section: &Section| -> bool {
            match section.options {
                Some(opts) => opts.newpage.unwrap_or(false),
                None => true,
            }
        };
        let section_mediabox = |section: &Section| -> Rect {
            section
                .options
                .and_then(|opts| opts.format)
                .map(|f| f.rect())
                .unwrap_or(report_mediabox)
        };

        let mut writer = DocumentWriter::new();
        let mut phase = Phase::BeforeFirstPage;

        let mut sindex = 0usize;
        let mut pno = 0usize;
        let mut mediabox = section_mediabox(&self.sections[0]);
        let mut cols = section_cols(&self.sections[0]);
        let mut area = mediabox.inset(margins);
        let mut header_height = 0.0f64;
        let mut footer_height = DEFAULT_FOOTER_HEIGHT;
        let mut footer_rect = Rect::new(0.0, 0.0, 0.0, 0.0);
        let mut cells: Vec<Rect> = Vec::new();
        let mut cell_index = 0usize;
        let mut filled = Rect::new(0.0, 0.0, 0.0, 0.0);

        loop {
            match phase {
                Phase::BeforeFirstPage => {
                    // Measure header and footer heights with a throwaway
                    // placement; the tallest block wins.
                    let ctx = BuildContext {
                        css: &css,
                        fonts: &fonts,
                        mediabox,
                        area,
                        columns: cols,
                    };
                    for block in &mut self.header {
                        block.make_story(&ctx)?;
                        if let Some(story) = block.story_mut() {
                            let (_, rect) = story.place(&area);
                            header_height = header_height.max(rect.y1);
                            story.reset();
                        }
                    }
                    for block in &mut self.footer {
                        block.make_story(&ctx)?;
                        if let Some(story) = block.story_mut() {
                            let (_, rect) = story.place(&mediabox);
                            footer_height = footer_height.max(rect.y1);
                            story.reset();
                        }
                    }
                    phase = Phase::StartingNewPage;
                }

                Phase::StartingNewPage => {
                    writer.begin_page(mediabox);
                    debug!("page {pno}: mediabox {mediabox:?}, {cols} columns");

                    area = mediabox.inset(margins);
                    let margin_top = area.y0;
                    area.y0 = area.y0.max(header_height);
                    area.y1 -= footer_height;
                    let header_rect = Rect::new(area.x0, margin_top, area.x1, header_height);
                    footer_rect = Rect::new(area.x0, area.y1, area.x1, area.y1 + footer_height);

                    let ctx = BuildContext {
                        css: &css,
                        fonts: &fonts,
                        mediabox,
                        area,
                        columns: cols,
                    };
                    self.sections[sindex].block.make_story(&ctx)?;

                    // Headers render from the top on every page.
                    if !self.header.is_empty() {
                        let page = writer.current_page().expect("page just begun");
                        for block in &mut self.header {
                            rebuild_per_page(block, &ctx)?;
                            if let Some(story) = block.story_mut() {
                                story.place(&header_rect);
                                story.draw(page);
                            }
                        }
                    }

                    cells = column_cells(&area, cols);
                    cell_index = 0;
                    phase = Phase::PlacingInCell;
                }

                Phase::PlacingInCell => {
                    let block = &mut self.sections[sindex].block;

                    // Table continuations reserve room for the repeated
                    // header row; the first occurrence already has one.
                    if let Some(table) = block.table_mut() {
                        if table.repeats_header() {
                            let idx = cell_index.min(table.header_rects.len() - 1);
                            table.header_tops.push(crate::table::HeaderOccurrence {
                                page: pno,
                                left: table.header_rects[idx].x0,
                                top: cells[cell_index].y0,
                            });
                            if table.header_tops.len() > 1 {
                                cells[cell_index].y0 += table.header_rects[idx].height();
                            }
                        }
                    }

                    let story = block
                        .story_mut()
                        .ok_or_else(|| ReportError::Markup("section story not built".to_string()))?;
                    let cell = cells[cell_index];
                    let (more, cell_filled) = story.place(&cell);
                    filled = cell_filled;
                    if let Some(page) = writer.current_page() {
                        story.draw(page);
                    }
                    phase = if more {
                        Phase::AdvancingCell
                    } else {
                        Phase::AdvancingSection
                    };
                }

                Phase::AdvancingCell => {
                    cell_index += 1;
                    if cell_index == cells.len() {
                        finish_page(
                            &mut writer,
                            &mut self.footer,
                            &footer_rect,
                            &css,
                            &fonts,
                            mediabox,
                            area,
                            cols,
                        )?;
                        pno += 1;
                        area = mediabox.inset(margins);
                        phase = Phase::StartingNewPage;
                    } else {
                        phase = Phase::PlacingInCell;
                    }
                }

                Phase::AdvancingSection => {
                    // The finished section may donate its leftover space to
                    // the next one.
                    let advancing = self.sections[sindex].block.advance();
                    *self.sections[sindex].block.state() = StoryState::Exhausted;
                    if filled.y1 < area.y1 && advancing {
                        cells[cell_index].y0 = filled.y1;
                    }

                    sindex += 1;
                    if sindex >= self.sections.len() {
                        finish_page(
                            &mut writer,
                            &mut self.footer,
                            &footer_rect,
                            &css,
                            &fonts,
                            mediabox,
                            area,
                            cols,
                        )?;
                        phase = Phase::Done;
                        continue;
                    }

                    // A changed page format cannot continue on the open page.
                    let next_mediabox = section_mediabox(&self.sections[sindex]);
                    let format_change = next_mediabox != mediabox;
                    mediabox = next_mediabox;
                    cols = section_cols(&self.sections[sindex]);
                    if section_newpage(&self.sections[sindex]) || format_change {
                        finish_page(
                            &mut writer,
                            &mut self.footer,
                            &footer_rect,
                            &css,
                            &fonts,
                            mediabox,
                            area,
                            cols,
                        )?;
                        pno += 1;
                        area = mediabox.inset(margins);
                        phase = Phase::StartingNewPage;
                        continue;
                    }

                    // Continue on the current page. A section that stopped
                    // in the left half of the cells starts in the next cell;
                    // otherwise it continues below the filled content.
                    let cell_len = cells.len();
                    let mut next_where = if cell_index * 2 < cell_len && cell_len != 1 {
                        cells[cell_index + 1]
                    } else {
                        let mut r = cells[cell_index];
                        if advancing {
                            r.y0 = filled.y1;
                        }
                        r
                    };
                    next_where.x1 = area.x1;

                    if next_where.width() * next_where.height() > 0.0 {
                        cells = column_cells(&next_where, cols);
                        area = next_where;
                        cell_index = 0;
                    } else {
                        cell_index += 1;
                    }

                    let ctx = BuildContext {
                        css: &css,
                        fonts: &fonts,
                        mediabox,
                        area,
                        columns: cols,
                    };
                    self.sections[sindex].block.make_story(&ctx)?;

                    if cell_index >= cells.len() {
                        finish_page(
                            &mut writer,
                            &mut self.footer,
                            &footer_rect,
                            &css,
                            &fonts,
                            mediabox,
                            area,
                            cols,
                        )?;
                        pno += 1;
                        area = mediabox.inset(margins);
                        phase = Phase::StartingNewPage;
                    } else {
                        phase = Phase::PlacingInCell;
                    }
                }

                Phase::Done => break,
            }
        }

        let mut doc = writer.close();
        self.post_process(&mut doc, &fonts, &section_cols);
        info!("report rendered: {} pages", doc.page_count());
        Ok(doc)
    }

    /// Page numbers into the bottom strip, then table header replay onto
    /// every continuation.
    fn post_process(
        &mut self,
        doc: &mut Document,
        fonts: &Rc<FontContext>,
        section_cols: &dyn Fn(&Section) -> usize,
    ) {
        let page_count = doc.page_count();
        let left_margin = self.margins.0;
        for (pno, page) in doc.pages.iter_mut().enumerate() {
            let strip = Rect::new(
                left_margin,
                page.mediabox.y1 - PAGE_NUMBER_STRIP,
                page.mediabox.x1,
                page.mediabox.y1,
            );
            page.insert_textbox(
                strip,
                &format!("Page {} of {}", pno + 1, page_count),
                "Helvetica",
                PAGE_NUMBER_SIZE,
                TextAlign::Center,
                Color::BLACK,
                fonts,
            );
        }

        for section in &self.sections {
            let Some(table) = section.block.table() else {
                continue;
            };
            if !table.repeats_header() || table.header_tops.len() < 2 {
                continue;
            }
            let cols = section_cols(section).min(table.header_rects.len());
            // The first occurrence already carries its own header row.
            for (i, occ) in table.header_tops.iter().skip(1).enumerate() {
                let source = table.header_rects[(i + 1) % cols.max(1)];
                let target = Rect::new(
                    occ.left,
                    occ.top,
                    occ.left + source.width(),
                    occ.top + source.height(),
                );
                debug!("replaying table header on page {} at {target:?}", occ.page);
                table.repeat_header(&mut doc.pages[occ.page], &target, fonts);
            }
        }
    }
}

/// Rebuild a per-page block from source so it renders from the top.
fn rebuild_per_page(block: &mut ContentBlock, ctx: &BuildContext) -> Result<()> {
    match block {
        ContentBlock::Text(b) => b.rebuild_story(ctx),
        _ => {
            *block.state() = StoryState::Unbuilt;
            block.make_story(ctx)
        }
    }
}

/// Draw the footer blocks and close the page.
#[allow(clippy::too_many_arguments)]
fn finish_page(
    writer: &mut DocumentWriter,
    footer: &mut [ContentBlock],
    footer_rect: &Rect,
    css: &str,
    fonts: &Rc<FontContext>,
    mediabox: Rect,
    area: Rect,
    columns: usize,
) -> Result<()> {
    if !footer.is_empty() {
        let ctx = BuildContext {
            css,
            fonts,
            mediabox,
            area,
            columns,
        };
        if let Some(page) = writer.current_page() {
            for block in footer.iter_mut() {
                rebuild_per_page(block, &ctx)?;
                if let Some(story) = block.story_mut() {
                    story.place(footer_rect);
                    story.draw(page);
                }
            }
        }
    }
    writer.end_page();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{PageFormat, TextBlock};
    use crate::geometry::PaperSize;

    fn a4() -> Rect {
        PaperSize::A4.rect()
    }

    #[test]
    fn test_empty_sections_rejected() {
        let mut report = Report::new(a4());
        assert!(matches!(report.render(), Err(ReportError::EmptySections)));
    }

    #[test]
    fn test_single_section_single_page() {
        let mut report =
            Report::new(a4()).section(Section::new(TextBlock::new("<h1>Title</h1><p>Body</p>")));
        let doc = report.render().unwrap();
        assert_eq!(doc.page_count(), 1);
        let texts: Vec<&str> = doc.pages[0]
            .text_spans(None)
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert!(texts.contains(&"Title"));
        assert!(texts.iter().any(|t| t.contains("Page 1 of 1")));
    }

    #[test]
    fn test_long_text_spills_to_more_pages() {
        let para = format!("<p>{}</p>", "lorem ipsum dolor sit amet ".repeat(60));
        let html: String = std::iter::repeat(para.as_str()).take(30).collect();
        let mut report = Report::new(a4()).section(Section::new(TextBlock::new(html)));
        let doc = report.render().unwrap();
        assert!(doc.page_count() > 1, "expected a spill onto page 2");
        let last = doc.page_count();
        let texts: Vec<String> = doc.pages[last - 1]
            .text_spans(None)
            .iter()
            .map(|s| s.text.clone())
            .collect();
        assert!(texts.iter().any(|t| t == &format!("Page {last} of {last}")));
    }

    #[test]
    fn test_newpage_false_shares_page() {
        let mut report = Report::new(a4())
            .section(Section::new(TextBlock::new("<p>first</p>")))
            .section(
                Section::new(TextBlock::new("<p>second</p>"))
                    .options(Options::new().newpage(false)),
            );
        let doc = report.render().unwrap();
        assert_eq!(doc.page_count(), 1);
        let texts: Vec<&str> = doc.pages[0]
            .text_spans(None)
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert!(texts.contains(&"first"));
        assert!(texts.contains(&"second"));
    }

    #[test]
    fn test_options_without_newpage_share_page() {
        let mut report = Report::new(a4())
            .section(Section::new(TextBlock::new("<p>first</p>")))
            .section(
                Section::new(TextBlock::new("<p>second</p>")).options(Options::new().cols(1)),
            );
        let doc = report.render().unwrap();
        assert_eq!(doc.page_count(), 1);
        let texts: Vec<&str> = doc.pages[0]
            .text_spans(None)
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert!(texts.contains(&"first"));
        assert!(texts.contains(&"second"));
    }

    #[test]
    fn test_newpage_default_breaks_page() {
        let mut report = Report::new(a4())
            .section(Section::new(TextBlock::new("<p>first</p>")))
            .section(Section::new(TextBlock::new("<p>second</p>")));
        let doc = report.render().unwrap();
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_non_advancing_section_keeps_cell_top() {
        let mut report = Report::new(a4())
            .section(Section::new(TextBlock::new("<p>short</p>").advance(false)))
            .section(
                Section::new(TextBlock::new("<p>after</p>"))
                    .options(Options::new().newpage(false)),
            );
        let doc = report.render().unwrap();
        let spans = doc.pages[0].text_spans(None);
        let short_y = spans.iter().find(|s| s.text == "short").unwrap().origin.y;
        let after_y = spans.iter().find(|s| s.text == "after").unwrap().origin.y;
        // Without advancing, the next section renders over the same cell.
        assert!((after_y - short_y).abs() < 1.0);
    }

    #[test]
    fn test_header_and_footer_on_every_page() {
        let para = format!("<p>{}</p>", "flow ".repeat(80));
        let html: String = std::iter::repeat(para.as_str()).take(40).collect();
        let mut report = Report::new(a4())
            .header(TextBlock::new("<p>ACME Quarterly</p>"))
            .footer(TextBlock::new("<p>confidential</p>"))
            .section(Section::new(TextBlock::new(html)));
        let doc = report.render().unwrap();
        assert!(doc.page_count() > 1);
        for page in &doc.pages {
            let texts: Vec<&str> = page
                .text_spans(None)
                .iter()
                .map(|s| s.text.as_str())
                .collect();
            assert!(texts.contains(&"ACME Quarterly"));
            assert!(texts.contains(&"confidential"));
        }
    }

    #[test]
    fn test_section_page_format_applies() {
        let mut report = Report::new(a4())
            .section(Section::new(TextBlock::new("<p>wide</p>")).options(
                Options::new().format(PageFormat::Size {
                    width: 300.0,
                    height: 200.0,
                }),
            ));
        let doc = report.render().unwrap();
        assert_eq!(doc.pages[0].mediabox, Rect::new(0.0, 0.0, 300.0, 200.0));
    }

    #[test]
    fn test_two_columns_fill_left_then_right() {
        let para = format!("<p>{}</p>", "col ".repeat(40));
        let html: String = std::iter::repeat(para.as_str()).take(30).collect();
        let mut report = Report::new(a4())
            .columns(2)
            .section(Section::new(TextBlock::new(html)));
        let doc = report.render().unwrap();
        let spans = doc.pages[0].text_spans(None);
        let mid = a4().width() / 2.0;
        let left = spans.iter().filter(|s| s.origin.x < mid).count();
        let right = spans
            .iter()
            .filter(|s| s.origin.x >= mid && !s.text.starts_with("Page "))
            .count();
        assert!(left > 0 && right > 0, "both columns should carry text");
    }

    #[test]
    fn test_deterministic_output() {
        let build = || {
            Report::new(a4())
                .header(TextBlock::new("<p>head</p>"))
                .section(Section::new(TextBlock::new(
                    "<h2>Stable</h2><p>same input, same output</p>",
                )))
        };
        let a = build().run_to_bytes().unwrap();
        let b = build().run_to_bytes().unwrap();
        assert_eq!(a, b);
    }
}
