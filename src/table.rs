//! # Data Tables
//!
//! A table block holds markup with a hidden `id="template"` row. At build
//! time the template is cloned once per data row, each clone's cells filled
//! from the row values, and the template removed. The first data row names
//! the cell ids the remaining rows bind to.
//!
//! When a `top_row` id is given, the visual header row is extracted by a
//! throwaway in-memory render: the materialized story is placed into the
//! report's column cells, the header row's rectangle recorded, and the text
//! spans and vector paths inside it captured. The pagination controller
//! later replays that captured content at the top of every table
//! continuation.

use log::debug;

use crate::block::{BuildContext, RowSource, StoryState};
use crate::error::{ReportError, Result};
use crate::font::FontContext;
use crate::geometry::{column_cells, Rect};
use crate::markup::{self, Element};
use crate::story::{PositionContext, Story, POS_CLOSE};
use crate::style::{Color, Stylesheet};
use crate::surface::{DocumentWriter, Page, PathInfo, PathItem, TextSpan};

/// One recorded placement of the table's header row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderOccurrence {
    pub page: usize,
    pub left: f64,
    pub top: f64,
}

/// A table with template-row materialization and header repetition.
pub struct TableBlock {
    pub html: String,
    pub css: String,
    pub advance: bool,
    pub state: StoryState,
    rows: Option<RowSource>,
    /// Id of the visual header row to repeat on continuations.
    pub top_row: Option<String>,
    /// Cycled across data rows when it has at least two entries.
    pub alternating_bg: Vec<String>,
    pub last_row_bg: Option<String>,

    /// Header rectangle per column cell, left to right.
    pub header_rects: Vec<Rect>,
    header_spans: Vec<TextSpan>,
    header_paths: Vec<PathInfo>,
    /// First font name seen in the extracted header.
    pub header_font: Option<String>,
    /// Where the header row lands during pagination, in placement order.
    pub header_tops: Vec<HeaderOccurrence>,
}

impl TableBlock {
    pub fn new(html: impl Into<String>) -> TableBlock {
        TableBlock {
            html: html.into(),
            css: String::new(),
            advance: true,
            state: StoryState::Unbuilt,
            rows: None,
            top_row: None,
            alternating_bg: Vec::new(),
            last_row_bg: None,
            header_rects: Vec::new(),
            header_spans: Vec::new(),
            header_paths: Vec::new(),
            header_font: None,
            header_tops: Vec::new(),
        }
    }

    pub fn css(mut self, css: impl Into<String>) -> TableBlock {
        self.css = css.into();
        self
    }

    pub fn rows(mut self, rows: RowSource) -> TableBlock {
        self.rows = Some(rows);
        self
    }

    pub fn top_row(mut self, id: impl Into<String>) -> TableBlock {
        self.top_row = Some(id.into());
        self
    }

    pub fn alternating_bg<I, S>(mut self, colors: I) -> TableBlock
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternating_bg = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn last_row_bg(mut self, color: impl Into<String>) -> TableBlock {
        self.last_row_bg = Some(color.into());
        self
    }

    pub fn advance(mut self, advance: bool) -> TableBlock {
        self.advance = advance;
        self
    }

    /// Repeat the table header on continuations.
    pub fn repeats_header(&self) -> bool {
        !self.header_rects.is_empty()
    }

    /// Materialize rows into a story and, when configured, extract the
    /// header. Already-built stories are left untouched so the header is
    /// captured exactly once per run.
    pub fn make_story(&mut self, ctx: &BuildContext) -> Result<()> {
        if self.state.is_built() {
            return Ok(());
        }

        let mut body = markup::parse(&self.html)?;
        if body.find(Some("table"), None).is_none() {
            return Err(ReportError::MissingTable);
        }

        if let Some(source) = self.rows.take() {
            let rows = source.resolve()?;
            materialize_rows(
                &mut body,
                rows,
                &self.alternating_bg,
                self.last_row_bg.as_deref(),
            )?;
        }

        let mut full_css = String::with_capacity(ctx.css.len() + self.css.len());
        full_css.push_str(ctx.css);
        full_css.push_str(&self.css);
        let sheet = Stylesheet::parse(&full_css);
        let mut story = Story::new(&body, &sheet, std::rc::Rc::clone(ctx.fonts));

        if self.top_row.is_some() {
            self.extract_header(&mut story, ctx)?;
        }
        self.state = StoryState::Built(story);
        Ok(())
    }

    /// Render the table into a throwaway page to learn the header row's
    /// geometry and captured appearance.
    fn extract_header(&mut self, story: &mut Story, ctx: &BuildContext) -> Result<()> {
        let top_row = self.top_row.as_deref().expect("checked by caller");
        story.reset();

        let mut writer = DocumentWriter::new();
        writer.begin_page(ctx.mediabox);

        // Cells in reverse geometric order so the recorded rects, once
        // reversed again, line up left to right.
        let cells: Vec<Rect> = if ctx.columns > 1 {
            let mut c = column_cells(&ctx.area, ctx.columns);
            c.reverse();
            c
        } else {
            vec![ctx.area]
        };

        let mut header_rect: Option<Rect> = None;
        let mut last_col_rect: Option<Rect> = None;
        let mut current_cell: Option<Rect> = None;
        let mut recorded: Vec<Option<Rect>> = Vec::new();
        let pos_ctx = PositionContext {
            page: 0,
            header: Some(top_row.to_string()),
        };
        for cell in &cells {
            story.place(cell);
            story.element_positions(
                |pos, pctx| {
                    // A row's cells are reported between its open and close
                    // markers, so at the matching close the most recent cell
                    // rect is the header row's rightmost column.
                    if pos.depth == 3 {
                        current_cell = Some(pos.rect);
                    }
                    if pos.open_close & POS_CLOSE == 0 {
                        return;
                    }
                    if pos.id != pctx.header {
                        return;
                    }
                    header_rect = Some(pos.rect);
                    last_col_rect = current_cell;
                },
                &pos_ctx,
            );
            recorded.push(header_rect);
            if let Some(page) = writer.current_page() {
                story.draw(page);
            }
        }

        let header_rect = header_rect.ok_or_else(|| {
            ReportError::Markup(format!("row with id '{top_row}' not found in table"))
        })?;
        if let Some(last_col) = last_col_rect {
            // The last column running past the header row means a single
            // column cell cannot hold one table row.
            if last_col.x1 > header_rect.x1 {
                return Err(ReportError::InsufficientColumns(ctx.columns));
            }
        }

        writer.end_page();
        let doc = writer.close();
        let page = &doc.pages[0];

        self.header_paths = page
            .drawings()
            .into_iter()
            .filter(|p| p.rect.intersects(&header_rect))
            .collect();
        self.header_spans = page
            .text_spans(Some(&header_rect))
            .into_iter()
            .cloned()
            .collect();
        if !self.header_spans.is_empty() {
            self.header_font = page.fonts().first().map(|f| f.to_string());
        }
        debug!(
            "extracted table header: {} spans, {} paths at {:?}",
            self.header_spans.len(),
            self.header_paths.len(),
            header_rect
        );

        story.reset();
        let mut rects: Vec<Rect> = recorded
            .into_iter()
            .map(|r| r.unwrap_or(header_rect))
            .collect();
        rects.reverse();
        self.header_rects = rects;
        Ok(())
    }

    /// Redraw the captured header row into `rect` on a finished page.
    pub fn repeat_header(&self, page: &mut Page, rect: &Rect, fonts: &FontContext) {
        let Some(source) = self.header_rects.first() else {
            return;
        };
        let mat = source.to_rect(rect);

        for path in &self.header_paths {
            for item in &path.items {
                match item {
                    PathItem::Line(from, to) => {
                        page.draw_line(
                            from.transform(&mat),
                            to.transform(&mat),
                            path.color.unwrap_or(Color::BLACK),
                        );
                    }
                    PathItem::Rect(r) => {
                        page.draw_rect(r.transform(&mat), path.color, path.fill);
                    }
                }
            }
        }

        for span in &self.header_spans {
            let fontname = self
                .header_font
                .as_deref()
                .unwrap_or(span.font.as_str());
            page.insert_text(
                span.origin.transform(&mat),
                &span.text,
                fontname,
                span.size,
                span.color,
                fonts,
            );
        }
    }
}

/// Clone the template row once per data row and fill its cells. The first
/// row of `rows` holds the cell ids the remaining rows bind to.
pub fn materialize_rows(
    body: &mut Element,
    rows: Vec<Vec<String>>,
    alternating_bg: &[String],
    last_row_bg: Option<&str>,
) -> Result<()> {
    let template = body
        .find(None, Some("template"))
        .cloned()
        .ok_or(ReportError::MissingTemplateRow)?;

    if rows.len() < 2 {
        return Err(ReportError::NotEnoughRows(rows.len()));
    }
    let fields = &rows[0];
    let data = &rows[1..];

    for (j, values) in data.iter().enumerate() {
        let mut row = template.clone();
        // Clones must not keep the template id.
        row.id = None;

        let mut bg = if alternating_bg.len() >= 2 {
            alternating_bg[j % alternating_bg.len()].clone()
        } else {
            // There always is a background color.
            "#fff".to_string()
        };
        if let Some(last_bg) = last_row_bg {
            if j == data.len() - 1 {
                bg = last_bg.to_string();
            }
        }
        let bg_color = Color::parse(&bg);
        if let Some(color) = bg_color {
            row.set_background(color);
        }

        for (i, value) in values.iter().enumerate() {
            let field = fields.get(i).map(String::as_str).unwrap_or_default();
            let cell = row
                .find_mut(None, Some(field))
                .ok_or_else(|| ReportError::UnknownField(field.to_string()))?;
            if let Some(color) = bg_color {
                cell.set_background(color);
            }
            let text = value.replace("\\n", "\n").replace("<br>", "\n");
            if let Some(src) = text.strip_prefix("|img|") {
                cell.add_image(src);
            } else {
                cell.add_text(&text);
            }
        }

        let table = body
            .find_mut(Some("table"), None)
            .ok_or(ReportError::MissingTable)?;
        table.append_child(row);
    }

    body.remove_by_id("template");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BuildContext;
    use crate::font::FontContext;
    use std::rc::Rc;

    const TABLE_HTML: &str = r#"
        <table>
            <tr id="top"><th>Name</th><th>Note</th></tr>
            <tr id="template"><td id="name"></td><td id="note"></td></tr>
        </table>"#;

    fn sample_rows() -> Vec<Vec<String>> {
        vec![
            vec!["name".to_string(), "note".to_string()],
            vec!["Ann".to_string(), "first".to_string()],
            vec!["Bob".to_string(), "second".to_string()],
            vec!["Cid".to_string(), "third".to_string()],
        ]
    }

    fn ctx(fonts: &Rc<FontContext>) -> BuildContext<'_> {
        BuildContext {
            css: "",
            fonts,
            mediabox: Rect::new(0.0, 0.0, 595.28, 841.89),
            area: Rect::new(36.0, 36.0, 559.28, 811.89),
            columns: 1,
        }
    }

    #[test]
    fn test_materialize_rows_clones_template() {
        let mut body = markup::parse(TABLE_HTML).unwrap();
        materialize_rows(&mut body, sample_rows(), &[], None).unwrap();
        assert!(body.find(None, Some("template")).is_none());
        let table = body.find(Some("table"), None).unwrap();
        // header row + 3 data rows
        assert_eq!(table.children.len(), 4);
        assert!(table.text_content().contains("Ann"));
        assert!(table.text_content().contains("third"));
    }

    #[test]
    fn test_materialize_escapes_and_images() {
        let mut body = markup::parse(TABLE_HTML).unwrap();
        let rows = vec![
            vec!["name".to_string(), "note".to_string()],
            vec!["line\\none".to_string(), "|img|logo.png".to_string()],
            vec!["a<br>b".to_string(), "plain".to_string()],
        ];
        materialize_rows(&mut body, rows, &[], None).unwrap();
        let table = body.find(Some("table"), None).unwrap();
        assert!(table.text_content().contains("line\none"));
        assert!(table.text_content().contains("a\nb"));
        let img = table.find(Some("img"), None).unwrap();
        assert_eq!(img.attr("src"), Some("logo.png"));
    }

    #[test]
    fn test_materialize_alternating_and_last_bg() {
        let mut body = markup::parse(TABLE_HTML).unwrap();
        let alt = vec!["#ccc".to_string(), "#fff".to_string()];
        materialize_rows(&mut body, sample_rows(), &alt, Some("#ff0000")).unwrap();
        let table = body.find(Some("table"), None).unwrap();
        let rows: Vec<&Element> = table
            .children
            .iter()
            .filter_map(|c| match c {
                markup::MarkupNode::Element(el) if el.tag == "tr" && el.id.is_none() => Some(el),
                _ => None,
            })
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].style.background_color, Color::parse("#ccc"));
        assert_eq!(rows[1].style.background_color, Color::parse("#fff"));
        assert_eq!(rows[2].style.background_color, Color::parse("#ff0000"));
    }

    #[test]
    fn test_materialize_missing_field_errors() {
        let mut body = markup::parse(TABLE_HTML).unwrap();
        let rows = vec![
            vec!["name".to_string(), "nosuch".to_string()],
            vec!["Ann".to_string(), "x".to_string()],
        ];
        let err = materialize_rows(&mut body, rows, &[], None).unwrap_err();
        assert!(matches!(err, ReportError::UnknownField(f) if f == "nosuch"));
    }

    #[test]
    fn test_materialize_without_table_errors() {
        let mut body =
            markup::parse(r#"<tr id="template"><td id="name"/></tr>"#).unwrap();
        let rows = vec![vec!["name".to_string()], vec!["Ann".to_string()]];
        assert!(matches!(
            materialize_rows(&mut body, rows, &[], None),
            Err(ReportError::MissingTable)
        ));
    }

    #[test]
    fn test_materialize_needs_two_rows() {
        let mut body = markup::parse(TABLE_HTML).unwrap();
        let rows = vec![vec!["name".to_string(), "note".to_string()]];
        assert!(matches!(
            materialize_rows(&mut body, rows, &[], None),
            Err(ReportError::NotEnoughRows(1))
        ));
    }

    #[test]
    fn test_make_story_requires_table() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new("<p>not a table</p>");
        assert!(matches!(
            table.make_story(&ctx(&fonts)),
            Err(ReportError::MissingTable)
        ));
    }

    #[test]
    fn test_make_story_requires_template_with_rows() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new("<table><tr><td>static</td></tr></table>")
            .rows(RowSource::Fixed(sample_rows()));
        assert!(matches!(
            table.make_story(&ctx(&fonts)),
            Err(ReportError::MissingTemplateRow)
        ));
    }

    #[test]
    fn test_extract_header_captures_appearance() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(sample_rows()))
            .top_row("top");
        table.make_story(&ctx(&fonts)).unwrap();

        assert_eq!(table.header_rects.len(), 1);
        let rect = table.header_rects[0];
        assert!(rect.width() > 100.0);
        assert!(rect.height() > 10.0);
        let texts: Vec<&str> = table.header_spans.iter().map(|s| s.text.as_str()).collect();
        assert!(texts.contains(&"Name"));
        assert!(texts.contains(&"Note"));
        assert!(!table.header_paths.is_empty());
        assert!(table.header_font.is_some());
        // Extraction leaves the story rewound for the real run.
        assert!(table.state.story_mut().unwrap().more());
    }

    #[test]
    fn test_make_story_is_idempotent_once_built() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(sample_rows()))
            .top_row("top");
        let c = ctx(&fonts);
        table.make_story(&c).unwrap();
        let rects = table.header_rects.clone();
        table.make_story(&c).unwrap();
        assert_eq!(table.header_rects, rects);
    }

    #[test]
    fn test_repeat_header_redraws_spans() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(sample_rows()))
            .top_row("top");
        let c = ctx(&fonts);
        table.make_story(&c).unwrap();

        let source = table.header_rects[0];
        let target = Rect::new(50.0, 400.0, 50.0 + source.width(), 400.0 + source.height());
        let mut page = Page::new(c.mediabox);
        table.repeat_header(&mut page, &target, &fonts);

        let spans = page.text_spans(Some(&target));
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert!(texts.contains(&"Name"));
        assert!(texts.contains(&"Note"));
        assert!(!page.drawings().is_empty());
    }

    #[test]
    fn test_overflowing_data_row_passes_header_check() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(vec![
                vec!["name".to_string(), "note".to_string()],
                vec![
                    "Ann".to_string(),
                    "Oneunbreakablewordfarwiderthanitsassignedcolumnwidth".to_string(),
                ],
            ]))
            .top_row("top");
        // Narrow area: the data cell overflows but the header row fits.
        let ctx = BuildContext {
            css: "",
            fonts: &fonts,
            mediabox: Rect::new(0.0, 0.0, 595.28, 841.89),
            area: Rect::new(36.0, 36.0, 240.0, 811.89),
            columns: 1,
        };
        table.make_story(&ctx).unwrap();
        assert_eq!(table.header_rects.len(), 1);
    }

    #[test]
    fn test_insufficient_columns_detected() {
        let fonts = Rc::new(FontContext::new());
        let mut table = TableBlock::new(
            r#"<table>
                <tr id="top"><th>Completelyunbreakablecolumnheading</th><th>Alsoquiteunbreakable</th></tr>
                <tr id="template"><td id="a"></td><td id="b"></td></tr>
            </table>"#,
        )
        .rows(RowSource::Fixed(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ]))
        .top_row("top");
        let ctx = BuildContext {
            css: "",
            fonts: &fonts,
            mediabox: Rect::new(0.0, 0.0, 595.28, 841.89),
            area: Rect::new(36.0, 36.0, 559.28, 811.89),
            columns: 8,
        };
        assert!(matches!(
            table.make_story(&ctx),
            Err(ReportError::InsufficientColumns(8))
        ));
    }
}
