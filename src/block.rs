//! # Content Blocks
//!
//! The building units a report is assembled from: free-flowing text blocks,
//! image blocks, and data tables. Each block owns its markup and stylesheet
//! source and lazily materializes a [`Story`] from them; the pagination
//! controller drives that story through `place`/`draw` cycles.
//!
//! Section stories are built once per run and consumed incrementally.
//! Header and footer blocks are rebuilt from source on every page so each
//! page renders them from the top.

use std::rc::Rc;

use crate::error::{ReportError, Result};
use crate::font::FontContext;
use crate::geometry::{PaperSize, Rect};
use crate::markup;
use crate::story::Story;
use crate::style::Stylesheet;
use crate::table::TableBlock;

/// Lifecycle of a block's story within one report run.
pub enum StoryState {
    /// Source only; no story materialized yet.
    Unbuilt,
    /// Materialized and (possibly partially) consumed.
    Built(Story),
    /// Fully placed; the owning section is done.
    Exhausted,
}

impl StoryState {
    pub fn story_mut(&mut self) -> Option<&mut Story> {
        match self {
            StoryState::Built(story) => Some(story),
            _ => None,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, StoryState::Built(_))
    }
}

/// Everything a block needs to materialize its story.
pub struct BuildContext<'a> {
    /// Report-level stylesheet, prepended to the block's own.
    pub css: &'a str,
    pub fonts: &'a Rc<FontContext>,
    /// Page rectangle, needed by table header extraction.
    pub mediabox: Rect,
    /// Content area inside the margins.
    pub area: Rect,
    /// Current column count.
    pub columns: usize,
}

/// A free-flowing markup block.
pub struct TextBlock {
    pub html: String,
    pub css: String,
    /// Whether the next section may continue in this block's leftover space.
    pub advance: bool,
    pub state: StoryState,
}

impl TextBlock {
    pub fn new(html: impl Into<String>) -> TextBlock {
        TextBlock {
            html: html.into(),
            css: String::new(),
            advance: true,
            state: StoryState::Unbuilt,
        }
    }

    pub fn css(mut self, css: impl Into<String>) -> TextBlock {
        self.css = css.into();
        self
    }

    pub fn advance(mut self, advance: bool) -> TextBlock {
        self.advance = advance;
        self
    }

    /// Materialize the story unless one is already built.
    pub fn make_story(&mut self, ctx: &BuildContext) -> Result<()> {
        if self.state.is_built() {
            return Ok(());
        }
        self.state = StoryState::Built(build_story(&self.html, &self.css, ctx)?);
        Ok(())
    }

    /// Rebuild from source unconditionally. Used for per-page blocks.
    pub fn rebuild_story(&mut self, ctx: &BuildContext) -> Result<()> {
        self.state = StoryState::Built(build_story(&self.html, &self.css, ctx)?);
        Ok(())
    }
}

/// An image-only block; generates a one-element markup body.
pub struct ImageBlock {
    pub url: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub css: String,
    pub advance: bool,
    pub state: StoryState,
}

impl ImageBlock {
    pub fn new(url: impl Into<String>) -> ImageBlock {
        ImageBlock {
            url: url.into(),
            width: None,
            height: None,
            css: String::new(),
            advance: true,
            state: StoryState::Unbuilt,
        }
    }

    pub fn width(mut self, width: f64) -> ImageBlock {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: f64) -> ImageBlock {
        self.height = Some(height);
        self
    }

    /// The markup this block renders. Unsized images default to 100x100.
    pub fn markup(&self) -> String {
        match (self.width, self.height) {
            (None, None) => format!(r#"<img src="{}" width="100" height="100"/>"#, self.url),
            (None, Some(h)) => format!(r#"<img src="{}" height="{}"/>"#, self.url, h),
            (Some(w), None) => format!(r#"<img src="{}" width="{}"/>"#, self.url, w),
            (Some(w), Some(h)) => {
                format!(r#"<img src="{}" width="{}" height="{}"/>"#, self.url, w, h)
            }
        }
    }

    pub fn make_story(&mut self, ctx: &BuildContext) -> Result<()> {
        if self.state.is_built() {
            return Ok(());
        }
        self.state = StoryState::Built(build_story(&self.markup(), &self.css, ctx)?);
        Ok(())
    }
}

/// Where a table's data rows come from. Resolved exactly once per run.
pub enum RowSource {
    /// Rows known up front.
    Fixed(Vec<Vec<String>>),
    /// Rows drained from an iterator at build time.
    Lazy(Box<dyn Iterator<Item = Vec<String>>>),
    /// A callable producing either of the above.
    Factory(Box<dyn FnOnce() -> RowSource>),
}

impl RowSource {
    pub fn fixed<R, C>(rows: R) -> RowSource
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = String>,
    {
        RowSource::Fixed(
            rows.into_iter()
                .map(|r| r.into_iter().collect())
                .collect(),
        )
    }

    /// Parse rows from a JSON array of arrays. Scalar values are
    /// stringified, so numeric columns need no pre-formatting.
    pub fn from_json(src: &str) -> Result<RowSource> {
        let parsed: Vec<Vec<serde_json::Value>> = serde_json::from_str(src)
            .map_err(|e| ReportError::BadRowSource(format!("invalid row JSON: {e}")))?;
        let rows = parsed
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        Ok(RowSource::Fixed(rows))
    }

    /// Drain into concrete rows. A factory may return a fixed or lazy
    /// source, but not another factory.
    pub fn resolve(self) -> Result<Vec<Vec<String>>> {
        match self {
            RowSource::Fixed(rows) => Ok(rows),
            RowSource::Lazy(iter) => Ok(iter.collect()),
            RowSource::Factory(f) => match f() {
                RowSource::Factory(_) => Err(ReportError::BadRowSource(
                    "factory returned another factory".to_string(),
                )),
                other => other.resolve(),
            },
        }
    }
}

/// Page layout for the section that carries these options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageFormat {
    Paper(PaperSize),
    Size { width: f64, height: f64 },
}

impl PageFormat {
    pub fn rect(&self) -> Rect {
        match self {
            PageFormat::Paper(paper) => paper.rect(),
            PageFormat::Size { width, height } => Rect::new(0.0, 0.0, *width, *height),
        }
    }
}

/// Per-section layout options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Column count; 0 inherits the report default.
    pub cols: usize,
    pub format: Option<PageFormat>,
    pub newpage: Option<bool>,
}

impl Options {
    pub fn new() -> Options {
        Options {
            cols: 0,
            format: None,
            newpage: None,
        }
    }

    pub fn cols(mut self, cols: usize) -> Options {
        self.cols = cols;
        self
    }

    pub fn format(mut self, format: PageFormat) -> Options {
        self.format = Some(format);
        self
    }

    pub fn newpage(mut self, newpage: bool) -> Options {
        self.newpage = Some(newpage);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}

/// Any block a report section or header/footer can hold.
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Table(TableBlock),
}

impl ContentBlock {
    pub fn advance(&self) -> bool {
        match self {
            ContentBlock::Text(b) => b.advance,
            ContentBlock::Image(b) => b.advance,
            ContentBlock::Table(b) => b.advance,
        }
    }

    pub fn state(&mut self) -> &mut StoryState {
        match self {
            ContentBlock::Text(b) => &mut b.state,
            ContentBlock::Image(b) => &mut b.state,
            ContentBlock::Table(b) => &mut b.state,
        }
    }

    pub fn story_mut(&mut self) -> Option<&mut Story> {
        self.state().story_mut()
    }

    /// Materialize the story if it is not already built.
    pub fn make_story(&mut self, ctx: &BuildContext) -> Result<()> {
        match self {
            ContentBlock::Text(b) => b.make_story(ctx),
            ContentBlock::Image(b) => b.make_story(ctx),
            ContentBlock::Table(b) => b.make_story(ctx),
        }
    }

    pub fn table(&self) -> Option<&TableBlock> {
        match self {
            ContentBlock::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut TableBlock> {
        match self {
            ContentBlock::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<TextBlock> for ContentBlock {
    fn from(b: TextBlock) -> Self {
        ContentBlock::Text(b)
    }
}

impl From<ImageBlock> for ContentBlock {
    fn from(b: ImageBlock) -> Self {
        ContentBlock::Image(b)
    }
}

impl From<TableBlock> for ContentBlock {
    fn from(b: TableBlock) -> Self {
        ContentBlock::Table(b)
    }
}

/// Parse markup and stylesheet sources into a fresh story. The report
/// stylesheet is prepended so block rules can override it.
pub fn build_story(html: &str, css: &str, ctx: &BuildContext) -> Result<Story> {
    let mut full_css = String::with_capacity(ctx.css.len() + css.len());
    full_css.push_str(ctx.css);
    full_css.push_str(css);
    let body = markup::parse(html)?;
    let sheet = Stylesheet::parse(&full_css);
    Ok(Story::new(&body, &sheet, Rc::clone(ctx.fonts)))
}
