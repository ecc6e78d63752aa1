//! # Drawing Surface & Document Writer
//!
//! The page/document writer boundary of the engine. A [`Page`] is the
//! drawing surface: it accepts absolute-coordinate text, rectangle, and
//! line commands. The [`DocumentWriter`] hands out one open page at a time
//! (`begin_page` / `end_page`) and `close()` yields the finished in-memory
//! [`Document`].
//!
//! Pages stay queryable after writing: the table-header extraction pass
//! reads back text spans clipped to a rectangle and the vector drawings
//! intersecting it, and the post-pass walks fonts per page. Serialization
//! to PDF bytes happens exactly once, at the very end.

use std::path::Path;

use crate::font::FontContext;
use crate::geometry::{Point, Rect};
use crate::style::{Color, TextAlign};

/// A single positioned text run. `origin` is the left end of the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub origin: Point,
    pub text: String,
    /// Document-level font resource name (e.g. `Helvetica-Bold`).
    pub font: String,
    pub size: f64,
    pub color: Color,
    /// Advance width, measured at layout time so clip queries need no
    /// font context.
    pub width: f64,
}

impl TextSpan {
    /// Approximate ink bounding box of the span.
    pub fn bbox(&self) -> Rect {
        Rect {
            x0: self.origin.x,
            y0: self.origin.y - self.size,
            x1: self.origin.x + self.width,
            y1: self.origin.y + self.size * 0.25,
        }
    }
}

/// One drawing command on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text(TextSpan),
    Rect {
        rect: Rect,
        stroke: Option<Color>,
        fill: Option<Color>,
        line_width: f64,
    },
    Line {
        from: Point,
        to: Point,
        color: Color,
        line_width: f64,
    },
    Image {
        rect: Rect,
        src: String,
    },
}

/// One item of a vector path as reported by [`Page::drawings`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathItem {
    Line(Point, Point),
    Rect(Rect),
}

/// A vector drawing read back from a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PathInfo {
    pub rect: Rect,
    pub color: Option<Color>,
    pub fill: Option<Color>,
    pub items: Vec<PathItem>,
}

/// A finished or in-progress page: mediabox plus draw commands, which double
/// as the drawing surface the layout engine commits into.
#[derive(Debug, Clone)]
pub struct Page {
    pub mediabox: Rect,
    ops: Vec<DrawOp>,
}

impl Page {
    pub fn new(mediabox: Rect) -> Self {
        Self {
            mediabox,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = DrawOp>) {
        self.ops.extend(ops);
    }

    /// Insert a text span at an absolute baseline origin.
    pub fn insert_text(
        &mut self,
        origin: Point,
        text: &str,
        font: &str,
        size: f64,
        color: Color,
        fonts: &FontContext,
    ) {
        let width = fonts.measure_by_name(text, font, size);
        self.ops.push(DrawOp::Text(TextSpan {
            origin,
            text: text.to_string(),
            font: font.to_string(),
            size,
            color,
            width,
        }));
    }

    /// Insert a one-line text box aligned within `rect`.
    pub fn insert_textbox(
        &mut self,
        rect: Rect,
        text: &str,
        font: &str,
        size: f64,
        align: TextAlign,
        color: Color,
        fonts: &FontContext,
    ) {
        let width = fonts.measure_by_name(text, font, size);
        let x = match align {
            TextAlign::Left => rect.x0,
            TextAlign::Center => rect.x0 + (rect.width() - width) / 2.0,
            TextAlign::Right => rect.x1 - width,
        };
        let y = rect.y0 + size;
        self.ops.push(DrawOp::Text(TextSpan {
            origin: Point::new(x, y),
            text: text.to_string(),
            font: font.to_string(),
            size,
            color,
            width,
        }));
    }

    pub fn draw_rect(&mut self, rect: Rect, stroke: Option<Color>, fill: Option<Color>) {
        self.ops.push(DrawOp::Rect {
            rect,
            stroke,
            fill,
            line_width: 0.7,
        });
    }

    pub fn draw_line(&mut self, from: Point, to: Point, color: Color) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            color,
            line_width: 0.7,
        });
    }

    pub fn draw_image(&mut self, rect: Rect, src: &str) {
        self.ops.push(DrawOp::Image {
            rect,
            src: src.to_string(),
        });
    }

    /// Text spans on this page, optionally clipped to a rectangle (a span
    /// counts when its bbox intersects the clip).
    pub fn text_spans(&self, clip: Option<&Rect>) -> Vec<&TextSpan> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text(span) => Some(span),
                _ => None,
            })
            .filter(|span| clip.map_or(true, |c| span.bbox().intersects(c)))
            .collect()
    }

    /// Vector drawings on this page, one [`PathInfo`] per rect/line command.
    pub fn drawings(&self) -> Vec<PathInfo> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect {
                    rect,
                    stroke,
                    fill,
                    ..
                } => Some(PathInfo {
                    rect: *rect,
                    color: *stroke,
                    fill: *fill,
                    items: vec![PathItem::Rect(*rect)],
                }),
                DrawOp::Line {
                    from, to, color, ..
                } => Some(PathInfo {
                    rect: Rect {
                        x0: from.x.min(to.x),
                        y0: from.y.min(to.y),
                        x1: from.x.max(to.x),
                        y1: from.y.max(to.y),
                    },
                    color: Some(*color),
                    fill: None,
                    items: vec![PathItem::Line(*from, *to)],
                }),
                _ => None,
            })
            .collect()
    }

    /// Font resource names used on this page, in first-use order.
    pub fn fonts(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for op in &self.ops {
            if let DrawOp::Text(span) = op {
                if !seen.contains(&span.font.as_str()) {
                    seen.push(&span.font);
                }
            }
        }
        seen
    }
}

/// The finished paginated document, fully in memory until saved.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialize to PDF bytes.
    pub fn to_bytes(&self, fonts: &FontContext) -> crate::error::Result<Vec<u8>> {
        crate::pdf::serialize(self, fonts)
    }

    /// Serialize and write to `path`. Nothing touches the filesystem until
    /// the whole document has rendered, so a failed report never leaves a
    /// partial file behind.
    pub fn save(&self, path: impl AsRef<Path>, fonts: &FontContext) -> crate::error::Result<()> {
        let bytes = self.to_bytes(fonts)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Accumulates pages one at a time. `begin_page` yields the page as the
/// drawing surface; `close` produces the [`Document`].
#[derive(Debug, Default)]
pub struct DocumentWriter {
    pages: Vec<Page>,
    open: bool,
}

impl DocumentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new page with the given mediabox and return it for drawing.
    pub fn begin_page(&mut self, mediabox: Rect) -> &mut Page {
        debug_assert!(!self.open, "begin_page with a page still open");
        self.pages.push(Page::new(mediabox));
        self.open = true;
        self.pages.last_mut().expect("page just pushed")
    }

    /// The currently open page, if any.
    pub fn current_page(&mut self) -> Option<&mut Page> {
        if self.open {
            self.pages.last_mut()
        } else {
            None
        }
    }

    pub fn end_page(&mut self) {
        debug_assert!(self.open, "end_page without begin_page");
        self.open = false;
    }

    /// Number of pages begun so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Finish writing and hand over the in-memory document.
    pub fn close(self) -> Document {
        Document { pages: self.pages }
    }
}
