//! # Flow Story
//!
//! The layout-engine collaborator: a story wraps one block's markup tree
//! and places as much of it as fits into whatever rectangle the pagination
//! controller offers, keeping a flow cursor so consecutive `place` calls
//! continue where the previous one stopped.
//!
//! The contract the controller relies on:
//!
//! - `place(rect) -> (more, filled)`: lay out pending content into `rect`;
//!   `more = false` signals exhaustion, `filled` is `rect` shrunk to the
//!   content bottom.
//! - `draw(page)`: commit the most recent placement onto a page.
//! - `element_positions(recorder, ctx)`: replay the element rectangles of
//!   the most recent placement (nesting depth, open/close transition,
//!   optional id) to a recorder; used by table-header extraction.
//! - `reset()`: discard all progress.
//!
//! Layout itself is a single downward flow: paragraphs wrap greedily at
//! word boundaries, images occupy their scaled box, and table rows place
//! atomically with their cells side by side. Every decision is made against
//! the offered rectangle, never an infinite canvas.

use std::rc::Rc;

use crate::font::FontContext;
use crate::geometry::{Point, Rect};
use crate::images;
use crate::markup::{Element, MarkupNode};
use crate::style::{Color, Style, Stylesheet, TextAlign};
use crate::surface::{DrawOp, Page, TextSpan};

/// Element transition markers for position reports.
pub const POS_OPEN: u8 = 1;
pub const POS_CLOSE: u8 = 2;

/// One visited element rectangle from the most recent placement.
#[derive(Debug, Clone)]
pub struct ElementPosition {
    pub depth: usize,
    pub rect: Rect,
    /// Bit 1 = element opened in this placement, bit 2 = closed.
    pub open_close: u8,
    pub id: Option<String>,
}

/// Caller context passed through to a position recorder.
#[derive(Debug, Clone, Default)]
pub struct PositionContext {
    pub page: usize,
    /// Target id the recorder is hunting for (the table's top row).
    pub header: Option<String>,
}

const DEFAULT_FONT_SIZE: f64 = 11.0;
const LINE_FACTOR: f64 = 1.2;
const CELL_PAD: f64 = 3.0;
const CELL_BORDER: Color = Color {
    r: 0.6,
    g: 0.6,
    b: 0.6,
    a: 1.0,
};
const IMAGE_GAP: f64 = 4.0;
const CELL_IMAGE_HEIGHT: f64 = 24.0;

/// Fully resolved text attributes for a run.
#[derive(Debug, Clone, PartialEq)]
struct TextStyle {
    family: String,
    size: f64,
    weight: u32,
    italic: bool,
    color: Color,
}

impl TextStyle {
    fn base() -> Self {
        TextStyle {
            family: "Helvetica".to_string(),
            size: DEFAULT_FONT_SIZE,
            weight: 400,
            italic: false,
            color: Color::BLACK,
        }
    }

    fn apply(&self, style: &Style) -> TextStyle {
        TextStyle {
            family: style.font_family.clone().unwrap_or_else(|| self.family.clone()),
            size: style.font_size.unwrap_or(self.size),
            weight: style.font_weight.unwrap_or(self.weight),
            italic: style.italic.unwrap_or(self.italic),
            color: style.color.unwrap_or(self.color),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenKind {
    Word,
    Space,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    kind: TokenKind,
    style: TextStyle,
}

/// A flattened flow item. Rows are atomic; paragraphs break by line.
#[derive(Debug, Clone)]
enum FlowItem {
    Para {
        /// Forced segments (hard breaks); word wrap applies within each.
        segments: Vec<Vec<Token>>,
        align: TextAlign,
        space_before: f64,
        space_after: f64,
        id: Option<String>,
    },
    Image {
        src: String,
        width: f64,
        height: f64,
    },
    Row {
        id: Option<String>,
        cells: Vec<CellContent>,
    },
}

#[derive(Debug, Clone)]
struct CellContent {
    id: Option<String>,
    segments: Vec<Vec<Token>>,
    images: Vec<String>,
    bg: Option<Color>,
    align: TextAlign,
}

/// Flow cursor: first unplaced item, and within a paragraph the first
/// unplaced segment/token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Cursor {
    item: usize,
    segment: usize,
    token: usize,
}

/// An incremental flow layout over one block's markup.
pub struct Story {
    items: Vec<FlowItem>,
    cursor: Cursor,
    fonts: Rc<FontContext>,
    last_ops: Vec<DrawOp>,
    last_positions: Vec<ElementPosition>,
}

impl Story {
    /// Flatten a parsed body element into flow items under `sheet`.
    pub fn new(body: &Element, sheet: &Stylesheet, fonts: Rc<FontContext>) -> Story {
        let base = TextStyle::base().apply(&sheet.style_for("body", None));
        let mut items = Vec::new();
        flatten_body(body, sheet, &base, &mut items);
        Story {
            items,
            cursor: Cursor::default(),
            fonts,
            last_ops: Vec::new(),
            last_positions: Vec::new(),
        }
    }

    /// Whether any content remains to place.
    pub fn more(&self) -> bool {
        self.cursor.item < self.items.len()
    }

    /// Discard all placement progress.
    pub fn reset(&mut self) {
        self.cursor = Cursor::default();
        self.last_ops.clear();
        self.last_positions.clear();
    }

    /// Replay the element rectangles of the most recent placement.
    pub fn element_positions<F>(&self, mut recorder: F, ctx: &PositionContext)
    where
        F: FnMut(&ElementPosition, &PositionContext),
    {
        for pos in &self.last_positions {
            recorder(pos, ctx);
        }
    }

    /// Commit the most recent placement onto a page surface.
    pub fn draw(&mut self, page: &mut Page) {
        page.extend(self.last_ops.drain(..));
    }

    /// Place as much pending content as fits `rect`. Returns whether more
    /// content remains and the rectangle actually filled.
    pub fn place(&mut self, rect: &Rect) -> (bool, Rect) {
        self.last_ops.clear();
        self.last_positions.clear();

        let mut y = rect.y0;
        let mut placed_any = false;

        while self.cursor.item < self.items.len() {
            // Clone the item descriptor cheaply enough; placement mutates
            // only the cursor.
            let item_index = self.cursor.item;
            match &self.items[item_index] {
                FlowItem::Para {
                    segments,
                    align,
                    space_before,
                    space_after,
                    id,
                } => {
                    let at_start = self.cursor.segment == 0 && self.cursor.token == 0;
                    let mut local_y = y;
                    if at_start && placed_any {
                        local_y += space_before;
                    }
                    // A line taller than any untouched cell would loop
                    // forever; force it through once instead.
                    let force = !placed_any && self.line_taller_than(rect);
                    let (new_cursor, lines, done) = wrap_from(
                        segments,
                        Cursor {
                            item: item_index,
                            segment: self.cursor.segment,
                            token: self.cursor.token,
                        },
                        rect.width(),
                        rect.y1 - local_y,
                        force,
                        &self.fonts,
                    );
                    if lines.is_empty() && !done {
                        return (true, filled(rect, y));
                    }
                    let para_top = local_y;
                    let mut max_line_x = rect.x0;
                    for line in &lines {
                        let lh = line.height;
                        let baseline = local_y + line.ascent;
                        let line_x = match align {
                            TextAlign::Left => rect.x0,
                            TextAlign::Center => rect.x0 + (rect.width() - line.width) / 2.0,
                            TextAlign::Right => rect.x1 - line.width,
                        };
                        emit_line(&mut self.last_ops, line, line_x, baseline, &self.fonts);
                        max_line_x = max_line_x.max(line_x + line.width);
                        local_y += lh;
                    }
                    let mut open_close = 0u8;
                    if at_start {
                        open_close |= POS_OPEN;
                    }
                    if done {
                        open_close |= POS_CLOSE;
                        local_y += space_after;
                        self.cursor = Cursor {
                            item: item_index + 1,
                            segment: 0,
                            token: 0,
                        };
                    } else {
                        self.cursor = new_cursor;
                    }
                    self.last_positions.push(ElementPosition {
                        depth: 1,
                        rect: Rect::new(rect.x0, para_top, max_line_x, local_y),
                        open_close,
                        id: id.clone(),
                    });
                    y = local_y;
                    placed_any = true;
                    if !done {
                        return (true, filled(rect, y));
                    }
                }

                FlowItem::Image { src, width, height } => {
                    let (mut w, mut h) = (*width, *height);
                    if h > rect.y1 - y {
                        if placed_any || h <= rect.height() {
                            return (true, filled(rect, y));
                        }
                        // Taller than any cell will ever be: scale down to fit.
                        let scale = rect.height() / h;
                        w *= scale;
                        h = rect.height();
                    }
                    let img_rect = Rect::new(rect.x0, y, rect.x0 + w, y + h);
                    self.last_ops.push(DrawOp::Image {
                        rect: img_rect,
                        src: src.clone(),
                    });
                    self.last_positions.push(ElementPosition {
                        depth: 1,
                        rect: img_rect,
                        open_close: POS_OPEN | POS_CLOSE,
                        id: None,
                    });
                    y += h + IMAGE_GAP;
                    placed_any = true;
                    self.cursor.item += 1;
                    self.cursor.segment = 0;
                    self.cursor.token = 0;
                }

                FlowItem::Row { id, cells } => {
                    let layout = layout_row(cells, rect.x0, rect.width(), &self.fonts);
                    if layout.height > rect.y1 - y && (placed_any || layout.height <= rect.height())
                    {
                        return (true, filled(rect, y));
                    }
                    commit_row(
                        &layout,
                        y,
                        id.clone(),
                        &mut self.last_ops,
                        &mut self.last_positions,
                        &self.fonts,
                    );
                    y += layout.height;
                    placed_any = true;
                    self.cursor.item += 1;
                    self.cursor.segment = 0;
                    self.cursor.token = 0;
                }
            }
        }

        (false, filled(rect, y))
    }

    /// True when the current paragraph's next line cannot fit even an
    /// untouched rect of this height.
    fn line_taller_than(&self, rect: &Rect) -> bool {
        if let FlowItem::Para { segments, .. } = &self.items[self.cursor.item] {
            let max_size = segments
                .iter()
                .flatten()
                .map(|t| t.style.size)
                .fold(DEFAULT_FONT_SIZE, f64::max);
            max_size * LINE_FACTOR > rect.height()
        } else {
            false
        }
    }
}

fn filled(rect: &Rect, y: f64) -> Rect {
    Rect::new(rect.x0, rect.y0, rect.x1, y)
}

// ─── Flattening ─────────────────────────────────────────────────────

fn flatten_body(body: &Element, sheet: &Stylesheet, base: &TextStyle, items: &mut Vec<FlowItem>) {
    for child in &body.children {
        match child {
            MarkupNode::Text(text) => {
                let mut segments = Vec::new();
                tokenize_into(text, base, &mut segments);
                if !segments.iter().all(|s| s.is_empty()) {
                    items.push(FlowItem::Para {
                        segments,
                        align: TextAlign::Left,
                        space_before: 0.0,
                        space_after: DEFAULT_FONT_SIZE * 0.4,
                        id: None,
                    });
                }
            }
            MarkupNode::Element(el) => flatten_element(el, sheet, base, items),
        }
    }
}

fn flatten_element(el: &Element, sheet: &Stylesheet, base: &TextStyle, items: &mut Vec<FlowItem>) {
    let effective = effective_style(el, sheet);
    let style = base.apply(&tag_default(&el.tag)).apply(&effective);

    match el.tag.as_str() {
        "img" => {
            let (w, h) = image_box(el);
            items.push(FlowItem::Image {
                src: el.attr("src").unwrap_or_default().to_string(),
                width: w,
                height: h,
            });
        }
        "table" => {
            for child in &el.children {
                if let MarkupNode::Element(tr) = child {
                    if tr.tag == "tr" {
                        items.push(flatten_row(tr, sheet, &style));
                    }
                }
            }
        }
        "br" | "hr" => {}
        _ => {
            let mut segments = vec![Vec::new()];
            collect_inline(el, sheet, &style, &mut segments);
            if segments.iter().any(|s| !s.is_empty()) {
                let align = effective.text_align.unwrap_or(TextAlign::Left);
                let space = match el.tag.as_str() {
                    "h1" | "h2" | "h3" | "h4" => style.size * 0.6,
                    _ => 0.0,
                };
                items.push(FlowItem::Para {
                    segments,
                    align,
                    space_before: space,
                    space_after: style.size * 0.4,
                    id: el.id.clone(),
                });
            }
        }
    }
}

fn flatten_row(tr: &Element, sheet: &Stylesheet, inherited: &TextStyle) -> FlowItem {
    let row_style = effective_style(tr, sheet);
    let row_text = inherited.apply(&row_style);
    let mut cells = Vec::new();
    for child in &tr.children {
        if let MarkupNode::Element(cell) = child {
            if cell.tag == "td" || cell.tag == "th" {
                let cell_style = effective_style(cell, sheet);
                let mut text_style = row_text.apply(&cell_style);
                if cell.tag == "th" && cell_style.font_weight.is_none() {
                    text_style.weight = 700;
                }
                let mut segments = vec![Vec::new()];
                let mut images = Vec::new();
                collect_cell_content(cell, sheet, &text_style, &mut segments, &mut images);
                cells.push(CellContent {
                    id: cell.id.clone(),
                    segments,
                    images,
                    bg: cell_style
                        .background_color
                        .or(row_style.background_color),
                    align: cell_style.text_align.unwrap_or(TextAlign::Left),
                });
            }
        }
    }
    FlowItem::Row {
        id: tr.id.clone(),
        cells,
    }
}

fn collect_cell_content(
    el: &Element,
    sheet: &Stylesheet,
    style: &TextStyle,
    segments: &mut Vec<Vec<Token>>,
    images: &mut Vec<String>,
) {
    for child in &el.children {
        match child {
            MarkupNode::Text(text) => tokenize_append(text, style, segments),
            MarkupNode::Element(inner) => match inner.tag.as_str() {
                "img" => {
                    if let Some(src) = inner.attr("src") {
                        images.push(src.to_string());
                    }
                }
                "br" => segments.push(Vec::new()),
                _ => {
                    let inner_style = style
                        .apply(&tag_default(&inner.tag))
                        .apply(&effective_style(inner, sheet));
                    collect_cell_content(inner, sheet, &inner_style, segments, images);
                }
            },
        }
    }
}

fn collect_inline(
    el: &Element,
    sheet: &Stylesheet,
    style: &TextStyle,
    segments: &mut Vec<Vec<Token>>,
) {
    for child in &el.children {
        match child {
            MarkupNode::Text(text) => tokenize_append(text, style, segments),
            MarkupNode::Element(inner) => {
                if inner.tag == "br" {
                    segments.push(Vec::new());
                    continue;
                }
                let inner_style = style
                    .apply(&tag_default(&inner.tag))
                    .apply(&effective_style(inner, sheet));
                collect_inline(inner, sheet, &inner_style, segments);
            }
        }
    }
}

/// Stylesheet rules for the element layered under its inline style.
fn effective_style(el: &Element, sheet: &Stylesheet) -> Style {
    sheet
        .style_for(&el.tag, el.id.as_deref())
        .merged(&el.style)
}

fn tag_default(tag: &str) -> Style {
    let (size, weight, italic) = match tag {
        "h1" => (Some(22.0), Some(700), None),
        "h2" => (Some(18.0), Some(700), None),
        "h3" => (Some(14.0), Some(700), None),
        "h4" => (Some(12.0), Some(700), None),
        "b" | "strong" => (None, Some(700), None),
        "i" | "em" => (None, None, Some(true)),
        _ => (None, None, None),
    };
    Style {
        font_size: size,
        font_weight: weight,
        italic,
        ..Default::default()
    }
}

fn image_box(el: &Element) -> (f64, f64) {
    let attr_f = |name: &str| el.attr(name).and_then(|v| v.parse::<f64>().ok());
    let (w_attr, h_attr) = (attr_f("width"), attr_f("height"));
    match (w_attr, h_attr) {
        (Some(w), Some(h)) => (w, h),
        (w, h) => {
            let intrinsic = el
                .attr("src")
                .and_then(images::dimensions)
                .map(|(iw, ih)| (iw as f64, ih as f64));
            match (w, h, intrinsic) {
                (Some(w), None, Some((iw, ih))) => (w, w * ih / iw),
                (None, Some(h), Some((iw, ih))) => (h * iw / ih, h),
                (Some(w), None, None) => (w, w),
                (None, Some(h), None) => (h, h),
                (None, None, Some((iw, ih))) => (iw, ih),
                // Matches the historical 100x100 default for unsized images.
                (None, None, None) => (100.0, 100.0),
                (Some(_), Some(_), _) => unreachable!(),
            }
        }
    }
}

fn tokenize_append(text: &str, style: &TextStyle, segments: &mut Vec<Vec<Token>>) {
    if segments.is_empty() {
        segments.push(Vec::new());
    }
    for (i, part) in text.split('\n').enumerate() {
        if i > 0 {
            segments.push(Vec::new());
        }
        let seg = segments.last_mut().expect("segment");
        let mut word = String::new();
        for ch in part.chars() {
            if ch == ' ' {
                if !word.is_empty() {
                    seg.push(Token {
                        text: std::mem::take(&mut word),
                        kind: TokenKind::Word,
                        style: style.clone(),
                    });
                }
                seg.push(Token {
                    text: " ".to_string(),
                    kind: TokenKind::Space,
                    style: style.clone(),
                });
            } else {
                word.push(ch);
            }
        }
        if !word.is_empty() {
            seg.push(Token {
                text: word,
                kind: TokenKind::Word,
                style: style.clone(),
            });
        }
    }
}

fn tokenize_into(text: &str, style: &TextStyle, segments: &mut Vec<Vec<Token>>) {
    segments.push(Vec::new());
    tokenize_append(text, style, segments);
}

// ─── Line building ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Line {
    runs: Vec<(TextStyle, String)>,
    width: f64,
    height: f64,
    ascent: f64,
}

/// Greedily build one line from `tokens[start..]` at the given width.
/// Returns the line (if any tokens were consumed) and the next start index.
fn next_line(tokens: &[Token], start: usize, width: f64, fonts: &FontContext) -> (Option<Line>, usize) {
    let mut i = start;
    // Leading spaces vanish at a line start.
    while i < tokens.len() && tokens[i].kind == TokenKind::Space {
        i += 1;
    }
    if i >= tokens.len() {
        return (None, i);
    }

    let mut taken: Vec<&Token> = Vec::new();
    let mut line_w = 0.0;
    while i < tokens.len() {
        let t = &tokens[i];
        let w = fonts.measure(&t.text, &t.style.family, t.style.weight, t.style.italic, t.style.size);
        if line_w + w > width && !taken.is_empty() && t.kind == TokenKind::Word {
            break;
        }
        taken.push(t);
        line_w += w;
        i += 1;
    }
    // Trailing spaces don't count toward the line width.
    while matches!(taken.last(), Some(t) if t.kind == TokenKind::Space) {
        let t = taken.pop().expect("just matched");
        line_w -= fonts.measure(&t.text, &t.style.family, t.style.weight, t.style.italic, t.style.size);
    }
    if taken.is_empty() {
        return (None, i);
    }

    // Merge consecutive tokens of identical style into runs.
    let mut runs: Vec<(TextStyle, String)> = Vec::new();
    for t in &taken {
        match runs.last_mut() {
            Some((style, text)) if *style == t.style => text.push_str(&t.text),
            _ => runs.push((t.style.clone(), t.text.clone())),
        }
    }
    let max_size = taken.iter().map(|t| t.style.size).fold(0.0, f64::max);
    let ascent = taken
        .iter()
        .map(|t| fonts.ascent(&t.style.family, t.style.weight, t.style.italic, t.style.size))
        .fold(0.0, f64::max);
    (
        Some(Line {
            runs,
            width: line_w,
            height: max_size * LINE_FACTOR,
            ascent,
        }),
        i,
    )
}

/// Wrap as many lines as fit into `avail_h`, starting at `cursor`. With
/// `force` set the first line is taken even when it exceeds the height.
/// Returns the updated cursor, the lines, and whether the paragraph is done.
fn wrap_from(
    segments: &[Vec<Token>],
    cursor: Cursor,
    width: f64,
    avail_h: f64,
    force: bool,
    fonts: &FontContext,
) -> (Cursor, Vec<Line>, bool) {
    let mut lines = Vec::new();
    let mut used_h = 0.0;
    let mut seg = cursor.segment;
    let mut tok = cursor.token;

    while seg < segments.len() {
        let tokens = &segments[seg];
        loop {
            let (line, next) = next_line(tokens, tok, width, fonts);
            let Some(line) = line else {
                break;
            };
            if used_h + line.height > avail_h && !(force && lines.is_empty()) {
                return (
                    Cursor {
                        item: cursor.item,
                        segment: seg,
                        token: tok,
                    },
                    lines,
                    false,
                );
            }
            used_h += line.height;
            tok = next;
            lines.push(line);
            if tok >= tokens.len() {
                break;
            }
        }
        seg += 1;
        tok = 0;
    }
    (
        Cursor {
            item: cursor.item,
            segment: segments.len(),
            token: 0,
        },
        lines,
        true,
    )
}

fn emit_line(ops: &mut Vec<DrawOp>, line: &Line, x: f64, baseline: f64, fonts: &FontContext) {
    let mut run_x = x;
    for (style, text) in &line.runs {
        let width = fonts.measure(text, &style.family, style.weight, style.italic, style.size);
        ops.push(DrawOp::Text(TextSpan {
            origin: Point::new(run_x, baseline),
            text: text.clone(),
            font: fonts.resolved_name(&style.family, style.weight, style.italic),
            size: style.size,
            color: style.color,
            width,
        }));
        run_x += width;
    }
}

// ─── Table row layout ───────────────────────────────────────────────

struct RowLayout {
    height: f64,
    cells: Vec<CellLayout>,
    /// Nominal row extent; cell rects may overflow past it.
    x0: f64,
    x1: f64,
}

struct CellLayout {
    id: Option<String>,
    /// Nominal cell rect relative to the row top; x1 may extend past the
    /// assigned column when a single word cannot fit the width.
    rect: Rect,
    bg: Option<Color>,
    lines: Vec<Line>,
    images: Vec<String>,
    align: TextAlign,
}

fn layout_row(cells: &[CellContent], x0: f64, width: f64, fonts: &FontContext) -> RowLayout {
    let n = cells.len().max(1);
    let cell_w = width / n as f64;
    let inner_w = (cell_w - 2.0 * CELL_PAD).max(1.0);

    let mut layouts = Vec::new();
    let mut row_h: f64 = 0.0;
    for (i, cell) in cells.iter().enumerate() {
        let cx = x0 + i as f64 * cell_w;
        let mut lines = Vec::new();
        let mut max_line_w: f64 = 0.0;
        for seg in &cell.segments {
            let mut tok = 0;
            loop {
                let (line, next) = next_line(seg, tok, inner_w, fonts);
                let Some(line) = line else {
                    break;
                };
                max_line_w = max_line_w.max(line.width);
                lines.push(line);
                tok = next;
                if tok >= seg.len() {
                    break;
                }
            }
        }
        let text_h: f64 = lines.iter().map(|l| l.height).sum();
        let img_h = cell.images.len() as f64 * (CELL_IMAGE_HEIGHT + 2.0);
        let content_h = (text_h + img_h).max(DEFAULT_FONT_SIZE * LINE_FACTOR);
        row_h = row_h.max(content_h + 2.0 * CELL_PAD);

        // Overflowing content widens the reported cell rect past its column.
        let x1 = cx + cell_w.max(max_line_w + 2.0 * CELL_PAD);
        layouts.push(CellLayout {
            id: cell.id.clone(),
            rect: Rect::new(cx, 0.0, x1, 0.0),
            bg: cell.bg,
            lines,
            images: cell.images.clone(),
            align: cell.align,
        });
    }

    RowLayout {
        height: row_h,
        cells: layouts,
        x0,
        x1: x0 + width,
    }
}

fn commit_row(
    layout: &RowLayout,
    y: f64,
    row_id: Option<String>,
    ops: &mut Vec<DrawOp>,
    positions: &mut Vec<ElementPosition>,
    fonts: &FontContext,
) {
    let row_h = layout.height;
    let (row_x0, row_x1) = (layout.x0, layout.x1);

    let mut cell_positions = Vec::new();
    for cell in &layout.cells {
        let rect = Rect::new(cell.rect.x0, y, cell.rect.x1, y + row_h);

        if let Some(bg) = cell.bg {
            ops.push(DrawOp::Rect {
                rect,
                stroke: None,
                fill: Some(bg),
                line_width: 0.7,
            });
        }
        ops.push(DrawOp::Rect {
            rect,
            stroke: Some(CELL_BORDER),
            fill: None,
            line_width: 0.7,
        });

        let mut cy = y + CELL_PAD;
        let inner_w = rect.width() - 2.0 * CELL_PAD;
        for line in &cell.lines {
            let lx = match cell.align {
                TextAlign::Left => rect.x0 + CELL_PAD,
                TextAlign::Center => rect.x0 + CELL_PAD + (inner_w - line.width) / 2.0,
                TextAlign::Right => rect.x1 - CELL_PAD - line.width,
            };
            emit_line(ops, line, lx, cy + line.ascent, fonts);
            cy += line.height;
        }
        for src in &cell.images {
            ops.push(DrawOp::Image {
                rect: Rect::new(
                    rect.x0 + CELL_PAD,
                    cy,
                    rect.x0 + CELL_PAD + CELL_IMAGE_HEIGHT,
                    cy + CELL_IMAGE_HEIGHT,
                ),
                src: src.clone(),
            });
            cy += CELL_IMAGE_HEIGHT + 2.0;
        }

        cell_positions.push(ElementPosition {
            depth: 3,
            rect,
            open_close: POS_OPEN | POS_CLOSE,
            id: cell.id.clone(),
        });
    }

    positions.push(ElementPosition {
        depth: 2,
        rect: Rect::new(row_x0, y, row_x1, y + row_h),
        open_close: POS_OPEN,
        id: row_id.clone(),
    });
    positions.extend(cell_positions);
    positions.push(ElementPosition {
        depth: 2,
        rect: Rect::new(row_x0, y, row_x1, y + row_h),
        open_close: POS_CLOSE,
        id: row_id,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup;

    fn story_for(markup_src: &str, css: &str) -> Story {
        let body = markup::parse(markup_src).unwrap();
        let sheet = Stylesheet::parse(css);
        Story::new(&body, &sheet, Rc::new(FontContext::new()))
    }

    #[test]
    fn test_place_all_in_one_rect() {
        let mut story = story_for("<p>Hello flowing world</p>", "");
        let rect = Rect::new(0.0, 0.0, 300.0, 200.0);
        let (more, fill) = story.place(&rect);
        assert!(!more);
        assert!(fill.y1 > 0.0 && fill.y1 < 40.0);
        assert!(!story.more());
    }

    #[test]
    fn test_place_continues_across_rects() {
        let text = "word ".repeat(300);
        let mut story = story_for(&format!("<p>{text}</p>"), "");
        let rect = Rect::new(0.0, 0.0, 200.0, 60.0);
        let (more, fill) = story.place(&rect);
        assert!(more);
        assert!(fill.y1 <= rect.y1 + 1e-9);
        let mut guard = 0;
        let mut done = false;
        while guard < 100 {
            let (m, _) = story.place(&rect);
            if !m {
                done = true;
                break;
            }
            guard += 1;
        }
        assert!(done, "story never exhausted");
    }

    #[test]
    fn test_reset_restarts_from_top() {
        let mut story = story_for("<p>alpha beta gamma</p>", "");
        let rect = Rect::new(0.0, 0.0, 300.0, 100.0);
        let (_, first) = story.place(&rect);
        story.reset();
        let (_, second) = story.place(&rect);
        assert_eq!(first, second);
    }

    #[test]
    fn test_draw_commits_and_drains() {
        let mut story = story_for("<p>painted once</p>", "");
        let rect = Rect::new(0.0, 0.0, 300.0, 100.0);
        story.place(&rect);
        let mut page = Page::new(Rect::new(0.0, 0.0, 300.0, 100.0));
        story.draw(&mut page);
        assert!(!page.text_spans(None).is_empty());
        let mut empty = Page::new(Rect::new(0.0, 0.0, 300.0, 100.0));
        story.draw(&mut empty);
        assert!(empty.text_spans(None).is_empty());
    }

    #[test]
    fn test_element_positions_find_row() {
        let mut story = story_for(
            r#"<table><tr id="top"><th>Name</th><th>Age</th></tr><tr><td>Ann</td><td>30</td></tr></table>"#,
            "",
        );
        let rect = Rect::new(10.0, 10.0, 410.0, 400.0);
        let (more, _) = story.place(&rect);
        assert!(!more);
        let mut header_rect = None;
        let mut last_col = None;
        let ctx = PositionContext {
            page: 0,
            header: Some("top".to_string()),
        };
        story.element_positions(
            |pos, ctx| {
                if pos.depth == 3 {
                    last_col = Some(pos.rect);
                }
                if pos.open_close & POS_CLOSE != 0 && pos.id == ctx.header {
                    header_rect = Some(pos.rect);
                }
            },
            &ctx,
        );
        let header = header_rect.expect("header row not reported");
        assert!((header.x0 - 10.0).abs() < 1e-9);
        assert!(header.height() > 10.0);
        assert!(last_col.is_some());
    }

    #[test]
    fn test_narrow_cells_overflow_reported() {
        let mut story = story_for(
            r#"<table><tr id="top"><th>Unbreakablewideheading</th><th>More</th></tr></table>"#,
            "",
        );
        // 40pt wide: the heading word cannot fit half of it.
        let rect = Rect::new(0.0, 0.0, 40.0, 300.0);
        story.place(&rect);
        let mut header = None;
        let mut last_col = None;
        let ctx = PositionContext {
            page: 0,
            header: Some("top".to_string()),
        };
        story.element_positions(
            |pos, ctx| {
                if pos.depth == 3 {
                    last_col = Some(pos.rect);
                }
                if pos.open_close & POS_CLOSE != 0 && pos.id == ctx.header {
                    header = Some(pos.rect);
                }
            },
            &ctx,
        );
        let header = header.unwrap();
        let last_col = last_col.unwrap();
        assert!(last_col.x1 > header.x0 + 40.0, "overflow not visible in cell rect");
    }

    #[test]
    fn test_hard_break_forces_new_line() {
        let mut one = story_for("<p>aa bb</p>", "");
        let mut two = story_for("<p>aa<br/>bb</p>", "");
        let rect = Rect::new(0.0, 0.0, 300.0, 100.0);
        let (_, fill_one) = one.place(&rect);
        let (_, fill_two) = two.place(&rect);
        assert!(fill_two.y1 > fill_one.y1);
    }

    #[test]
    fn test_stylesheet_size_applies() {
        let mut small = story_for("<p>same text here</p>", "p { font-size: 8pt }");
        let mut large = story_for("<p>same text here</p>", "p { font-size: 24pt }");
        let rect = Rect::new(0.0, 0.0, 400.0, 400.0);
        let (_, fill_small) = small.place(&rect);
        let (_, fill_large) = large.place(&rect);
        assert!(fill_large.y1 > fill_small.y1);
    }
}
