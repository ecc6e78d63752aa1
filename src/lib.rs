//! # Broadsheet
//!
//! A paginated multi-column report engine.
//!
//! Most report generators lay content onto an infinite canvas and slice it
//! into pages afterwards, which breaks tables at page boundaries and loses
//! their headers. Broadsheet paginates as it goes: **every placement
//! decision is made against a concrete column cell on a concrete page.**
//! Sections flow through the cells of successive pages, tables repeat
//! their header row on every continuation, and page headers, footers, and
//! running page numbers come out of the same single pass.
//!
//! ## Architecture
//!
//! ```text
//! Markup + CSS + row data
//!       ↓
//!   [markup]/[style]   element tree, stylesheet subset
//!       ↓
//!   [table]            template-row materialization, header capture
//!       ↓
//!   [story]            incremental flow layout into offered rectangles
//!       ↓
//!   [report]           pagination state machine, post-pass
//!       ↓
//!   [pdf]              serialize to PDF bytes
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use broadsheet::{PaperSize, Report, Section, TextBlock};
//!
//! let mut report = Report::new(PaperSize::A4.rect())
//!     .section(Section::new(TextBlock::new("<h1>Hello</h1><p>World</p>")));
//! report.run("hello.pdf")?;
//! # Ok::<(), broadsheet::ReportError>(())
//! ```

pub mod block;
pub mod error;
pub mod font;
pub mod geometry;
pub mod images;
pub mod markup;
pub mod pdf;
pub mod report;
pub mod story;
pub mod style;
pub mod surface;
pub mod table;

pub use block::{ContentBlock, ImageBlock, Options, PageFormat, RowSource, TextBlock};
pub use error::{ReportError, Result};
pub use font::FontContext;
pub use geometry::{Matrix, PaperSize, Point, Rect};
pub use report::{Report, Section};
pub use style::{Color, Style, Stylesheet, TextAlign};
pub use surface::{Document, DocumentWriter, Page};
pub use table::TableBlock;
