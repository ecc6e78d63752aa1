//! Integration tests for the full report pipeline.
//!
//! These tests exercise the path from markup + row data to finished pages
//! and PDF bytes. They verify:
//! - sections paginate across column cells and pages
//! - table header rows repeat on every continuation
//! - page headers, footers, and running page numbers land on every page
//! - rendering is deterministic
//! - configuration errors fail the run before any output exists

use broadsheet::{
    Options, PaperSize, Rect, Report, ReportError, RowSource, Section, TableBlock, TextBlock,
};

// ─── Helpers ────────────────────────────────────────────────────

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const TABLE_HTML: &str = r#"
    <table>
        <tr id="toprow"><th>Country</th><th>Capital</th><th>Note</th></tr>
        <tr id="template"><td id="country"></td><td id="capital"></td><td id="note"></td></tr>
    </table>"#;

fn country_rows(n: usize) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "country".to_string(),
        "capital".to_string(),
        "note".to_string(),
    ]];
    for i in 0..n {
        rows.push(vec![
            format!("Country {i}"),
            format!("Capital {i}"),
            format!("Note for row number {i}"),
        ]);
    }
    rows
}

fn long_text(paragraphs: usize) -> String {
    let para = format!("<p>{}</p>", "lorem ipsum dolor sit amet ".repeat(40));
    std::iter::repeat(para.as_str()).take(paragraphs).collect()
}

fn page_texts(page: &broadsheet::Page) -> Vec<String> {
    page.text_spans(None)
        .iter()
        .map(|s| s.text.clone())
        .collect()
}

// ─── Pagination ─────────────────────────────────────────────────

#[test]
fn test_single_page_report() {
    let mut report = Report::new(PaperSize::A4.rect())
        .section(Section::new(TextBlock::new("<h1>Annual Report</h1><p>All good.</p>")));
    let doc = report.render().unwrap();
    assert_eq!(doc.page_count(), 1);
    let texts = page_texts(&doc.pages[0]);
    assert!(texts.iter().any(|t| t == "Annual Report"));
    assert!(texts.iter().any(|t| t == "Page 1 of 1"));
}

#[test]
fn test_text_flows_across_pages_with_numbers() {
    init_logs();
    let mut report =
        Report::new(PaperSize::A4.rect()).section(Section::new(TextBlock::new(long_text(40))));
    let doc = report.render().unwrap();
    let total = doc.page_count();
    assert!(total >= 2, "expected at least two pages, got {total}");
    for (i, page) in doc.pages.iter().enumerate() {
        let expected = format!("Page {} of {}", i + 1, total);
        assert!(
            page_texts(page).iter().any(|t| t == &expected),
            "missing '{expected}'"
        );
    }
}

#[test]
fn test_two_column_layout_fills_both_columns() {
    let mut report = Report::new(PaperSize::A4.rect())
        .columns(2)
        .section(Section::new(TextBlock::new(long_text(25))));
    let doc = report.render().unwrap();
    let mid = PaperSize::A4.rect().width() / 2.0;
    let spans = doc.pages[0].text_spans(None);
    assert!(spans.iter().any(|s| s.origin.x < mid));
    assert!(spans
        .iter()
        .any(|s| s.origin.x >= mid && !s.text.starts_with("Page ")));
    // Column text must stay inside its cell, not overlap the gutter badly.
    assert!(spans.iter().all(|s| s.origin.x < PaperSize::A4.rect().width()));
}

#[test]
fn test_sections_share_page_when_newpage_disabled() {
    let mut report = Report::new(PaperSize::A4.rect())
        .section(Section::new(TextBlock::new("<h2>Intro</h2><p>short</p>")))
        .section(
            Section::new(TextBlock::new("<h2>Details</h2><p>also short</p>"))
                .options(Options::new().newpage(false)),
        );
    let doc = report.render().unwrap();
    assert_eq!(doc.page_count(), 1);
    let texts = page_texts(&doc.pages[0]);
    assert!(texts.iter().any(|t| t == "Intro"));
    assert!(texts.iter().any(|t| t == "Details"));

    // The second section continues below the first.
    let spans = doc.pages[0].text_spans(None);
    let intro_y = spans.iter().find(|s| s.text == "Intro").unwrap().origin.y;
    let details_y = spans.iter().find(|s| s.text == "Details").unwrap().origin.y;
    assert!(details_y > intro_y);
}

#[test]
fn test_header_footer_repeat_on_every_page() {
    let mut report = Report::new(PaperSize::A4.rect())
        .header(TextBlock::new("<p>Quarterly Figures</p>"))
        .footer(TextBlock::new("<p>internal use only</p>"))
        .section(Section::new(TextBlock::new(long_text(40))));
    let doc = report.render().unwrap();
    assert!(doc.page_count() >= 2);
    for page in &doc.pages {
        let texts = page_texts(page);
        assert!(texts.iter().any(|t| t == "Quarterly Figures"));
        assert!(texts.iter().any(|t| t == "internal use only"));
    }
}

// ─── Tables ─────────────────────────────────────────────────────

#[test]
fn test_table_rows_render_in_order() {
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML).rows(RowSource::Fixed(country_rows(5))),
    ));
    let doc = report.render().unwrap();
    assert_eq!(doc.page_count(), 1);
    let texts = page_texts(&doc.pages[0]);
    assert!(texts.iter().any(|t| t == "Country 0"));
    assert!(texts.iter().any(|t| t == "Capital 4"));

    let spans = doc.pages[0].text_spans(None);
    let y0 = spans.iter().find(|s| s.text == "Country 0").unwrap().origin.y;
    let y4 = spans.iter().find(|s| s.text == "Country 4").unwrap().origin.y;
    assert!(y4 > y0);
}

#[test]
fn test_table_header_repeats_on_continuation() {
    init_logs();
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(country_rows(120)))
            .top_row("toprow"),
    ));
    let doc = report.render().unwrap();
    assert!(doc.page_count() >= 2, "table should spill onto page 2");

    // Every page carries the header text, replayed near the top of the
    // table area on continuations.
    for page in &doc.pages {
        let texts = page_texts(page);
        assert!(texts.iter().any(|t| t == "Country"), "header text missing");
        assert!(texts.iter().any(|t| t == "Capital"));
    }
    let page2 = &doc.pages[1];
    let header_span = page2
        .text_spans(None)
        .into_iter()
        .find(|s| s.text == "Country")
        .unwrap()
        .clone();
    let first_row_span = page2
        .text_spans(None)
        .into_iter()
        .find(|s| s.text.starts_with("Country "))
        .unwrap()
        .clone();
    assert!(
        header_span.origin.y < first_row_span.origin.y,
        "replayed header should sit above the continued rows"
    );
}

#[test]
fn test_table_header_replay_preserves_font_and_size() {
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML)
            .rows(RowSource::Fixed(country_rows(120)))
            .top_row("toprow"),
    ));
    let doc = report.render().unwrap();
    assert!(doc.page_count() >= 2);

    let find_header = |page: &broadsheet::Page| {
        page.text_spans(None)
            .into_iter()
            .find(|s| s.text == "Capital")
            .unwrap()
            .clone()
    };
    let first = find_header(&doc.pages[0]);
    let replayed = find_header(&doc.pages[1]);
    assert_eq!(first.font, replayed.font);
    assert!((first.size - replayed.size).abs() < 1e-9);
}

#[test]
fn test_lazy_rows_and_alternating_backgrounds() {
    let rows = country_rows(6);
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML)
            .rows(RowSource::Lazy(Box::new(rows.into_iter())))
            .alternating_bg(["#eeeeee", "#ffffff"])
            .last_row_bg("#ffcccc"),
    ));
    let doc = report.render().unwrap();
    // Row backgrounds arrive as filled drawings behind the text.
    let fills: Vec<_> = doc.pages[0]
        .drawings()
        .into_iter()
        .filter(|d| d.fill.is_some())
        .collect();
    assert!(!fills.is_empty(), "expected background fills for data rows");
}

// ─── Failure semantics ──────────────────────────────────────────

#[test]
fn test_empty_report_fails() {
    let mut report = Report::new(PaperSize::A4.rect());
    assert!(matches!(report.render(), Err(ReportError::EmptySections)));
}

#[test]
fn test_missing_template_row_fails() {
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new("<table><tr><td>static</td></tr></table>")
            .rows(RowSource::Fixed(country_rows(3))),
    ));
    assert!(matches!(
        report.render(),
        Err(ReportError::MissingTemplateRow)
    ));
}

#[test]
fn test_unknown_field_fails_with_name() {
    let rows = vec![
        vec!["country".to_string(), "nosuchfield".to_string()],
        vec!["A".to_string(), "B".to_string()],
    ];
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML).rows(RowSource::Fixed(rows)),
    ));
    match report.render() {
        Err(ReportError::UnknownField(field)) => assert_eq!(field, "nosuchfield"),
        other => panic!("expected UnknownField, got {other:?}"),
    }
}

#[test]
fn test_header_only_rows_fail() {
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new(TABLE_HTML).rows(RowSource::Fixed(country_rows(0))),
    ));
    assert!(matches!(
        report.render(),
        Err(ReportError::NotEnoughRows(1))
    ));
}

#[test]
fn test_failed_run_writes_no_file() {
    let path = std::env::temp_dir().join("broadsheet-failed-run.pdf");
    let _ = std::fs::remove_file(&path);
    let mut report = Report::new(PaperSize::A4.rect()).section(Section::new(
        TableBlock::new("<p>no table here</p>").rows(RowSource::Fixed(country_rows(3))),
    ));
    assert!(report.run(&path).is_err());
    assert!(!path.exists(), "failed run must not leave partial output");
}

// ─── PDF output ─────────────────────────────────────────────────

#[test]
fn test_pdf_bytes_are_structurally_valid() {
    let mut report = Report::new(PaperSize::A4.rect())
        .header(TextBlock::new("<p>head</p>"))
        .section(Section::new(TextBlock::new("<h1>Title</h1><p>Body text.</p>")))
        .section(Section::new(
            TableBlock::new(TABLE_HTML).rows(RowSource::Fixed(country_rows(4))),
        ));
    let bytes = report.run_to_bytes().unwrap();
    assert!(bytes.starts_with(b"%PDF-1.7"));
    let tail = String::from_utf8_lossy(&bytes[bytes.len().saturating_sub(64)..]).to_string();
    assert!(tail.contains("%%EOF"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("/Type /Catalog"));
    assert!(text.contains("/Count 2"));
}

#[test]
fn test_rendering_is_deterministic() {
    init_logs();
    let build = || {
        Report::new(PaperSize::A4.rect())
            .columns(2)
            .header(TextBlock::new("<p>head</p>"))
            .footer(TextBlock::new("<p>foot</p>"))
            .section(Section::new(TextBlock::new(long_text(10))))
            .section(Section::new(
                TableBlock::new(TABLE_HTML)
                    .rows(RowSource::Fixed(country_rows(30)))
                    .top_row("toprow")
                    .alternating_bg(["#eee", "#fff"]),
            ))
    };
    let a = build().run_to_bytes().unwrap();
    let b = build().run_to_bytes().unwrap();
    assert_eq!(a, b, "same input must produce identical bytes");
}

#[test]
fn test_custom_page_size_applies_per_section() {
    let mut report = Report::new(PaperSize::A4.rect())
        .section(Section::new(TextBlock::new("<p>normal</p>")))
        .section(
            Section::new(TextBlock::new("<p>landscapeish</p>")).options(
                Options::new().format(broadsheet::PageFormat::Size {
                    width: 841.89,
                    height: 595.28,
                }),
            ),
        );
    let doc = report.render().unwrap();
    assert_eq!(doc.page_count(), 2);
    assert_eq!(doc.pages[0].mediabox, PaperSize::A4.rect());
    assert_eq!(doc.pages[1].mediabox, Rect::new(0.0, 0.0, 841.89, 595.28));
}
