//! # PDF Serializer
//!
//! Turns the finished in-memory document into PDF 1.7 bytes.
//!
//! This is a from-scratch writer: the subset of PDF a report needs (text,
//! rectangles, lines, images, embedded fonts) is small enough to emit
//! directly, and doing so keeps the engine self-contained.
//!
//! ## Structure
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- catalog, pages tree, fonts, images, content
//! ...
//! xref                <- byte offsets of each object
//! trailer             <- points to the catalog
//! %%EOF
//! ```
//!
//! ## Fonts
//!
//! Standard PDF fonts (Helvetica, Times, Courier) are plain Type1
//! references with WinAnsi encoding. Registered TrueType fonts embed the
//! whole font program as CIDFontType2 with Identity-H encoding: FontFile2,
//! FontDescriptor, CIDFont, ToUnicode CMap, and the root Type0 dictionary.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::error::{ReportError, Result};
use crate::font::{FontContext, FontData};
use crate::images::{self, ImageKind};
use crate::surface::{Document, DrawOp, Page};

struct PdfObject {
    data: Vec<u8>,
}

/// Tracks allocated PDF objects during writing.
struct PdfBuilder {
    objects: Vec<PdfObject>,
    /// Resource name -> (object id, index for /F{i}).
    font_objects: Vec<(String, usize)>,
    /// Glyph mapping for embedded fonts, keyed by resource name.
    custom_glyphs: HashMap<String, HashMap<char, u16>>,
    /// Image source -> (index for /Im{i}, object id); decode failures get
    /// no object and render as a placeholder.
    image_objects: Vec<(String, Option<usize>)>,
}

/// Serialize a rendered document into PDF bytes.
pub fn serialize(doc: &Document, fonts: &FontContext) -> Result<Vec<u8>> {
    let mut builder = PdfBuilder {
        objects: Vec::new(),
        font_objects: Vec::new(),
        custom_glyphs: HashMap::new(),
        image_objects: Vec::new(),
    };

    // Object ids are 1-based; 0 is the free-list placeholder,
    // 1 the catalog, 2 the pages tree.
    builder.objects.push(PdfObject { data: vec![] });
    builder.objects.push(PdfObject { data: vec![] });
    builder.objects.push(PdfObject { data: vec![] });

    register_fonts(&mut builder, doc, fonts)?;
    register_images(&mut builder, doc);

    let mut page_obj_ids = Vec::new();
    for page in &doc.pages {
        let content = build_content_stream(page, &builder);
        let compressed = compress_to_vec_zlib(content.as_bytes(), 6);

        let content_obj_id = builder.objects.len();
        let mut data: Vec<u8> = Vec::new();
        let _ = write!(
            data,
            "<< /Length {} /Filter /FlateDecode >>\nstream\n",
            compressed.len()
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream");
        builder.objects.push(PdfObject { data });

        let page_obj_id = builder.objects.len();
        let font_resources: String = builder
            .font_objects
            .iter()
            .enumerate()
            .map(|(i, (_, obj_id))| format!("/F{i} {obj_id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        let xobject_resources: String = builder
            .image_objects
            .iter()
            .enumerate()
            .filter_map(|(i, (_, obj_id))| obj_id.map(|id| format!("/Im{i} {id} 0 R")))
            .collect::<Vec<_>>()
            .join(" ");
        let resources = if xobject_resources.is_empty() {
            format!("/Font << {font_resources} >>")
        } else {
            format!("/Font << {font_resources} >> /XObject << {xobject_resources} >>")
        };
        let page_dict = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Contents {} 0 R /Resources << {} >> >>",
            page.mediabox.width(),
            page.mediabox.height(),
            content_obj_id,
            resources
        );
        builder.objects.push(PdfObject {
            data: page_dict.into_bytes(),
        });
        page_obj_ids.push(page_obj_id);
    }

    builder.objects[1].data = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
    let kids: String = page_obj_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    builder.objects[2].data = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        page_obj_ids.len()
    )
    .into_bytes();

    Ok(write_body(&builder))
}

/// Write all objects, the xref table, and the trailer.
fn write_body(builder: &PdfBuilder) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = vec![0; builder.objects.len()];

    output.extend_from_slice(b"%PDF-1.7\n");
    output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

    for (i, obj) in builder.objects.iter().enumerate().skip(1) {
        offsets[i] = output.len();
        let _ = write!(output, "{i} 0 obj\n");
        output.extend_from_slice(&obj.data);
        output.extend_from_slice(b"\nendobj\n\n");
    }

    let xref_offset = output.len();
    let _ = write!(output, "xref\n0 {}\n", builder.objects.len());
    let _ = write!(output, "0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        let _ = write!(output, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        output,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        builder.objects.len()
    );
    output
}

// ─── Fonts ──────────────────────────────────────────────────────────

/// One PDF font object per resource name used anywhere in the document,
/// in deterministic sorted order.
fn register_fonts(builder: &mut PdfBuilder, doc: &Document, fonts: &FontContext) -> Result<()> {
    let mut used_chars: HashMap<String, HashSet<char>> = HashMap::new();
    for page in &doc.pages {
        for op in page.ops() {
            if let DrawOp::Text(span) = op {
                used_chars
                    .entry(span.font.clone())
                    .or_default()
                    .extend(span.text.chars());
            }
        }
    }

    let mut names: Vec<String> = used_chars.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        names.push("Helvetica".to_string());
    }

    for name in names {
        match fonts.by_name(&name) {
            Some(FontData::Standard(std_font)) => {
                let obj_id = builder.objects.len();
                let dict = format!(
                    "<< /Type /Font /Subtype /Type1 /BaseFont /{} \
                     /Encoding /WinAnsiEncoding >>",
                    std_font.pdf_name()
                );
                builder.objects.push(PdfObject {
                    data: dict.into_bytes(),
                });
                builder.font_objects.push((name, obj_id));
            }
            Some(FontData::Custom { data, metrics }) => {
                let chars = used_chars.remove(&name).unwrap_or_default();
                let glyphs: HashMap<char, u16> = chars
                    .iter()
                    .filter_map(|&ch| metrics.glyph_ids.get(&ch).map(|&gid| (ch, gid)))
                    .collect();
                let type0_id = write_embedded_font(builder, &name, data, &glyphs, metrics)?;
                builder.custom_glyphs.insert(name.clone(), glyphs);
                builder.font_objects.push((name, type0_id));
            }
            None => {
                // Header replay can reference a name the context no longer
                // knows; render it as Helvetica rather than failing.
                let obj_id = builder.objects.len();
                builder.objects.push(PdfObject {
                    data: b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica \
                     /Encoding /WinAnsiEncoding >>"
                        .to_vec(),
                });
                builder.font_objects.push((name, obj_id));
            }
        }
    }
    Ok(())
}

/// Write the five objects of an embedded TrueType font. Returns the object
/// id of the root Type0 dictionary.
fn write_embedded_font(
    builder: &mut PdfBuilder,
    name: &str,
    ttf_data: &[u8],
    glyphs: &HashMap<char, u16>,
    metrics: &crate::font::CustomFontMetrics,
) -> Result<usize> {
    let face = ttf_parser::Face::parse(ttf_data, 0)
        .map_err(|e| ReportError::Font(format!("cannot parse font data for '{name}': {e}")))?;
    let units_per_em = metrics.units_per_em;
    let scale = 1000.0 / units_per_em as f64;
    let pdf_name = sanitize_font_name(name);

    // 1. FontFile2: the whole compressed font program.
    let compressed = compress_to_vec_zlib(ttf_data, 6);
    let fontfile2_id = builder.objects.len();
    let mut data: Vec<u8> = Vec::new();
    let _ = write!(
        data,
        "<< /Length {} /Length1 {} /Filter /FlateDecode >>\nstream\n",
        compressed.len(),
        ttf_data.len()
    );
    data.extend_from_slice(&compressed);
    data.extend_from_slice(b"\nendstream");
    builder.objects.push(PdfObject { data });

    // 2. FontDescriptor.
    let descriptor_id = builder.objects.len();
    let bbox = face.global_bounding_box();
    let stem_v = if name.contains("-Bold") { 120 } else { 80 };
    let descriptor = format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags 4 \
         /FontBBox [{} {} {} {}] /ItalicAngle {} \
         /Ascent {} /Descent {} /CapHeight {} /StemV {} \
         /FontFile2 {} 0 R >>",
        pdf_name,
        (bbox.x_min as f64 * scale) as i32,
        (bbox.y_min as f64 * scale) as i32,
        (bbox.x_max as f64 * scale) as i32,
        (bbox.y_max as f64 * scale) as i32,
        if name.contains("-Italic") { -12 } else { 0 },
        (metrics.ascender as f64 * scale) as i32,
        (metrics.descender as f64 * scale) as i32,
        (face.capital_height().unwrap_or(metrics.ascender) as f64 * scale) as i32,
        stem_v,
        fontfile2_id,
    );
    builder.objects.push(PdfObject {
        data: descriptor.into_bytes(),
    });

    // 3. CIDFont with per-glyph widths for the glyphs actually used.
    let cidfont_id = builder.objects.len();
    let mut entries: Vec<(u16, u32)> = glyphs
        .values()
        .collect::<HashSet<_>>()
        .into_iter()
        .map(|&gid| {
            let advance = face
                .glyph_hor_advance(ttf_parser::GlyphId(gid))
                .unwrap_or(0);
            (gid, (advance as f64 * scale) as u32)
        })
        .collect();
    entries.sort_by_key(|(gid, _)| *gid);
    let mut w_array = String::from("[");
    for (gid, width) in &entries {
        let _ = write!(w_array, " {gid} [{width}]");
    }
    w_array.push_str(" ]");
    let cidfont = format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{pdf_name} \
         /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
         /FontDescriptor {descriptor_id} 0 R /DW 1000 /W {w_array} \
         /CIDToGIDMap /Identity >>"
    );
    builder.objects.push(PdfObject {
        data: cidfont.into_bytes(),
    });

    // 4. ToUnicode CMap for text extraction.
    let tounicode_id = builder.objects.len();
    let cmap = build_tounicode_cmap(glyphs, &pdf_name);
    let compressed_cmap = compress_to_vec_zlib(cmap.as_bytes(), 6);
    let mut data: Vec<u8> = Vec::new();
    let _ = write!(
        data,
        "<< /Length {} /Filter /FlateDecode >>\nstream\n",
        compressed_cmap.len()
    );
    data.extend_from_slice(&compressed_cmap);
    data.extend_from_slice(b"\nendstream");
    builder.objects.push(PdfObject { data });

    // 5. Root Type0 dictionary.
    let type0_id = builder.objects.len();
    let type0 = format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{pdf_name} \
         /Encoding /Identity-H \
         /DescendantFonts [{cidfont_id} 0 R] \
         /ToUnicode {tounicode_id} 0 R >>"
    );
    builder.objects.push(PdfObject {
        data: type0.into_bytes(),
    });
    Ok(type0_id)
}

fn build_tounicode_cmap(glyphs: &HashMap<char, u16>, font_name: &str) -> String {
    let mut gid_to_unicode: Vec<(u16, u32)> =
        glyphs.iter().map(|(&ch, &gid)| (gid, ch as u32)).collect();
    gid_to_unicode.sort_by_key(|(gid, _)| *gid);

    let mut cmap = String::new();
    let _ = write!(cmap, "/CIDInit /ProcSet findresource begin\n");
    let _ = write!(cmap, "12 dict begin\nbegincmap\n/CIDSystemInfo\n");
    let _ = write!(
        cmap,
        "<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n"
    );
    let _ = write!(cmap, "/CMapName /{font_name}-UTF16 def\n/CMapType 2 def\n");
    let _ = write!(cmap, "1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");
    // At most 100 entries per bfchar block.
    for chunk in gid_to_unicode.chunks(100) {
        let _ = write!(cmap, "{} beginbfchar\n", chunk.len());
        for &(gid, unicode) in chunk {
            let _ = write!(cmap, "<{gid:04X}> <{unicode:04X}>\n");
        }
        let _ = write!(cmap, "endbfchar\n");
    }
    let _ = write!(cmap, "endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// Strip characters a PDF name object cannot carry.
fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "CustomFont".to_string()
    } else {
        cleaned
    }
}

// ─── Images ─────────────────────────────────────────────────────────

/// One XObject per unique image source, in first-use order. Sources that
/// fail to decode keep their /Im slot but render as placeholders.
fn register_images(builder: &mut PdfBuilder, doc: &Document) {
    let mut seen: Vec<String> = Vec::new();
    for page in &doc.pages {
        for op in page.ops() {
            if let DrawOp::Image { src, .. } = op {
                if !seen.contains(src) {
                    seen.push(src.clone());
                }
            }
        }
    }

    for src in seen {
        let obj_id = match images::decode(&src) {
            Ok(img) => Some(write_image_xobject(builder, &img)),
            Err(e) => {
                log::warn!("cannot embed image '{src}': {e}");
                None
            }
        };
        builder.image_objects.push((src, obj_id));
    }
}

fn write_image_xobject(builder: &mut PdfBuilder, image: &images::DecodedImage) -> usize {
    let obj_id = builder.objects.len();
    let mut data: Vec<u8> = Vec::new();
    match &image.kind {
        ImageKind::Jpeg(bytes) => {
            let _ = write!(
                data,
                "<< /Type /XObject /Subtype /Image \
                 /Width {} /Height {} \
                 /ColorSpace /DeviceRGB \
                 /BitsPerComponent 8 \
                 /Filter /DCTDecode \
                 /Length {} >>\nstream\n",
                image.width,
                image.height,
                bytes.len()
            );
            data.extend_from_slice(bytes);
        }
        ImageKind::Rgb(rgb) => {
            let compressed = compress_to_vec_zlib(rgb, 6);
            let _ = write!(
                data,
                "<< /Type /XObject /Subtype /Image \
                 /Width {} /Height {} \
                 /ColorSpace /DeviceRGB \
                 /BitsPerComponent 8 \
                 /Filter /FlateDecode \
                 /Length {} >>\nstream\n",
                image.width,
                image.height,
                compressed.len()
            );
            data.extend_from_slice(&compressed);
        }
    }
    data.extend_from_slice(b"\nendstream");
    builder.objects.push(PdfObject { data });
    obj_id
}

// ─── Content streams ────────────────────────────────────────────────

/// Emit the page's draw commands as PDF operators, flipping y so layout's
/// top-left origin lands in PDF's bottom-left space.
fn build_content_stream(page: &Page, builder: &PdfBuilder) -> String {
    let h = page.mediabox.height();
    let mut stream = String::new();

    for op in page.ops() {
        match op {
            DrawOp::Text(span) => {
                let idx = font_index(&span.font, &builder.font_objects);
                let _ = write!(
                    stream,
                    "BT\n{:.3} {:.3} {:.3} rg\n/F{} {:.1} Tf\n{:.2} {:.2} Td\n",
                    span.color.r,
                    span.color.g,
                    span.color.b,
                    idx,
                    span.size,
                    span.origin.x,
                    h - span.origin.y
                );
                if let Some(glyphs) = builder.custom_glyphs.get(&span.font) {
                    let mut hex = String::new();
                    for ch in span.text.chars() {
                        let gid = glyphs.get(&ch).copied().unwrap_or(0);
                        let _ = write!(hex, "{gid:04X}");
                    }
                    let _ = write!(stream, "<{hex}> Tj\nET\n");
                } else {
                    let _ = write!(stream, "({}) Tj\nET\n", encode_winansi(&span.text));
                }
            }

            DrawOp::Rect {
                rect,
                stroke,
                fill,
                line_width,
            } => {
                let (x, y, w, rh) = (rect.x0, h - rect.y1, rect.width(), rect.height());
                if let Some(c) = fill {
                    let _ = write!(
                        stream,
                        "q\n{:.3} {:.3} {:.3} rg\n{x:.2} {y:.2} {w:.2} {rh:.2} re\nf\nQ\n",
                        c.r, c.g, c.b
                    );
                }
                if let Some(c) = stroke {
                    let _ = write!(
                        stream,
                        "q\n{:.3} {:.3} {:.3} RG\n{line_width:.2} w\n{x:.2} {y:.2} {w:.2} {rh:.2} re\nS\nQ\n",
                        c.r, c.g, c.b
                    );
                }
            }

            DrawOp::Line {
                from,
                to,
                color,
                line_width,
            } => {
                let _ = write!(
                    stream,
                    "q\n{:.3} {:.3} {:.3} RG\n{line_width:.2} w\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ\n",
                    color.r,
                    color.g,
                    color.b,
                    from.x,
                    h - from.y,
                    to.x,
                    h - to.y
                );
            }

            DrawOp::Image { rect, src } => {
                let (x, y, w, rh) = (rect.x0, h - rect.y1, rect.width(), rect.height());
                let slot = builder.image_objects.iter().position(|(s, _)| s == src);
                match slot {
                    Some(i) if builder.image_objects[i].1.is_some() => {
                        let _ = write!(
                            stream,
                            "q\n{w:.4} 0 0 {rh:.4} {x:.2} {y:.2} cm\n/Im{i} Do\nQ\n"
                        );
                    }
                    _ => {
                        // Grey placeholder for images that could not embed.
                        let _ = write!(
                            stream,
                            "q\n0.9 0.9 0.9 rg\n{x:.2} {y:.2} {w:.2} {rh:.2} re\nf\nQ\n"
                        );
                    }
                }
            }
        }
    }
    stream
}

fn font_index(name: &str, font_objects: &[(String, usize)]) -> usize {
    font_objects
        .iter()
        .position(|(n, _)| n == name)
        .unwrap_or(0)
}

/// Encode text as a WinAnsi PDF string with escapes, octal for the upper
/// range, and '?' for anything unmappable.
fn encode_winansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let b = unicode_to_winansi(ch).unwrap_or(b'?');
        match b {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out
}

/// Map a Unicode codepoint to WinAnsiEncoding (Windows-1252).
fn unicode_to_winansi(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    match cp {
        0x20AC => Some(0x80),
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85),
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95),
        0x2013 => Some(0x96),
        0x2014 => Some(0x97),
        0x02DC => Some(0x98),
        0x2122 => Some(0x99),
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}
