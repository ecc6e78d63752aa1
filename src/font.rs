//! # Font Management
//!
//! Text measurement and font resolution for layout and PDF serialization.
//!
//! The built-in fonts are the standard PDF Type1 families (Helvetica, Times,
//! Courier) with their published AFM widths, so no embedding is needed for
//! them. Custom TrueType fonts can be registered from raw bytes or a base64
//! data URI; their metrics come from `ttf-parser` and the font program is
//! embedded at serialization time.

use std::collections::HashMap;

use base64::Engine as _;
use log::warn;

use crate::error::{ReportError, Result};

/// Identifies a face within a family.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub weight: u32,
    pub italic: bool,
}

/// Resolved font data: a built-in standard font or a registered TrueType.
#[derive(Debug, Clone)]
pub enum FontData {
    Standard(StandardFont),
    Custom {
        data: Vec<u8>,
        metrics: CustomFontMetrics,
    },
}

/// Parsed metrics for a registered TrueType font.
#[derive(Debug, Clone)]
pub struct CustomFontMetrics {
    pub units_per_em: u16,
    pub advance_widths: HashMap<char, u16>,
    pub glyph_ids: HashMap<char, u16>,
    pub default_advance: u16,
    pub ascender: i16,
    pub descender: i16,
}

impl CustomFontMetrics {
    /// Parse metrics from font data, sampling the Basic Multilingual Plane.
    pub fn from_font_data(data: &[u8]) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let units_per_em = face.units_per_em();
        let ascender = face.ascender();
        let descender = face.descender();

        let mut advance_widths = HashMap::new();
        let mut glyph_ids = HashMap::new();
        let mut default_advance = 0u16;

        for code in 32u32..=0xFFFF {
            if let Some(ch) = char::from_u32(code) {
                if let Some(glyph_id) = face.glyph_index(ch) {
                    let advance = face.glyph_hor_advance(glyph_id).unwrap_or(0);
                    advance_widths.insert(ch, advance);
                    glyph_ids.insert(ch, glyph_id.0);
                    if ch == ' ' {
                        default_advance = advance;
                    }
                }
            }
        }
        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        Some(CustomFontMetrics {
            units_per_em,
            advance_widths,
            glyph_ids,
            default_advance,
            ascender,
            descender,
        })
    }

    /// Advance width of one character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let w = self
            .advance_widths
            .get(&ch)
            .copied()
            .unwrap_or(self.default_advance);
        (w as f64 / self.units_per_em as f64) * font_size
    }

    /// Ascender height in points.
    pub fn ascent(&self, font_size: f64) -> f64 {
        (self.ascender as f64 / self.units_per_em as f64) * font_size
    }
}

/// The built-in standard PDF font faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

// AFM advance widths (per 1000 units of em) for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333,
    584, 584, 584, 611, 975, 722, 722, 722, 722, 667, 611, 778, 722, 278,
    556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556,
    333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333,
    250, 278, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278,
    564, 564, 564, 444, 921, 722, 667, 667, 722, 611, 556, 722, 722, 333,
    389, 722, 611, 889, 722, 722, 556, 722, 667, 556, 611, 722, 722, 944,
    722, 722, 611, 333, 278, 333, 469, 500, 333, 444, 500, 444, 500, 444,
    333, 500, 500, 278, 278, 500, 278, 778, 500, 500, 500, 500, 333, 389,
    278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333,
    250, 278, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333,
    570, 570, 570, 500, 930, 722, 667, 722, 722, 667, 611, 778, 778, 389,
    500, 778, 667, 944, 722, 778, 611, 778, 722, 556, 667, 722, 722, 1000,
    722, 722, 667, 333, 278, 333, 581, 500, 333, 500, 556, 444, 556, 444,
    333, 500, 556, 278, 333, 556, 278, 833, 556, 500, 556, 556, 444, 389,
    333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

impl StandardFont {
    /// The PostScript name used as the PDF BaseFont.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
            Self::HelveticaOblique => "Helvetica-Oblique",
            Self::HelveticaBoldOblique => "Helvetica-BoldOblique",
            Self::TimesRoman => "Times-Roman",
            Self::TimesBold => "Times-Bold",
            Self::TimesItalic => "Times-Italic",
            Self::TimesBoldItalic => "Times-BoldItalic",
            Self::Courier => "Courier",
            Self::CourierBold => "Courier-Bold",
            Self::CourierOblique => "Courier-Oblique",
            Self::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    fn widths(&self) -> Option<&'static [u16; 95]> {
        match self {
            Self::Helvetica | Self::HelveticaOblique => Some(&HELVETICA_WIDTHS),
            Self::HelveticaBold | Self::HelveticaBoldOblique => Some(&HELVETICA_BOLD_WIDTHS),
            Self::TimesRoman | Self::TimesItalic => Some(&TIMES_ROMAN_WIDTHS),
            Self::TimesBold | Self::TimesBoldItalic => Some(&TIMES_BOLD_WIDTHS),
            // Courier is monospaced at 600.
            _ => None,
        }
    }

    /// Advance width of one character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let units = match self.widths() {
            Some(table) => {
                let code = ch as u32;
                if (32..=126).contains(&code) {
                    table[(code - 32) as usize]
                } else {
                    // Non-ASCII falls back to an average width.
                    556
                }
            }
            None => 600,
        };
        units as f64 / 1000.0 * font_size
    }

    /// Ascender height in points (AFM values).
    pub fn ascent(&self, font_size: f64) -> f64 {
        let units = match self {
            Self::Helvetica
            | Self::HelveticaBold
            | Self::HelveticaOblique
            | Self::HelveticaBoldOblique => 718,
            Self::TimesRoman | Self::TimesBold | Self::TimesItalic | Self::TimesBoldItalic => 683,
            Self::Courier | Self::CourierBold | Self::CourierOblique | Self::CourierBoldOblique => {
                629
            }
        };
        units as f64 / 1000.0 * font_size
    }
}

/// Shared font context used by layout, header replay, and serialization.
#[derive(Clone)]
pub struct FontContext {
    fonts: HashMap<FontKey, FontData>,
}

impl Default for FontContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FontContext {
    pub fn new() -> Self {
        let mut fonts = HashMap::new();
        let standard: &[(&str, u32, bool, StandardFont)] = &[
            ("Helvetica", 400, false, StandardFont::Helvetica),
            ("Helvetica", 700, false, StandardFont::HelveticaBold),
            ("Helvetica", 400, true, StandardFont::HelveticaOblique),
            ("Helvetica", 700, true, StandardFont::HelveticaBoldOblique),
            ("Times", 400, false, StandardFont::TimesRoman),
            ("Times", 700, false, StandardFont::TimesBold),
            ("Times", 400, true, StandardFont::TimesItalic),
            ("Times", 700, true, StandardFont::TimesBoldItalic),
            ("Courier", 400, false, StandardFont::Courier),
            ("Courier", 700, false, StandardFont::CourierBold),
            ("Courier", 400, true, StandardFont::CourierOblique),
            ("Courier", 700, true, StandardFont::CourierBoldOblique),
        ];
        for &(family, weight, italic, font) in standard {
            fonts.insert(
                FontKey {
                    family: family.to_string(),
                    weight,
                    italic,
                },
                FontData::Standard(font),
            );
        }
        Self { fonts }
    }

    /// Register a custom font family from raw TTF/OTF bytes.
    pub fn register(&mut self, family: &str, weight: u32, italic: bool, data: Vec<u8>) -> Result<()> {
        let metrics = CustomFontMetrics::from_font_data(&data)
            .ok_or_else(|| ReportError::Font(format!("cannot parse font data for '{family}'")))?;
        self.fonts.insert(
            FontKey {
                family: family.to_string(),
                weight,
                italic,
            },
            FontData::Custom { data, metrics },
        );
        Ok(())
    }

    /// Register a custom font from a base64 string or a
    /// `data:font/ttf;base64,` URI.
    pub fn register_base64(&mut self, family: &str, weight: u32, italic: bool, src: &str) -> Result<()> {
        let b64 = match src.split_once("base64,") {
            Some((_, rest)) => rest,
            None => src,
        };
        let data = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| ReportError::Font(format!("invalid base64 font data: {e}")))?;
        self.register(family, weight, italic, data)
    }

    /// Map an additional family name onto an already-registered one, so
    /// stylesheets can use their own names for built-in or custom faces.
    /// Unknown targets are skipped with a warning instead of failing.
    pub fn alias(&mut self, family: &str, target: &str) {
        let entries: Vec<(FontKey, FontData)> = self
            .fonts
            .iter()
            .filter(|(key, _)| key.family == target)
            .map(|(key, data)| {
                (
                    FontKey {
                        family: family.to_string(),
                        weight: key.weight,
                        italic: key.italic,
                    },
                    data.clone(),
                )
            })
            .collect();
        if entries.is_empty() {
            warn!("font family '{target}' not registered, alias '{family}' ignored");
            return;
        }
        for (key, data) in entries {
            self.fonts.insert(key, data);
        }
    }

    /// Look up a face, snapping the weight and falling back to Helvetica
    /// when the family is unknown. The fallback is logged once per call
    /// site rather than failing the report.
    pub fn resolve(&self, family: &str, weight: u32, italic: bool) -> &FontData {
        let snapped = if weight >= 600 { 700 } else { 400 };
        for key in [
            FontKey {
                family: family.to_string(),
                weight,
                italic,
            },
            FontKey {
                family: family.to_string(),
                weight: snapped,
                italic,
            },
        ] {
            if let Some(font) = self.fonts.get(&key) {
                return font;
            }
        }
        if !family.is_empty() && family != "Helvetica" {
            warn!("font family '{family}' not registered, falling back to Helvetica");
        }
        self.fonts
            .get(&FontKey {
                family: "Helvetica".to_string(),
                weight: snapped,
                italic,
            })
            .or_else(|| {
                self.fonts.get(&FontKey {
                    family: "Helvetica".to_string(),
                    weight: 400,
                    italic: false,
                })
            })
            .expect("Helvetica must be registered")
    }

    /// The document-level resource name for a face: the PostScript name for
    /// standard fonts, `family[-Bold][-Italic]` for custom ones.
    pub fn resolved_name(&self, family: &str, weight: u32, italic: bool) -> String {
        match self.resolve(family, weight, italic) {
            FontData::Standard(f) => f.pdf_name().to_string(),
            FontData::Custom { .. } => {
                let mut name = family.to_string();
                if weight >= 600 {
                    name.push_str("-Bold");
                }
                if italic {
                    name.push_str("-Italic");
                }
                name
            }
        }
    }

    /// Reverse lookup from a resource name produced by
    /// [`resolved_name`](Self::resolved_name).
    pub fn by_name(&self, name: &str) -> Option<&FontData> {
        for (key, data) in &self.fonts {
            let key_name = self.resolved_name(&key.family, key.weight, key.italic);
            if key_name == name {
                return Some(data);
            }
        }
        None
    }

    /// Width of `text` in points for the given face and size.
    pub fn measure(&self, text: &str, family: &str, weight: u32, italic: bool, size: f64) -> f64 {
        match self.resolve(family, weight, italic) {
            FontData::Standard(f) => text.chars().map(|ch| f.char_width(ch, size)).sum(),
            FontData::Custom { metrics, .. } => {
                text.chars().map(|ch| metrics.char_width(ch, size)).sum()
            }
        }
    }

    /// Baseline ascent in points for the given face and size.
    pub fn ascent(&self, family: &str, weight: u32, italic: bool, size: f64) -> f64 {
        match self.resolve(family, weight, italic) {
            FontData::Standard(f) => f.ascent(size),
            FontData::Custom { metrics, .. } => metrics.ascent(size),
        }
    }

    /// Width of `text` for a face already resolved to a resource name, as
    /// used by the post-pass when re-measuring captured header spans.
    pub fn measure_by_name(&self, text: &str, name: &str, size: f64) -> f64 {
        match self.by_name(name) {
            Some(FontData::Standard(f)) => text.chars().map(|ch| f.char_width(ch, size)).sum(),
            Some(FontData::Custom { metrics, .. }) => {
                text.chars().map(|ch| metrics.char_width(ch, size)).sum()
            }
            None => text.chars().count() as f64 * size * 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_space_width() {
        let ctx = FontContext::new();
        let w = ctx.measure(" ", "Helvetica", 400, false, 12.0);
        assert!((w - 3.336).abs() < 0.001);
    }

    #[test]
    fn test_bold_wider() {
        let ctx = FontContext::new();
        let regular = ctx.measure("i", "Helvetica", 400, false, 12.0);
        let bold = ctx.measure("i", "Helvetica", 700, false, 12.0);
        assert!(bold > regular);
    }

    #[test]
    fn test_unknown_family_falls_back() {
        let ctx = FontContext::new();
        let a = ctx.measure("A", "Helvetica", 400, false, 12.0);
        let b = ctx.measure("A", "NoSuchFamily", 400, false, 12.0);
        assert!((a - b).abs() < 1e-9);
        assert_eq!(ctx.resolved_name("NoSuchFamily", 400, false), "Helvetica");
    }

    #[test]
    fn test_weight_snapping() {
        let ctx = FontContext::new();
        assert_eq!(ctx.resolved_name("Helvetica", 650, false), "Helvetica-Bold");
        assert_eq!(ctx.resolved_name("Times", 400, true), "Times-Italic");
    }

    #[test]
    fn test_courier_monospace() {
        let ctx = FontContext::new();
        let i = ctx.measure("i", "Courier", 400, false, 10.0);
        let w = ctx.measure("W", "Courier", 400, false, 10.0);
        assert!((i - w).abs() < 1e-9);
        assert!((i - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_by_name_round_trip() {
        let ctx = FontContext::new();
        assert!(ctx.by_name("Helvetica-Bold").is_some());
        assert!(ctx.by_name("Nope").is_none());
    }

    #[test]
    fn test_alias_maps_whole_family() {
        let mut ctx = FontContext::new();
        ctx.alias("sans-serif", "Helvetica");
        assert_eq!(ctx.resolved_name("sans-serif", 700, false), "Helvetica-Bold");
        // Unknown target leaves the context unchanged.
        ctx.alias("broken", "NoSuchFamily");
        assert_eq!(ctx.resolved_name("broken", 400, false), "Helvetica");
    }

    #[test]
    fn test_ascent_positive() {
        let ctx = FontContext::new();
        let a = ctx.ascent("Times", 400, false, 10.0);
        assert!((a - 6.83).abs() < 0.001);
    }
}
