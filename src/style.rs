//! # Style System
//!
//! A deliberately small CSS-like style model: the typography and color
//! properties that report markup actually uses. Stylesheets are a flat rule
//! list with tag and `#id` selectors; later rules win, and a block's own
//! stylesheet is evaluated after the report-wide stylesheet it inherits.
//!
//! We don't try to implement CSS. We implement the subset that matters for
//! flowing report content, and we implement it predictably.

use serde::{Deserialize, Serialize};

/// An RGBA color with components in 0.0 - 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rgb` / `#rrggbb` hex notation, falling back to black on
    /// malformed input.
    pub fn hex(hex: &str) -> Self {
        let hex = hex.trim_start_matches('#');
        let (r, g, b) = match hex.len() {
            3 => {
                let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).unwrap_or(0);
                let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).unwrap_or(0);
                let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).unwrap_or(0);
                (r, g, b)
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
                let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
                let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
                (r, g, b)
            }
            _ => (0, 0, 0),
        };
        Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            a: 1.0,
        }
    }

    /// Parse hex, `rgb(r, g, b)` with 0-255 components, or a few common
    /// named colors. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Color> {
        let s = s.trim();
        if s.starts_with('#') {
            return Some(Color::hex(s));
        }
        if let Some(inner) = s.strip_prefix("rgb(").and_then(|v| v.strip_suffix(')')) {
            let parts: Vec<&str> = inner.split(',').collect();
            if parts.len() == 3 {
                let r = parts[0].trim().parse::<f64>().ok()? / 255.0;
                let g = parts[1].trim().parse::<f64>().ok()? / 255.0;
                let b = parts[2].trim().parse::<f64>().ok()? / 255.0;
                return Some(Color::rgb(r, g, b));
            }
            return None;
        }
        match s.to_ascii_lowercase().as_str() {
            "black" => Some(Color::BLACK),
            "white" => Some(Color::WHITE),
            "red" => Some(Color::rgb(1.0, 0.0, 0.0)),
            "green" => Some(Color::rgb(0.0, 0.5, 0.0)),
            "blue" => Some(Color::rgb(0.0, 0.0, 1.0)),
            "gray" | "grey" => Some(Color::rgb(0.5, 0.5, 0.5)),
            "yellow" => Some(Color::rgb(1.0, 1.0, 0.0)),
            _ => None,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Horizontal text alignment within a flow line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Style properties attachable to a markup element. All optional; `None`
/// means "inherit or default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    /// Font family name, resolved through the report's font context.
    pub font_family: Option<String>,
    /// Font size in points.
    pub font_size: Option<f64>,
    /// Font weight (400 regular, 700 bold).
    pub font_weight: Option<u32>,
    /// Italic variant.
    pub italic: Option<bool>,
    /// Line height as a multiplier of font size.
    pub line_height: Option<f64>,
    /// Text color.
    pub color: Option<Color>,
    /// Background color (cells, rows).
    pub background_color: Option<Color>,
    /// Text alignment.
    pub text_align: Option<TextAlign>,
}

impl Style {
    /// Layer `over` on top of `self`: any property set in `over` wins.
    pub fn merged(&self, over: &Style) -> Style {
        Style {
            font_family: over.font_family.clone().or_else(|| self.font_family.clone()),
            font_size: over.font_size.or(self.font_size),
            font_weight: over.font_weight.or(self.font_weight),
            italic: over.italic.or(self.italic),
            line_height: over.line_height.or(self.line_height),
            color: over.color.or(self.color),
            background_color: over.background_color.or(self.background_color),
            text_align: over.text_align.or(self.text_align),
        }
    }

    /// Parse a `property: value; ...` declaration list (the contents of an
    /// inline `style` attribute or a rule body). Unknown properties are
    /// ignored, not errors.
    pub fn from_declarations(decl: &str) -> Style {
        let mut style = Style::default();
        for part in decl.split(';') {
            let Some((prop, value)) = part.split_once(':') else {
                continue;
            };
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            match prop.as_str() {
                "font-family" => {
                    style.font_family = Some(value.trim_matches(['"', '\'']).to_string())
                }
                "font-size" => style.font_size = parse_pt(value),
                "font-weight" => {
                    style.font_weight = match value {
                        "bold" => Some(700),
                        "normal" => Some(400),
                        v => v.parse().ok(),
                    }
                }
                "font-style" => style.italic = Some(value == "italic" || value == "oblique"),
                "line-height" => style.line_height = value.parse().ok(),
                "color" => style.color = Color::parse(value),
                "background-color" | "background" => style.background_color = Color::parse(value),
                "text-align" => {
                    style.text_align = match value {
                        "left" => Some(TextAlign::Left),
                        "center" => Some(TextAlign::Center),
                        "right" => Some(TextAlign::Right),
                        _ => None,
                    }
                }
                _ => {}
            }
        }
        style
    }
}

/// Parse a length like `12pt`, `12px`, or a bare number, in points.
fn parse_pt(value: &str) -> Option<f64> {
    let v = value
        .trim()
        .trim_end_matches("pt")
        .trim_end_matches("px")
        .trim();
    v.parse().ok()
}

/// A selector in the supported subset: a tag name or `#id`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Tag(String),
    Id(String),
}

/// One stylesheet rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub selector: Selector,
    pub style: Style,
}

/// A parsed stylesheet: a flat rule list applied in source order.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Lenient parse of `selector { declarations }` rules. Comma-separated
    /// selector lists expand into one rule each; anything unparseable is
    /// skipped.
    pub fn parse(css: &str) -> Stylesheet {
        let mut rules = Vec::new();
        let mut rest = css;
        while let Some(open) = rest.find('{') {
            let selectors = rest[..open].trim().to_string();
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            let body = &rest[open + 1..open + close];
            let style = Style::from_declarations(body);
            for sel in selectors.split(',') {
                let sel = sel.trim();
                if sel.is_empty() {
                    continue;
                }
                let selector = match sel.strip_prefix('#') {
                    Some(id) => Selector::Id(id.to_string()),
                    None => Selector::Tag(sel.to_ascii_lowercase()),
                };
                rules.push(Rule {
                    selector,
                    style: style.clone(),
                });
            }
            rest = &rest[open + close + 1..];
        }
        Stylesheet { rules }
    }

    /// The merged style of every rule matching `tag` / `id`, in rule order.
    pub fn style_for(&self, tag: &str, id: Option<&str>) -> Style {
        let mut style = Style::default();
        for rule in &self.rules {
            let hit = match &rule.selector {
                Selector::Tag(t) => t == tag,
                Selector::Id(i) => id == Some(i.as_str()),
            };
            if hit {
                style = style.merged(&rule.style);
            }
        }
        style
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
