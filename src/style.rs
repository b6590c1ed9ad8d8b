// ABOUTME: Style resolution for the editable deck export
// ABOUTME: Reads simple stylesheet rules and utility classes into text styles via one ordered rule list

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::fmt;

static RULE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("rule block pattern is valid"));
static SIMPLE_SELECTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.?[A-Za-z][\w-]*$").expect("simple selector pattern is valid")
});
static CSS_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment pattern is valid"));
static PALETTE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)colors:\s*\{([^}]+)\}").expect("palette pattern is valid"));
static PALETTE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"]([^'"]+)['"]:\s*['"](#[0-9A-Fa-f]{6})['"]"#)
        .expect("palette entry pattern is valid")
});
static RGB_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})").expect("rgb pattern is valid")
});
static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([0-9A-Fa-f]{6})\b").expect("hex pattern is valid"));
static LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([\d.]+)\s*(rem|em|px|pt)\s*$").expect("length pattern is valid"));

/// Utility font-size classes and their sizes in points
const FONT_SIZE_CLASSES: &[(&str, f32)] = &[
    ("text-5xl", 44.0),
    ("text-4xl", 44.0),
    ("text-3xl", 36.0),
    ("text-2xl", 28.0),
    ("text-xl", 24.0),
    ("text-lg", 20.0),
    ("text-sm", 14.0),
];

const BOLD_CLASSES: &[&str] = &["font-bold", "font-semibold"];

/// Palette used when the deck does not configure its own colors
const FALLBACK_PALETTE: &[(&str, &str)] = &[
    ("soft-white", "#F9F8F6"),
    ("dark-gray", "#333333"),
    ("coral-red", "#FF6B6B"),
    ("coral-dark", "#E05252"),
    ("light-gray", "#EAEAEA"),
];

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("slide-blue", Rgb(0x00, 0x5A, 0x9C)),
    ("slide-text", Rgb(0x21, 0x25, 0x29)),
    ("slide-gray", Rgb(0x6C, 0x75, 0x7D)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `#RRGGBB`, `#RGB`, `rgb(r, g, b)` or one of the deck's named colors
    pub fn parse(value: &str) -> Option<Rgb> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(caps) = RGB_FUNCTION.captures(value) {
            let channel = |i: usize| caps[i].parse::<u16>().ok().map(|v| v.min(255) as u8);
            return Some(Rgb(channel(1)?, channel(2)?, channel(3)?));
        }
        let lower = value.to_ascii_lowercase();
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, rgb)| *rgb)
    }

    /// First `#RRGGBB` found anywhere in `value`, e.g. inside a gradient
    pub fn first_hex_in(value: &str) -> Option<Rgb> {
        HEX_COLOR
            .captures(value)
            .and_then(|caps| parse_hex(&caps[1]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let expand = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgb(expand(&hex[0..2])?, expand(&hex[2..4])?, expand(&hex[4..6])?)),
        3 => {
            let double = |i: usize| expand(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgb(double(0)?, double(1)?, double(2)?))
        }
        _ => None,
    }
}

/// Convert a CSS length to points; `rem`/`em` count as 16pt, `px` as 0.75pt
pub fn length_to_points(value: &str) -> Option<f32> {
    let caps = LENGTH.captures(value)?;
    let amount: f32 = caps[1].parse().ok()?;
    Some(match &caps[2] {
        "rem" | "em" => amount * 16.0,
        "px" => amount * 0.75,
        _ => amount,
    })
}

/// All `rem` amounts in a shorthand value such as `2.5rem 3rem 0 3rem`
pub fn rem_values(value: &str) -> Vec<f32> {
    value
        .split_whitespace()
        .filter_map(|part| part.strip_suffix("rem"))
        .filter_map(|n| n.parse().ok())
        .collect()
}

fn parse_declarations(block: &str) -> HashMap<String, String> {
    block
        .split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value.to_string()))
            }
        })
        .collect()
}

/// Resolved look of one run of text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size_pt: f32,
    pub color: Rgb,
    pub bold: bool,
}

/// Partial style contributed by one source; later fields fill earlier gaps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StyleLayer {
    size_pt: Option<f32>,
    color: Option<Rgb>,
    bold: Option<bool>,
}

impl StyleLayer {
    fn from_declarations(decls: &HashMap<String, String>) -> Self {
        Self {
            size_pt: decls.get("font-size").and_then(|v| length_to_points(v)),
            color: decls.get("color").and_then(|v| Rgb::parse(v)),
            bold: decls.get("font-weight").map(|w| {
                let w = w.trim();
                w == "bold" || w == "bolder" || w.parse::<u32>().map(|n| n >= 600).unwrap_or(false)
            }),
        }
    }

    fn fill_from(&mut self, other: StyleLayer) {
        self.size_pt = self.size_pt.or(other.size_pt);
        self.color = self.color.or(other.color);
        self.bold = self.bold.or(other.bold);
    }
}

/// Where a style value may come from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleSource {
    InlineStyle,
    TagRule,
    UtilityClass,
}

/// Highest priority first: inline style, then the stylesheet rule for the
/// element's tag, then utility-class tokens; the caller's default fills the rest.
pub const STYLE_PRIORITY: [StyleSource; 3] = [
    StyleSource::InlineStyle,
    StyleSource::TagRule,
    StyleSource::UtilityClass,
];

/// The deck's stylesheet rules and color palette
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    /// Keyed by bare tag name (`h2`) or class name without the dot (`slide-footer`)
    rules: HashMap<String, HashMap<String, String>>,
    palette: Vec<(String, Rgb)>,
}

impl StyleSheet {
    /// Collect rules from every `<style>` element and the palette from a `tailwind.config` script
    pub fn from_document(document: &Html) -> Self {
        let mut sheet = StyleSheet::default();

        if let Ok(style_sel) = scraper::Selector::parse("style") {
            for style in document.select(&style_sel) {
                sheet.add_css(&style.text().collect::<String>());
            }
        }

        if let Ok(script_sel) = scraper::Selector::parse("script") {
            for script in document.select(&script_sel) {
                let text: String = script.text().collect();
                if text.contains("tailwind.config") {
                    sheet.palette = parse_palette(&text);
                    break;
                }
            }
        }

        if sheet.palette.is_empty() {
            sheet.palette = FALLBACK_PALETTE
                .iter()
                .filter_map(|(name, hex)| Rgb::parse(hex).map(|rgb| (name.to_string(), rgb)))
                .collect();
        }

        debug!(
            "Stylesheet has {} simple rules and {} palette colors",
            sheet.rules.len(),
            sheet.palette.len()
        );
        sheet
    }

    /// Add rules from CSS text; only simple `.class` and `tag` selectors are kept
    pub fn add_css(&mut self, css: &str) {
        let css = CSS_COMMENT.replace_all(css, "");
        for caps in RULE_BLOCK.captures_iter(&css) {
            let declarations = parse_declarations(&caps[2]);
            if declarations.is_empty() {
                continue;
            }
            for selector in caps[1].split(',').map(str::trim) {
                if !SIMPLE_SELECTOR.is_match(selector) {
                    continue;
                }
                let key = selector.trim_start_matches('.').to_string();
                self.rules
                    .entry(key)
                    .or_default()
                    .extend(declarations.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }

    /// Declaration `property` of the rule for `selector` (tag or class name)
    pub fn property(&self, selector: &str, property: &str) -> Option<&str> {
        self.rules
            .get(selector)
            .and_then(|decls| decls.get(property))
            .map(String::as_str)
    }

    pub fn palette_color(&self, name: &str) -> Option<Rgb> {
        self.palette
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rgb)| *rgb)
    }

    /// Resolve an element's text style by walking `STYLE_PRIORITY`
    pub fn resolve(&self, element: &ElementRef<'_>, default: TextStyle) -> TextStyle {
        let value = element.value();
        let classes: Vec<&str> = value.classes().collect();

        let mut resolved = StyleLayer::default();
        for source in STYLE_PRIORITY {
            let layer = match source {
                StyleSource::InlineStyle => value
                    .attr("style")
                    .map(|s| StyleLayer::from_declarations(&parse_declarations(s)))
                    .unwrap_or_default(),
                StyleSource::TagRule => self
                    .rules
                    .get(value.name())
                    .map(StyleLayer::from_declarations)
                    .unwrap_or_default(),
                StyleSource::UtilityClass => self.utility_layer(&classes),
            };
            resolved.fill_from(layer);
        }

        TextStyle {
            size_pt: resolved.size_pt.unwrap_or(default.size_pt),
            color: resolved.color.unwrap_or(default.color),
            bold: resolved.bold.unwrap_or(default.bold),
        }
    }

    fn utility_layer(&self, classes: &[&str]) -> StyleLayer {
        let size_pt = FONT_SIZE_CLASSES
            .iter()
            .find(|(class, _)| classes.contains(class))
            .map(|(_, size)| *size);

        let bold = BOLD_CLASSES
            .iter()
            .any(|class| classes.contains(class))
            .then_some(true);

        let color = self.palette.iter().find_map(|(name, rgb)| {
            classes
                .iter()
                .any(|c| c.strip_prefix("text-") == Some(name.as_str()))
                .then_some(*rgb)
        });

        StyleLayer {
            size_pt,
            color,
            bold,
        }
    }
}

fn parse_palette(script: &str) -> Vec<(String, Rgb)> {
    let Some(block) = PALETTE_BLOCK.captures(script) else {
        return Vec::new();
    };
    PALETTE_ENTRY
        .captures_iter(&block[1])
        .filter_map(|caps| Rgb::parse(&caps[2]).map(|rgb| (caps[1].to_string(), rgb)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    const DEFAULT: TextStyle = TextStyle {
        size_pt: 18.0,
        color: Rgb(0x34, 0x3A, 0x4F),
        bold: false,
    };

    fn sheet_for(html: &str) -> (Html, StyleSheet) {
        let doc = Html::parse_document(html);
        let sheet = StyleSheet::from_document(&doc);
        (doc, sheet)
    }

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!(Rgb::parse("#005A9C"), Some(Rgb(0, 90, 156)));
        assert_eq!(Rgb::parse("#fff"), Some(Rgb(255, 255, 255)));
        assert_eq!(Rgb::parse("rgb(52, 58, 79)"), Some(Rgb(52, 58, 79)));
        assert_eq!(Rgb::parse("Slide-Gray"), Some(Rgb(0x6C, 0x75, 0x7D)));
        assert_eq!(Rgb::parse("teal"), None);
        assert_eq!(
            Rgb::first_hex_in("linear-gradient(135deg, #1E3A5F 0%, #0F2438 100%)"),
            Some(Rgb(0x1E, 0x3A, 0x5F))
        );
        assert_eq!(Rgb(0, 90, 156).to_string(), "005A9C");
    }

    #[test]
    fn test_non_hex_digits_are_rejected() {
        assert_eq!(Rgb::parse("#é1"), None);
        assert_eq!(Rgb::parse("#éé"), None);
        assert_eq!(Rgb::parse("#12345g"), None);
        assert_eq!(Rgb::first_hex_in("url(#é1)"), None);
    }

    #[test]
    fn test_lengths() {
        assert_eq!(length_to_points("2rem"), Some(32.0));
        assert_eq!(length_to_points("24px"), Some(18.0));
        assert_eq!(length_to_points("11pt"), Some(11.0));
        assert_eq!(length_to_points("large"), None);
        assert_eq!(rem_values("2.5rem 3rem 0 3rem"), vec![2.5, 3.0, 3.0]);
    }

    #[test]
    fn test_rules_and_palette_are_read() {
        let (_, sheet) = sheet_for(
            r##"<head><style>
                /* layout */
                .slide-footer, footer { font-size: 0.875rem; color: #6C757D; }
                .slide .title { color: red; }
                h2 { font-size: 2rem !important; }
            </style>
            <script>tailwind.config = { theme: { extend: { colors: { 'deep-navy': '#1E3A5F', "accent": "#FF6B6B" } } } }</script>
            </head><body></body>"##,
        );

        assert_eq!(sheet.property("slide-footer", "font-size"), Some("0.875rem"));
        assert_eq!(sheet.property("footer", "color"), Some("#6C757D"));
        assert_eq!(sheet.property("h2", "font-size"), Some("2rem"));
        assert_eq!(sheet.property("title", "color"), None);
        assert_eq!(sheet.palette_color("deep-navy"), Some(Rgb(0x1E, 0x3A, 0x5F)));
        assert_eq!(sheet.palette_color("soft-white"), None);
    }

    #[test]
    fn test_fallback_palette_when_unconfigured() {
        let (_, sheet) = sheet_for("<p>x</p>");
        assert_eq!(sheet.palette_color("coral-red"), Some(Rgb(0xFF, 0x6B, 0x6B)));
    }

    #[test]
    fn test_priority_inline_over_tag_over_class() {
        let (doc, sheet) = sheet_for(
            r#"<head><style>p { font-size: 1.25rem; }</style></head><body>
            <p id="a" class="text-sm font-bold text-coral-red" style="color: #000000">a</p>
            <p id="b" class="text-sm text-coral-red">b</p>
            <h3 id="c" class="text-3xl">c</h3>
            <h3 id="d">d</h3>
            </body>"#,
        );

        let a = sheet.resolve(&first(&doc, "#a"), DEFAULT);
        assert_eq!(a.color, Rgb(0, 0, 0), "inline color wins");
        assert_eq!(a.size_pt, 20.0, "tag rule beats utility size");
        assert!(a.bold, "utility class fills bold");

        let b = sheet.resolve(&first(&doc, "#b"), DEFAULT);
        assert_eq!(b.color, Rgb(0xFF, 0x6B, 0x6B));

        let c = sheet.resolve(&first(&doc, "#c"), DEFAULT);
        assert_eq!(c.size_pt, 36.0);

        let d = sheet.resolve(&first(&doc, "#d"), DEFAULT);
        assert_eq!(d, DEFAULT);
    }

    #[test]
    fn test_utility_sizes_match_whole_tokens() {
        let (doc, sheet) = sheet_for(r#"<p class="text-2xl">x</p>"#);
        assert_eq!(sheet.resolve(&first(&doc, "p"), DEFAULT).size_pt, 28.0);
    }
}
