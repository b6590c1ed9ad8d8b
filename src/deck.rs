// ABOUTME: Editable deck model for the slidepress application
// ABOUTME: Maps each slide section to text boxes, rules and a background color

use crate::errors::Result;
use crate::loader::{selector, SourceDocument};
use crate::pptx::PptxConfig;
use crate::style::{length_to_points, rem_values, Rgb, StyleSheet, TextStyle};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

pub const EMU_PER_INCH: f64 = 914_400.0;
pub const EMU_PER_POINT: i64 = 12_700;

const MAX_DEPTH: usize = 10;

const DEFAULT_BACKGROUND: Rgb = Rgb(0xF8, 0xF9, 0xFA);
const TITLE_COLOR: Rgb = Rgb(0x21, 0x25, 0x29);
const ACCENT_BLUE: Rgb = Rgb(0x00, 0x5A, 0x9C);
const BODY_TEXT: Rgb = Rgb(0x34, 0x3A, 0x4F);
const FOOTER_TEXT: Rgb = Rgb(0x6C, 0x75, 0x7D);
const BORDER_GRAY: Rgb = Rgb(0xDE, 0xE2, 0xE6);

static BOLD_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold marker pattern is valid"));

/// Length in English Metric Units
pub fn inches(value: f64) -> i64 {
    (value * EMU_PER_INCH).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Justify,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Text {
        frame: Rect,
        text: String,
        style: TextStyle,
        align: Align,
    },
    /// Horizontal rule from `x1` to `x2` at height `y`
    Rule {
        x1: i64,
        x2: i64,
        y: i64,
        color: Rgb,
        width_pt: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckSlide {
    pub background: Rgb,
    pub shapes: Vec<Shape>,
}

impl DeckSlide {
    pub fn texts(&self) -> Vec<&str> {
        self.shapes
            .iter()
            .filter_map(|shape| match shape {
                Shape::Text { text, .. } => Some(text.as_str()),
                Shape::Rule { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    pub width: i64,
    pub height: i64,
    pub slides: Vec<DeckSlide>,
}

/// Build the editable deck for every slide of `doc`, in slide order
pub fn build_deck(doc: &SourceDocument, config: &PptxConfig) -> Result<Deck> {
    let document = Html::parse_document(&doc.raw);
    let sheet = StyleSheet::from_document(&document);
    let (width, height) = config.slide_size();

    let section_selector = selector("section")?;
    let mut slides = Vec::with_capacity(doc.slide_count());
    for (index, section) in document.select(&section_selector).enumerate() {
        let layout = SlideLayout::new(&sheet, width, height);
        match layout.build(&section) {
            Ok(slide) => {
                debug!("Slide {} mapped to {} shapes", index + 1, slide.shapes.len());
                slides.push(slide);
            }
            Err(e) => {
                warn!("Slide {} could not be mapped, leaving it empty: {}", index + 1, e);
                slides.push(DeckSlide {
                    background: DEFAULT_BACKGROUND,
                    shapes: Vec::new(),
                });
            }
        }
    }

    info!("Mapped {} slides to editable shapes", slides.len());
    Ok(Deck {
        width,
        height,
        slides,
    })
}

struct SlideLayout<'s> {
    sheet: &'s StyleSheet,
    width: i64,
    height: i64,
    shapes: Vec<Shape>,
}

impl<'s> SlideLayout<'s> {
    fn new(sheet: &'s StyleSheet, width: i64, height: i64) -> Self {
        Self {
            sheet,
            width,
            height,
            shapes: Vec::new(),
        }
    }

    fn build(mut self, section: &ElementRef<'_>) -> Result<DeckSlide> {
        let background = self.background(section);

        let mut header_top = inches(2.5 / 16.0);
        let mut margin = inches(3.0 / 16.0);
        if let Some(padding) = self.sheet.property("slide-header", "padding") {
            let rems = rem_values(padding);
            if let Some(top) = rems.first() {
                header_top = inches(f64::from(*top) / 16.0);
            }
            if let Some(side) = rems.get(1) {
                margin = inches(f64::from(*side) / 16.0);
            }
        }

        let left = margin;
        let right = self.width - margin;
        let content_width = right - left;
        let mut y = header_top;

        if let Some(header) = first_descendant(section, "div.slide-header")? {
            if let Some(title) = first_descendant(&header, "h2")? {
                y = self.title(&title, left, y, content_width);
            }
        }

        if let Some(body) = first_descendant(section, "div.slide-body")? {
            let inset = inches(3.0 / 16.0);
            self.body(&body, left + inset, y + inches(1.5 / 16.0), content_width - 2 * inset)?;
        }

        if let Some(footer) = first_descendant(section, "div.slide-footer")? {
            self.footer(&footer, left, right);
        }

        Ok(DeckSlide {
            background,
            shapes: self.shapes,
        })
    }

    /// Inline `background` wins, then the `.slide` rule, then the default
    fn background(&self, section: &ElementRef<'_>) -> Rgb {
        let inline = section.value().attr("style").and_then(|style| {
            style
                .split(';')
                .filter_map(|decl| decl.split_once(':'))
                .filter(|(key, _)| key.trim().starts_with("background"))
                .find_map(|(_, value)| Rgb::first_hex_in(value).or_else(|| Rgb::parse(value)))
        });

        inline
            .or_else(|| {
                self.sheet
                    .property("slide", "background-color")
                    .and_then(Rgb::parse)
            })
            .unwrap_or(DEFAULT_BACKGROUND)
    }

    fn title(&mut self, title: &ElementRef<'_>, left: i64, y: i64, width: i64) -> i64 {
        let text = element_text(title);
        if text.is_empty() {
            return y;
        }

        let style = self.sheet.resolve(
            title,
            TextStyle {
                size_pt: 32.0,
                color: TITLE_COLOR,
                bold: true,
            },
        );
        self.text(Rect { x: left, y, cx: width, cy: inches(1.2) }, text, style, Align::Left);

        self.shapes.push(Shape::Rule {
            x1: left,
            x2: left + inches(2.0),
            y: y + inches(1.0),
            color: ACCENT_BLUE,
            width_pt: 4.0,
        });

        y + inches(1.5)
    }

    fn body(&mut self, body: &ElementRef<'_>, x: i64, y: i64, width: i64) -> Result<()> {
        let grid = body
            .select(&selector("div[class]")?)
            .find(|div| div.value().classes().any(|c| c.contains("grid")));

        let Some(grid) = grid else {
            self.element(body, x, y, width, 0);
            return Ok(());
        };

        let columns: i64 = if grid.value().classes().any(|c| c.contains("grid-cols-2")) {
            2
        } else if grid.value().classes().any(|c| c.contains("grid-cols-3")) {
            3
        } else {
            1
        };
        let column_width = width / columns;
        let gap = inches(0.5);

        let mut column = 0;
        let mut row_y = y;
        for item in child_elements(&grid).filter(|el| el.value().name() == "div") {
            let column_x = x + (column_width + gap) * column;
            self.element(&item, column_x, row_y, column_width - gap, 0);
            column += 1;
            if column >= columns {
                column = 0;
                row_y += inches(3.0);
            }
        }
        Ok(())
    }

    fn footer(&mut self, footer: &ElementRef<'_>, left: i64, right: i64) {
        let text = element_text(footer);
        let footer_y = self.height - inches(0.75);

        let mut default = TextStyle {
            size_pt: 14.0,
            color: FOOTER_TEXT,
            bold: false,
        };
        if let Some(size) = self
            .sheet
            .property("slide-footer", "font-size")
            .and_then(length_to_points)
        {
            default.size_pt = size;
        }
        if let Some(color) = self.sheet.property("slide-footer", "color").and_then(Rgb::parse) {
            default.color = color;
        }
        let style = self.sheet.resolve(footer, default);

        if !text.is_empty() {
            self.text(
                Rect { x: left, y: footer_y, cx: right - left, cy: inches(0.4) },
                text,
                style,
                Align::Justify,
            );
        }
        self.shapes.push(Shape::Rule {
            x1: left,
            x2: right,
            y: footer_y,
            color: BORDER_GRAY,
            width_pt: 1.0,
        });
    }

    /// Lay out the children of `element` top to bottom, returning the next free y
    fn element(&mut self, element: &ElementRef<'_>, x: i64, y: i64, width: i64, depth: usize) -> i64 {
        if depth > MAX_DEPTH {
            return y;
        }

        let mut y = y;
        for child in child_elements(element) {
            match child.value().name() {
                "h1" | "h2" | "h3" => {
                    let text = element_text(&child);
                    if text.is_empty() {
                        continue;
                    }
                    let style = self.sheet.resolve(
                        &child,
                        TextStyle {
                            size_pt: 18.0,
                            color: ACCENT_BLUE,
                            bold: false,
                        },
                    );
                    self.text(Rect { x, y, cx: width, cy: inches(0.8) }, text, style, Align::Left);
                    y += inches(0.9);
                }
                "ul" | "ol" => {
                    let ordered = child.value().name() == "ol";
                    let style = self.sheet.resolve(
                        &child,
                        TextStyle {
                            size_pt: 18.0,
                            color: BODY_TEXT,
                            bold: false,
                        },
                    );
                    let items = child_elements(&child).filter(|el| el.value().name() == "li");
                    for (n, item) in items.enumerate() {
                        let text = element_text(&item);
                        if text.is_empty() {
                            continue;
                        }
                        let bullet = if ordered { format!("{}.", n + 1) } else { "■".to_string() };
                        let indent = inches(0.3);
                        self.text(
                            Rect { x: x + indent, y, cx: width - indent, cy: inches(0.6) },
                            format!("{} {}", bullet, text),
                            style,
                            Align::Left,
                        );
                        y += inches(0.7);
                    }
                }
                "p" => {
                    let text = element_text(&child);
                    if text.is_empty() {
                        continue;
                    }
                    let style = self.sheet.resolve(
                        &child,
                        TextStyle {
                            size_pt: 18.0,
                            color: BODY_TEXT,
                            bold: false,
                        },
                    );
                    self.text(Rect { x, y, cx: width, cy: inches(0.5) }, text, style, Align::Left);
                    y += inches(0.6);
                }
                "div" => {
                    if child.value().classes().any(|c| c.contains("figure-placeholder")) {
                        continue;
                    }
                    y = self.element(&child, x, y, width, depth + 1);
                }
                _ => {}
            }
        }
        y
    }

    fn text(&mut self, frame: Rect, text: String, style: TextStyle, align: Align) {
        self.shapes.push(Shape::Text {
            frame,
            text,
            style,
            align,
        });
    }
}

fn first_descendant<'a>(element: &ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>> {
    Ok(element.select(&selector(css)?).next())
}

fn child_elements<'a>(element: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Visible text with whitespace collapsed and `**bold**` markers removed
fn element_text(element: &ElementRef<'_>) -> String {
    let collapsed = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    BOLD_MARKERS.replace_all(&collapsed, "$1").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = r#"<html><head><style>
        .slide { background-color: #FFFFFF; }
        .slide-header { padding: 2rem 4rem 0 4rem; }
        h2 { color: #112233; }
    </style></head><body>
    <div id="presentation-container"><div id="slides-wrapper">
      <section class="slide">
        <div class="slide-header"><h2>Quarterly **Results**</h2></div>
        <div class="slide-body">
          <h3 class="text-2xl font-bold">Highlights</h3>
          <ul><li>Revenue up</li><li>  Costs
              down </li><li></li></ul>
          <div class="figure-placeholder"><p>skip me</p></div>
          <div><p class="text-sm">Nested note</p></div>
        </div>
        <div class="slide-footer">Confidential</div>
      </section>
      <section class="slide" style="background: linear-gradient(90deg, #1E3A5F, #000000)">
        <div class="slide-body">
          <div class="grid grid-cols-2 gap-4">
            <div><p>Left</p></div>
            <div><p>Right</p></div>
            <div><p>Below</p></div>
          </div>
        </div>
      </section>
    </div></div></body></html>"#;

    fn build() -> Deck {
        let doc = SourceDocument::parse(DECK).unwrap();
        build_deck(&doc, &PptxConfig::default()).unwrap()
    }

    fn text_frame<'a>(slide: &'a DeckSlide, needle: &str) -> (&'a Rect, &'a TextStyle) {
        slide
            .shapes
            .iter()
            .find_map(|shape| match shape {
                Shape::Text { frame, text, style, .. } if text == needle => Some((frame, style)),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no text box {:?}", needle))
    }

    #[test]
    fn test_one_deck_slide_per_section() {
        let deck = build();
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.width, 9_144_000);
        assert_eq!(deck.height, 5_143_500);
    }

    #[test]
    fn test_text_in_document_order() {
        let deck = build();
        assert_eq!(
            deck.slides[0].texts(),
            vec![
                "Quarterly Results",
                "Highlights",
                "■ Revenue up",
                "■ Costs down",
                "Nested note",
                "Confidential"
            ]
        );
    }

    #[test]
    fn test_styles_and_positions() {
        let deck = build();
        let slide = &deck.slides[0];

        let (title_frame, title_style) = text_frame(slide, "Quarterly Results");
        assert_eq!(title_frame.x, inches(0.25));
        assert_eq!(title_frame.y, inches(0.125));
        assert_eq!(title_style.color, Rgb(0x11, 0x22, 0x33));
        assert!(title_style.bold);

        let (_, heading) = text_frame(slide, "Highlights");
        assert_eq!(heading.size_pt, 28.0);
        assert!(heading.bold);

        let (first_item, _) = text_frame(slide, "■ Revenue up");
        let (second_item, _) = text_frame(slide, "■ Costs down");
        assert_eq!(second_item.y - first_item.y, inches(0.7));

        let (footer, footer_style) = text_frame(slide, "Confidential");
        assert_eq!(footer.y, deck.height - inches(0.75));
        assert_eq!(footer_style.size_pt, 14.0);

        assert_eq!(slide.background, Rgb(0xFF, 0xFF, 0xFF));
        let rules = slide
            .shapes
            .iter()
            .filter(|s| matches!(s, Shape::Rule { .. }))
            .count();
        assert_eq!(rules, 2, "title underline and footer border");
    }

    #[test]
    fn test_grid_columns_wrap_rows() {
        let deck = build();
        let slide = &deck.slides[1];

        assert_eq!(slide.background, Rgb(0x1E, 0x3A, 0x5F));

        let (left, _) = text_frame(slide, "Left");
        let (right, _) = text_frame(slide, "Right");
        let (below, _) = text_frame(slide, "Below");
        assert_eq!(left.y, right.y);
        assert!(right.x > left.x);
        assert_eq!(below.x, left.x);
        assert_eq!(below.y - left.y, inches(3.0));
    }
}
