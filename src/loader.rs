// ABOUTME: Document loader for the slidepress application
// ABOUTME: Parses a slide deck and extracts head markup, container structure and slide sections

use crate::errors::{PressError, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Id of the element that wraps the whole deck
pub const CONTAINER_ID: &str = "presentation-container";

/// Id of the element that stacks the slides inside the container
pub const WRAPPER_ID: &str = "slides-wrapper";

/// Class that the deck's stylesheet uses to show the current slide
pub const ACTIVE_CLASS: &str = "active";

/// Wrapper classes used when the deck has no slides wrapper of its own
pub const FALLBACK_WRAPPER_CLASS: &str = "w-full h-full relative";

// Matches `<head>` and `<head ...>` but not `<header>`
static HEAD_REGION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<head(?:\s[^>]*)?>.*?</head\s*>").expect("head region pattern is valid")
});

/// Tag, id, classes and inline style of one structural wrapper element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerDescriptor {
    pub tag: String,
    pub id: String,
    pub class: String,
    pub style: String,
}

impl ContainerDescriptor {
    fn from_element(element: &ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            tag: value.name().to_string(),
            id: value.id().unwrap_or_default().to_string(),
            class: normalize_classes(value.attr("class").unwrap_or_default()),
            style: value.attr("style").unwrap_or_default().to_string(),
        }
    }

    fn missing(tag: &str, id: &str, class: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: id.to_string(),
            class: class.to_string(),
            style: String::new(),
        }
    }
}

/// One `<section>` of the deck
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideNode {
    /// Zero-based position in document order
    pub index: usize,
    pub classes: Vec<String>,
    /// Attributes other than `class`, in source order
    pub attributes: Vec<(String, String)>,
    pub inner_html: String,
}

impl SlideNode {
    /// One-based slide number used in file names and messages
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Serialize the section with the active marker class guaranteed present
    pub fn to_active_markup(&self) -> String {
        let mut classes = self.classes.clone();
        if !classes.iter().any(|c| c == ACTIVE_CLASS) {
            classes.push(ACTIVE_CLASS.to_string());
        }

        let mut markup = String::from("<section");
        markup.push_str(&format!(
            " class=\"{}\"",
            html_escape::encode_double_quoted_attribute(&classes.join(" "))
        ));
        for (name, value) in &self.attributes {
            markup.push_str(&format!(
                " {}=\"{}\"",
                name,
                html_escape::encode_double_quoted_attribute(value)
            ));
        }
        markup.push('>');
        markup.push_str(&self.inner_html);
        markup.push_str("</section>");
        markup
    }
}

/// A parsed slide deck. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub raw: String,
    /// Head markup exactly as it appears in the source, `<head>` through `</head>`
    pub head: String,
    pub body: ContainerDescriptor,
    pub container: ContainerDescriptor,
    pub wrapper: ContainerDescriptor,
    pub slides: Vec<SlideNode>,
}

impl SourceDocument {
    /// Parse a deck, failing with `NoSlidesFound` when it has no sections
    pub fn parse(raw: &str) -> Result<Self> {
        let document = Html::parse_document(raw);

        let head = extract_head(raw, &document)?;

        let body = first_match(&document, "body")?
            .map(|el| ContainerDescriptor::from_element(&el))
            .unwrap_or_else(|| ContainerDescriptor::missing("body", "", ""));

        let container = match first_match(&document, &format!("div#{}", CONTAINER_ID))? {
            Some(el) => ContainerDescriptor::from_element(&el),
            None => {
                warn!("No #{} element found, using an empty container", CONTAINER_ID);
                ContainerDescriptor::missing("div", CONTAINER_ID, "")
            }
        };

        let wrapper = match first_match(&document, &format!("div#{}", WRAPPER_ID))? {
            Some(el) => {
                let mut descriptor = ContainerDescriptor::from_element(&el);
                if descriptor.class.is_empty() {
                    descriptor.class = FALLBACK_WRAPPER_CLASS.to_string();
                }
                descriptor
            }
            None => {
                warn!("No #{} element found, using default wrapper classes", WRAPPER_ID);
                ContainerDescriptor::missing("div", WRAPPER_ID, FALLBACK_WRAPPER_CLASS)
            }
        };

        let section_selector = selector("section")?;
        let slides: Vec<SlideNode> = document
            .select(&section_selector)
            .enumerate()
            .map(|(index, el)| slide_from_element(index, &el))
            .collect();

        if slides.is_empty() {
            return Err(PressError::NoSlidesFound);
        }

        info!("Loaded deck with {} slides", slides.len());

        Ok(Self {
            raw: raw.to_string(),
            head,
            body,
            container,
            wrapper,
            slides,
        })
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }
}

/// Compile a CSS selector, reporting failures as HTML errors
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| PressError::HtmlError(format!("Invalid selector {:?}: {:?}", css, e)))
}

fn first_match<'a>(document: &'a Html, css: &str) -> Result<Option<ElementRef<'a>>> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next())
}

/// Prefer the raw head region to keep the author's formatting, fall back to the parsed tree
fn extract_head(raw: &str, document: &Html) -> Result<String> {
    if let Some(found) = HEAD_REGION.find(raw) {
        return Ok(found.as_str().to_string());
    }

    debug!("Head region not found in raw text, using parsed head element");
    Ok(first_match(document, "head")?
        .map(|el| el.html())
        .unwrap_or_default())
}

fn slide_from_element(index: usize, element: &ElementRef<'_>) -> SlideNode {
    let value = element.value();
    let classes = value.classes().map(str::to_string).collect();
    let attributes = value
        .attrs()
        .filter(|(name, _)| *name != "class")
        .map(|(name, val)| (name.to_string(), val.to_string()))
        .collect();

    SlideNode {
        index,
        classes,
        attributes,
        inner_html: element.inner_html(),
    }
}

fn normalize_classes(class_attr: &str) -> String {
    class_attr.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = r#"<!DOCTYPE html>
<html lang="ko">
<HEAD>
  <meta charset="UTF-8">
  <!-- deck styles -->
  <style>.slide { position: absolute; opacity: 0; } .slide.active { opacity: 1; }</style>
</HEAD>
<body class="bg-gray-100  font-sans">
  <header><h1>not a head</h1></header>
  <div id="presentation-container" class="mx-auto shadow">
    <div id="slides-wrapper" class="w-full h-full" style="aspect-ratio: 16 / 9;">
      <section class="slide active" data-index="1"><h2>One</h2></section>
      <section class="slide" data-index="2"><h2>Two</h2></section>
      <section class="slide"><p>Three &amp; more</p></section>
    </div>
  </div>
</body>
</html>"#;

    #[test]
    fn test_head_is_taken_verbatim_from_raw_text() {
        let doc = SourceDocument::parse(DECK).unwrap();
        assert!(doc.head.starts_with("<HEAD>"));
        assert!(doc.head.ends_with("</HEAD>"));
        assert!(doc.head.contains("<!-- deck styles -->"));
        assert!(!doc.head.contains("not a head"));
    }

    #[test]
    fn test_containers_are_described() {
        let doc = SourceDocument::parse(DECK).unwrap();
        assert_eq!(doc.body.class, "bg-gray-100 font-sans");
        assert_eq!(doc.container.id, CONTAINER_ID);
        assert_eq!(doc.container.class, "mx-auto shadow");
        assert_eq!(doc.wrapper.class, "w-full h-full");
        assert_eq!(doc.wrapper.style, "aspect-ratio: 16 / 9;");
    }

    #[test]
    fn test_sections_enumerated_in_document_order() {
        let doc = SourceDocument::parse(DECK).unwrap();
        assert_eq!(doc.slide_count(), 3);
        assert!(doc.slides[0].inner_html.contains("One"));
        assert!(doc.slides[1].inner_html.contains("Two"));
        assert!(doc.slides[2].inner_html.contains("Three"));
        assert_eq!(doc.slides[2].number(), 3);
    }

    #[test]
    fn test_no_sections_is_fatal() {
        let result = SourceDocument::parse("<html><head></head><body><div>empty</div></body></html>");
        assert!(matches!(result, Err(PressError::NoSlidesFound)));
    }

    #[test]
    fn test_missing_containers_degrade_to_defaults() {
        let doc = SourceDocument::parse("<section>only</section>").unwrap();
        assert_eq!(doc.container.class, "");
        assert_eq!(doc.container.id, CONTAINER_ID);
        assert_eq!(doc.wrapper.class, FALLBACK_WRAPPER_CLASS);
        assert_eq!(doc.wrapper.style, "");
        assert_eq!(doc.body.class, "");
        // no head in the raw text, so the parsed (synthesized) head is used
        assert_eq!(doc.head, "<head></head>");
    }

    #[test]
    fn test_active_markup_adds_marker_once() {
        let doc = SourceDocument::parse(DECK).unwrap();

        let first = doc.slides[0].to_active_markup();
        assert_eq!(first.matches("active").count(), 1);

        let second = doc.slides[1].to_active_markup();
        assert!(second.starts_with(r#"<section class="slide active" data-index="2">"#));
        assert!(second.ends_with("</section>"));

        let third = doc.slides[2].to_active_markup();
        assert!(third.contains("Three &amp; more"));
    }
}
