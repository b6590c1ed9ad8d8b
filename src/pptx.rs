// ABOUTME: PPTX generation module for the slidepress application
// ABOUTME: Writes an editable deck of text boxes and rules as a PowerPoint package

use crate::deck::{self, Align, Deck, DeckSlide, Rect, Shape, EMU_PER_POINT};
use crate::errors::{PressError, Result};
use crate::loader::SourceDocument;
use crate::style::Rgb;
use crate::utils;
use log::{info, warn};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;
use zip::{write::FileOptions, ZipWriter};

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Configuration for PPTX generation
#[derive(Debug, Clone)]
pub struct PptxConfig {
    pub title: String,
    pub aspect_ratio: String, // "16:9" or "4:3"
}

impl Default for PptxConfig {
    fn default() -> Self {
        Self {
            title: "Presentation".to_string(),
            aspect_ratio: "16:9".to_string(),
        }
    }
}

impl PptxConfig {
    /// Slide width and height in EMU
    pub fn slide_size(&self) -> (i64, i64) {
        match self.aspect_ratio.as_str() {
            "16:9" => (9_144_000, 5_143_500),
            "4:3" => (9_144_000, 6_858_000),
            other => {
                warn!("Unsupported aspect ratio: {}. Using 16:9 instead.", other);
                (9_144_000, 5_143_500)
            }
        }
    }
}

/// Convert an HTML deck on disk into an editable PPTX, returning the slide count
pub fn export_pptx_file(input: &Path, output: &Path, config: &PptxConfig) -> Result<usize> {
    utils::validate_file_exists(input)?;
    let html = fs::read_to_string(input).map_err(|e| {
        PressError::ValidationError(format!("Failed to read {:?} as UTF-8 text: {}", input, e))
    })?;

    let doc = SourceDocument::parse(&html)?;
    let deck = deck::build_deck(&doc, config)?;
    write_pptx(&deck, output, config)?;
    Ok(deck.slides.len())
}

/// Write `deck` as a PowerPoint package at `output_file`
pub fn write_pptx(deck: &Deck, output_file: &Path, config: &PptxConfig) -> Result<()> {
    if deck.slides.is_empty() {
        return Err(PressError::NoSlidesFound);
    }
    utils::ensure_parent_directory_exists(output_file)?;

    info!("Writing {} slides to {:?}", deck.slides.len(), output_file);
    let file = fs::File::create(output_file)?;
    let mut zip = ZipWriter::new(file);
    let count = deck.slides.len();

    add_part(&mut zip, "[Content_Types].xml", &content_types(count))?;
    add_part(&mut zip, "_rels/.rels", &package_rels())?;
    add_part(&mut zip, "docProps/app.xml", &app_properties(count))?;
    add_part(&mut zip, "docProps/core.xml", &core_properties(&config.title))?;
    add_part(&mut zip, "ppt/presentation.xml", &presentation(count, deck.width, deck.height))?;
    add_part(&mut zip, "ppt/_rels/presentation.xml.rels", &presentation_rels(count))?;
    add_part(&mut zip, "ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER)?;
    add_part(
        &mut zip,
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        &relationships(&[
            ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
            ("rId2", "theme", "../theme/theme1.xml"),
        ]),
    )?;
    add_part(&mut zip, "ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT)?;
    add_part(
        &mut zip,
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        &relationships(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]),
    )?;
    add_part(&mut zip, "ppt/theme/theme1.xml", THEME)?;

    for (i, slide) in deck.slides.iter().enumerate() {
        let number = i + 1;
        add_part(&mut zip, &format!("ppt/slides/slide{}.xml", number), &slide_xml(slide))?;
        add_part(
            &mut zip,
            &format!("ppt/slides/_rels/slide{}.xml.rels", number),
            &relationships(&[("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml")]),
        )?;
    }

    zip.finish()?;
    info!("PPTX file created at {:?}", output_file);
    Ok(())
}

fn add_part<W: Write + std::io::Seek>(zip: &mut ZipWriter<W>, name: &str, content: &str) -> Result<()> {
    zip.start_file(name, FileOptions::default())?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

fn content_types(slide_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>
<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>
<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
"#,
    );
    for n in 1..=slide_count {
        let _ = writeln!(
            xml,
            r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
            n
        );
    }
    xml.push_str("</Types>");
    xml
}

fn package_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{rels}">
<Relationship Id="rId1" Type="{rel}/officeDocument" Target="ppt/presentation.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="{rel}/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#,
        rels = NS_RELS,
        rel = REL_TYPE
    )
}

fn relationships(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\">\n",
        NS_RELS
    );
    for (id, kind, target) in entries {
        let _ = writeln!(
            xml,
            r#"<Relationship Id="{}" Type="{}/{}" Target="{}"/>"#,
            id, REL_TYPE, kind, target
        );
    }
    xml.push_str("</Relationships>");
    xml
}

fn app_properties(slide_count: usize) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
<Application>slidepress</Application>
<Slides>{}</Slides>
</Properties>"#,
        slide_count
    )
}

fn core_properties(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:title>{}</dc:title>
<dc:creator>slidepress</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>
<cp:revision>1</cp:revision>
</cp:coreProperties>"#,
        escape(title),
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

fn presentation(slide_count: usize, cx: i64, cy: i64) -> String {
    let slide_ids = (0..slide_count)
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 2))
        .collect::<Vec<_>>()
        .join("");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}">
<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>
<p:sldIdLst>{slide_ids}</p:sldIdLst>
<p:sldSz cx="{cx}" cy="{cy}"/>
<p:notesSz cx="6858000" cy="9144000"/>
</p:presentation>"#,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        slide_ids = slide_ids,
        cx = cx,
        cy = cy
    )
}

/// `rId1` is the master, `rId{n+1}` slide n, and the theme comes last
fn presentation_rels(slide_count: usize) -> String {
    let slides: Vec<(String, String)> = (1..=slide_count)
        .map(|n| (format!("rId{}", n + 1), format!("slides/slide{}.xml", n)))
        .collect();
    let theme_id = format!("rId{}", slide_count + 2);

    let mut entries: Vec<(&str, &str, &str)> =
        vec![("rId1", "slideMaster", "slideMasters/slideMaster1.xml")];
    entries.extend(slides.iter().map(|(id, target)| (id.as_str(), "slide", target.as_str())));
    entries.push((theme_id.as_str(), "theme", "theme/theme1.xml"));
    relationships(&entries)
}

fn slide_xml(slide: &DeckSlide) -> String {
    let mut tree = String::new();
    for (i, shape) in slide.shapes.iter().enumerate() {
        // id 1 belongs to the group shape
        let id = i + 2;
        match shape {
            Shape::Text {
                frame,
                text,
                style,
                align,
            } => {
                let algn = match align {
                    Align::Left => "l",
                    Align::Justify => "just",
                };
                let _ = write!(
                    tree,
                    r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:spAutoFit/></a:bodyPr><a:lstStyle/><a:p><a:pPr algn="{algn}"/><a:r><a:rPr lang="en-US" sz="{sz}" b="{b}" dirty="0">{fill}</a:rPr><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#,
                    id = id,
                    xfrm = transform(frame),
                    algn = algn,
                    sz = (style.size_pt * 100.0).round() as i64,
                    b = u8::from(style.bold),
                    fill = solid_fill(style.color),
                    text = escape(text.as_str()),
                );
            }
            Shape::Rule {
                x1,
                x2,
                y,
                color,
                width_pt,
            } => {
                let frame = Rect {
                    x: *x1,
                    y: *y,
                    cx: x2 - x1,
                    cy: 0,
                };
                let _ = write!(
                    tree,
                    r#"<p:cxnSp><p:nvCxnSpPr><p:cNvPr id="{id}" name="Line {id}"/><p:cNvCxnSpPr/><p:nvPr/></p:nvCxnSpPr><p:spPr>{xfrm}<a:prstGeom prst="line"><a:avLst/></a:prstGeom><a:ln w="{w}">{fill}</a:ln></p:spPr></p:cxnSp>"#,
                    id = id,
                    xfrm = transform(&frame),
                    w = (f64::from(*width_pt) * EMU_PER_POINT as f64).round() as i64,
                    fill = solid_fill(*color),
                );
            }
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}"><p:cSld><p:bg><p:bgPr>{bg}<a:effectLst/></p:bgPr></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>{tree}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        bg = solid_fill(slide.background),
        tree = tree
    )
}

fn transform(frame: &Rect) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        frame.x,
        frame.y,
        frame.cx.max(0),
        frame.cy.max(0)
    )
}

fn solid_fill(color: Rgb) -> String {
    format!(r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#, color)
}

const SLIDE_MASTER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#;

const SLIDE_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Slidepress"><a:themeElements><a:clrScheme name="Slidepress"><a:dk1><a:srgbClr val="212529"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="343A4F"/></a:dk2><a:lt2><a:srgbClr val="F8F9FA"/></a:lt2><a:accent1><a:srgbClr val="005A9C"/></a:accent1><a:accent2><a:srgbClr val="6C757D"/></a:accent2><a:accent3><a:srgbClr val="DEE2E6"/></a:accent3><a:accent4><a:srgbClr val="FF6B6B"/></a:accent4><a:accent5><a:srgbClr val="1E3A5F"/></a:accent5><a:accent6><a:srgbClr val="EAEAEA"/></a:accent6><a:hlink><a:srgbClr val="005A9C"/></a:hlink><a:folHlink><a:srgbClr val="6C757D"/></a:folHlink></a:clrScheme><a:fontScheme name="Slidepress"><a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Slidepress"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    const DECK: &str = r#"<html><head><title>t</title></head><body>
    <div id="presentation-container"><div id="slides-wrapper">
      <section class="slide"><div class="slide-header"><h2>Q&amp;A &lt;live&gt;</h2></div></section>
      <section class="slide"><div class="slide-body"><p>Thanks</p></div></section>
    </div></div></body></html>"#;

    fn read_part(path: &Path, name: &str) -> String {
        let file = fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut content = String::new();
        part.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_export_writes_one_slide_part_per_section() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("deck.html");
        let output = dir.path().join("out").join("deck.pptx");
        fs::write(&input, DECK).unwrap();

        let config = PptxConfig {
            title: "Review & Plan".to_string(),
            ..PptxConfig::default()
        };
        let count = export_pptx_file(&input, &output, &config).unwrap();
        assert_eq!(count, 2);

        let types = read_part(&output, "[Content_Types].xml");
        assert!(types.contains("/ppt/slides/slide1.xml"));
        assert!(types.contains("/ppt/slides/slide2.xml"));
        assert!(!types.contains("/ppt/slides/slide3.xml"));

        let first = read_part(&output, "ppt/slides/slide1.xml");
        assert!(first.contains("Q&amp;A &lt;live&gt;"));
        assert!(first.contains(r#"<a:srgbClr val="005A9C"/>"#), "title underline");
        assert!(first.contains(r#"<a:srgbClr val="F8F9FA"/>"#), "default background");

        let second = read_part(&output, "ppt/slides/slide2.xml");
        assert!(second.contains("<a:t>Thanks</a:t>"));
        assert!(second.contains(r#"sz="1800""#));

        let core = read_part(&output, "docProps/core.xml");
        assert!(core.contains("<dc:title>Review &amp; Plan</dc:title>"));

        let rels = read_part(&output, "ppt/_rels/presentation.xml.rels");
        assert!(rels.contains(r#"Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml""#));
        assert!(rels.contains(r#"Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme""#));
    }

    #[test]
    fn test_deck_without_sections_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.html");
        let output = dir.path().join("empty.pptx");
        fs::write(&input, "<html><body><div>no slides</div></body></html>").unwrap();

        let err = export_pptx_file(&input, &output, &PptxConfig::default()).unwrap_err();
        assert!(matches!(err, PressError::NoSlidesFound));
        assert!(!output.exists());
    }

    #[test]
    fn test_aspect_ratio_sets_slide_size() {
        let config = PptxConfig {
            aspect_ratio: "4:3".to_string(),
            ..PptxConfig::default()
        };
        assert_eq!(config.slide_size(), (9_144_000, 6_858_000));

        let odd = PptxConfig {
            aspect_ratio: "21:9".to_string(),
            ..PptxConfig::default()
        };
        assert_eq!(odd.slide_size(), (9_144_000, 5_143_500));
    }
}
