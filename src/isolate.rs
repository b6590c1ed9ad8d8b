// ABOUTME: Slide isolation for the slidepress application
// ABOUTME: Re-wraps one slide section into a standalone, fully visible HTML document

use crate::errors::Result;
use crate::loader::{SourceDocument, CONTAINER_ID, WRAPPER_ID};
use crate::workspace::RequestWorkspace;
use html_escape::encode_double_quoted_attribute as attr;
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

/// Stylesheet that cancels the deck's stacked-slide layout so a single
/// slide fills the page. Inserted last in the head so it wins ties.
pub const OVERRIDE_STYLESHEET: &str = r#"<style>
    .slide {
        position: relative !important;
        opacity: 1 !important;
        visibility: visible !important;
        width: 100% !important;
        height: 100% !important;
    }
    #slides-wrapper {
        position: relative !important;
        width: 100% !important;
        height: 100% !important;
        overflow: hidden !important;
    }
    #presentation-container {
        width: 100% !important;
        height: 100% !important;
        max-width: none !important;
        box-shadow: none !important;
        border-radius: 0 !important;
        margin: 0 !important;
        padding: 0 !important;
    }
    body {
        margin: 0 !important;
        padding: 0 !important;
        width: 100% !important;
        height: 100% !important;
        overflow: hidden !important;
    }
    html {
        margin: 0 !important;
        padding: 0 !important;
        width: 100% !important;
        height: 100% !important;
    }
</style>
"#;

/// Insert the override stylesheet immediately before the closing head tag
pub fn patch_head(head: &str) -> String {
    let lower = head.to_ascii_lowercase();
    match lower.rfind("</head") {
        Some(pos) => {
            let mut patched = String::with_capacity(head.len() + OVERRIDE_STYLESHEET.len());
            patched.push_str(&head[..pos]);
            patched.push_str(OVERRIDE_STYLESHEET);
            patched.push_str(&head[pos..]);
            patched
        }
        None => format!("<head>\n{}</head>", OVERRIDE_STYLESHEET),
    }
}

/// Build the standalone document for the slide at `index`
pub fn standalone_document(doc: &SourceDocument, index: usize) -> String {
    let slide = &doc.slides[index];

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
{head}
<body class="{body_class}">
    <div id="{container_id}" class="{container_class}">
        <div id="{wrapper_id}" class="{wrapper_class}" style="{wrapper_style}">
            {slide}
        </div>
    </div>
</body>
</html>"#,
        head = patch_head(&doc.head),
        body_class = attr(&doc.body.class),
        container_id = CONTAINER_ID,
        container_class = attr(&doc.container.class),
        wrapper_id = WRAPPER_ID,
        wrapper_class = attr(&doc.wrapper.class),
        wrapper_style = attr(&doc.wrapper.style),
        slide = slide.to_active_markup(),
    )
}

/// Write one standalone document per slide into the workspace, in slide order
pub fn write_standalone_documents(
    doc: &SourceDocument,
    workspace: &RequestWorkspace,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(doc.slide_count());

    for slide in &doc.slides {
        let path = workspace.slide_html_path(slide.number());
        fs::write(&path, standalone_document(doc, slide.index))?;
        debug!("Wrote standalone document {:?}", path);
        paths.push(path);
    }

    info!("Created {} standalone slide documents", paths.len());
    Ok(paths)
}
