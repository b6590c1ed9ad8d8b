// ABOUTME: HTTP service for the slidepress application
// ABOUTME: Accepts uploaded decks and answers with the merged PDF, one thread per request

use crate::config::Config;
use crate::errors::{PressError, Result};
use crate::pipeline::{self, ConversionContext};
use crate::progress::LogProgress;
use crate::render::{ChromeExporter, RenderConfig};
use crate::utils;
use log::{debug, error, info, warn};
use serde_json::json;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use url::Url;

/// Configuration for the HTTP service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Turns an uploaded deck into merged PDF bytes
pub type Converter = dyn Fn(&str) -> Result<Vec<u8>> + Send + Sync;

/// Start the service and block serving requests
pub fn serve(server_config: ServerConfig, config: Config, render_config: RenderConfig) -> Result<()> {
    let converter = chrome_converter(config, render_config);
    let addr = format!("{}:{}", server_config.host, server_config.port);
    let server = Server::http(&addr)
        .map_err(|e| PressError::ServerError(format!("Failed to start HTTP server on {}: {}", addr, e)))?;

    info!("HTTP server listening on http://{}", addr);
    let service = Arc::new(Service {
        max_upload_bytes: server_config.max_upload_bytes,
        converter,
    });

    for request in server.incoming_requests() {
        let service = service.clone();
        thread::spawn(move || service.handle(request));
    }
    Ok(())
}

/// Converter backed by a fresh browser session and workspace per call
pub fn chrome_converter(config: Config, render_config: RenderConfig) -> Box<Converter> {
    Box::new(move |html: &str| {
        let ctx = ConversionContext::new(config.workspace_dir.clone(), Arc::new(LogProgress));
        let mut exporter = ChromeExporter::new(render_config.clone());
        pipeline::convert_html_to_pdf(html, &ctx, &mut exporter)?.read_merged()
    })
}

pub struct Service {
    pub max_upload_bytes: u64,
    pub converter: Box<Converter>,
}

/// An uploaded file taken from a request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Response before it is bound to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
        }
    }

    fn detail(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "detail": message.into() }))
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn pdf(file_name: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/pdf".to_string(),
            headers: vec![("Content-Disposition".to_string(), attachment(file_name))],
            body,
        }
    }

    fn into_response(self) -> Response<std::io::Cursor<Vec<u8>>> {
        let mut headers = vec![
            ("Content-Type".to_string(), self.content_type),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ("Access-Control-Allow-Methods".to_string(), "*".to_string()),
            ("Access-Control-Allow-Headers".to_string(), "*".to_string()),
        ];
        headers.extend(self.headers);

        let mut response = Response::from_data(self.body).with_status_code(StatusCode(self.status));
        for (field, value) in headers {
            match Header::from_bytes(field.as_bytes(), value.as_bytes()) {
                Ok(header) => response = response.with_header(header),
                Err(()) => warn!("Dropping invalid response header {}", field),
            }
        }
        response
    }
}

/// Incoming request reduced to what routing needs
pub struct Incoming<'a> {
    pub method: Method,
    pub url: &'a str,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
    /// Set when the body was cut off at the upload limit
    pub truncated: bool,
}

impl Service {
    fn handle(&self, mut request: Request) {
        let method = request.method().clone();
        let url = request.url().to_string();
        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.as_str().to_string());
        debug!("{} {}", method, url);

        let limit = self.max_upload_bytes;
        let declared_too_large = request.body_length().is_some_and(|len| len as u64 > limit);
        let mut body = Vec::new();
        let mut truncated = declared_too_large;
        if !declared_too_large {
            if let Err(e) = request.as_reader().take(limit + 1).read_to_end(&mut body) {
                error!("Failed to read request body: {}", e);
                respond(request, Reply::detail(400, "Failed to read request body"));
                return;
            }
            truncated = body.len() as u64 > limit;
        }

        let reply = self.route(&Incoming {
            method: method.clone(),
            url: &url,
            content_type: content_type.as_deref(),
            body: &body,
            truncated,
        });
        info!("{} {} -> {}", method, url, reply.status);
        respond(request, reply);
    }

    pub fn route(&self, incoming: &Incoming<'_>) -> Reply {
        let path = incoming.url.split('?').next().unwrap_or("/");
        match (&incoming.method, path) {
            (Method::Options, _) => Reply::empty(204),
            (Method::Get, "/") => Reply::json(
                200,
                json!({
                    "message": "slidepress HTML to PDF service",
                    "endpoints": {
                        "/convert": "POST - convert an HTML deck to a merged PDF",
                        "/health": "GET - service health check"
                    }
                }),
            ),
            (Method::Get, "/health") => Reply::json(200, json!({ "status": "healthy" })),
            (Method::Post, "/convert") => self.convert(incoming),
            (_, "/" | "/health" | "/convert") => Reply::detail(405, "Method Not Allowed"),
            _ => Reply::detail(404, "Not Found"),
        }
    }

    fn convert(&self, incoming: &Incoming<'_>) -> Reply {
        if incoming.truncated {
            return Reply::detail(
                413,
                format!("Upload exceeds the {} byte limit", self.max_upload_bytes),
            );
        }

        let upload = match extract_upload(incoming.content_type, incoming.url, incoming.body) {
            Ok(upload) => upload,
            Err(e) => return Reply::detail(400, e.to_string()),
        };

        if !utils::has_html_extension(&upload.file_name) {
            return Reply::detail(400, "Only HTML files are supported.");
        }

        let html = match String::from_utf8(upload.data) {
            Ok(html) => html,
            Err(_) => return Reply::detail(400, "Uploaded file is not valid UTF-8 text."),
        };

        // Input checks are done; anything the pipeline reports is a server-side failure
        match (self.converter)(&html) {
            Ok(pdf) => Reply::pdf(&utils::merged_pdf_name(&upload.file_name), pdf),
            Err(e) => {
                error!("Conversion of {} failed: {}", upload.file_name, e);
                Reply::detail(500, format!("PDF conversion failed: {}", e))
            }
        }
    }
}

fn respond(request: Request, reply: Reply) {
    if let Err(e) = request.respond(reply.into_response()) {
        error!("Failed to send response: {}", e);
    }
}

/// Take the uploaded deck from a multipart `file` part, or from a raw body named by `?filename=`
pub fn extract_upload(content_type: Option<&str>, url: &str, body: &[u8]) -> Result<Upload> {
    if let Some(boundary) = content_type.and_then(multipart_boundary) {
        return multipart_file(body, &boundary);
    }

    let parsed = Url::parse("http://localhost")
        .and_then(|base| base.join(url))
        .map_err(|e| PressError::ValidationError(format!("Invalid request URL: {}", e)))?;
    let file_name = parsed
        .query_pairs()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            PressError::ValidationError(
                "Expected a multipart `file` field or a `filename` query parameter".to_string(),
            )
        })?;

    Ok(Upload {
        file_name,
        data: body.to_vec(),
    })
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut parts = content_type.split(';');
    let mime = parts.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parts
        .filter_map(|p| p.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

fn multipart_file(body: &[u8], boundary: &str) -> Result<Upload> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let missing = || PressError::ValidationError("Multipart body has no `file` field".to_string());

    let mut rest = match find(body, &delimiter) {
        Some(start) => &body[start + delimiter.len()..],
        None => return Err(missing()),
    };

    // Each part: CRLF, headers, blank line, content, CRLF, delimiter
    while !rest.starts_with(b"--") {
        let Some(next) = find(rest, &delimiter) else {
            break;
        };
        let part = &rest[..next];
        rest = &rest[next + delimiter.len()..];

        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let Some(split) = find(part, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&part[..split]);
        let content = &part[split + 4..];
        let content = content.strip_suffix(b"\r\n").unwrap_or(content);

        let Some(disposition) = headers
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))
        else {
            continue;
        };
        if disposition_param(disposition, "name").as_deref() != Some("file") {
            continue;
        }

        return Ok(Upload {
            file_name: disposition_param(disposition, "filename").unwrap_or_default(),
            data: content.to_vec(),
        });
    }

    Err(missing())
}

fn disposition_param(disposition: &str, name: &str) -> Option<String> {
    disposition
        .split(';')
        .skip(1)
        .filter_map(|p| p.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `Content-Disposition` value with an ASCII fallback and a UTF-8 `filename*`
fn attachment(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && !c.is_ascii_control() { c } else { '_' })
        .collect();
    if ascii == file_name {
        return format!("attachment; filename=\"{}\"", ascii);
    }
    let encoded: String = url::form_urlencoded::byte_serialize(file_name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", ascii, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::render::{PageExporter, PageSize};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn service_with(converter: Box<Converter>) -> Service {
        Service {
            max_upload_bytes: 1024,
            converter,
        }
    }

    fn counting_service(calls: Arc<AtomicUsize>) -> Service {
        service_with(Box::new(move |html: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("%PDF-{}", html.len()).into_bytes())
        }))
    }

    fn multipart(file_name: &str, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = "XyZ123";
        let mut body = Vec::new();
        body.extend_from_slice(b"--XyZ123\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        body.extend_from_slice(
            format!(
                "--XyZ123\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: text/html\r\n\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--XyZ123--\r\n");
        (format!("multipart/form-data; boundary={}", boundary), body)
    }

    fn post<'a>(url: &'a str, content_type: Option<&'a str>, body: &'a [u8]) -> Incoming<'a> {
        Incoming {
            method: Method::Post,
            url,
            content_type,
            body,
            truncated: false,
        }
    }

    fn get(url: &str) -> Incoming<'_> {
        Incoming {
            method: Method::Get,
            url,
            content_type: None,
            body: &[],
            truncated: false,
        }
    }

    fn detail(reply: &Reply) -> String {
        let value: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        value["detail"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_health_and_banner() {
        let service = counting_service(Arc::new(AtomicUsize::new(0)));
        let health = service.route(&get("/health"));
        assert_eq!(health.status, 200);
        assert_eq!(health.body, br#"{"status":"healthy"}"#.to_vec());

        assert_eq!(service.route(&get("/")).status, 200);
        assert_eq!(service.route(&get("/missing")).status, 404);
        assert_eq!(service.route(&get("/convert")).status, 405);
    }

    #[test]
    fn test_convert_multipart_upload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = counting_service(calls.clone());
        let (content_type, body) = multipart("quarterly.html", b"<section>a</section>");

        let reply = service.route(&post("/convert", Some(&content_type), &body));

        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type, "application/pdf");
        assert_eq!(reply.body, b"%PDF-20".to_vec());
        assert_eq!(
            reply.headers,
            vec![(
                "Content-Disposition".to_string(),
                "attachment; filename=\"quarterly_merged.pdf\"".to_string()
            )]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_html_rejected_before_conversion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = counting_service(calls.clone());
        let (content_type, body) = multipart("notes.txt", b"plain");

        let reply = service.route(&post("/convert", Some(&content_type), &body));

        assert_eq!(reply.status, 400);
        assert_eq!(detail(&reply), "Only HTML files are supported.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_raw_body_with_filename_query() {
        let service = counting_service(Arc::new(AtomicUsize::new(0)));
        let reply = service.route(&post("/convert?filename=my%20deck.html", None, b"<section></section>"));
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.headers[0].1,
            "attachment; filename=\"my deck_merged.pdf\""
        );
    }

    #[test]
    fn test_invalid_utf8_and_oversized_uploads() {
        let service = counting_service(Arc::new(AtomicUsize::new(0)));

        let reply = service.route(&post("/convert?filename=a.html", None, &[0xff, 0xfe, 0x00]));
        assert_eq!(reply.status, 400);

        let mut big = post("/convert?filename=a.html", None, b"");
        big.truncated = true;
        assert_eq!(service.route(&big).status, 413);
    }

    #[test]
    fn test_pipeline_failure_maps_to_500() {
        let service = service_with(Box::new(|_html: &str| Err(PressError::NoSlidesFound)));
        let reply = service.route(&post("/convert?filename=a.html", None, b"<p>x</p>"));

        assert_eq!(reply.status, 500);
        assert_eq!(
            detail(&reply),
            "PDF conversion failed: HTML contains no <section> elements"
        );
    }

    #[test]
    fn test_workspace_failure_maps_to_500() {
        struct NeverCalled;

        impl PageExporter for NeverCalled {
            fn export_page(&mut self, slide: usize, _html: &Path, _pdf: &Path) -> Result<PageSize> {
                Err(PressError::RenderFailed {
                    slide,
                    reason: "exporter should not run".to_string(),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("workspaces");
        fs::write(&not_a_dir, b"occupied").unwrap();

        let service = service_with(Box::new(move |html: &str| {
            let ctx = ConversionContext::new(not_a_dir.clone(), Arc::new(NoopProgress));
            pipeline::convert_html_to_pdf(html, &ctx, &mut NeverCalled)?.read_merged()
        }));
        let deck = r#"<html><body><div id="presentation-container"><div id="slides-wrapper">
            <section class="slide">one</section></div></div></body></html>"#;
        let reply = service.route(&post("/convert?filename=deck.html", None, deck.as_bytes()));

        assert_eq!(reply.status, 500);
        assert!(detail(&reply).starts_with("PDF conversion failed: "));
        assert!(detail(&reply).contains("not a directory"));
    }

    #[test]
    fn test_options_preflight() {
        let service = counting_service(Arc::new(AtomicUsize::new(0)));
        let reply = service.route(&Incoming {
            method: Method::Options,
            url: "/convert",
            content_type: None,
            body: &[],
            truncated: false,
        });
        assert_eq!(reply.status, 204);
    }

    #[test]
    fn test_multipart_without_file_field() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--b--\r\n";
        let err = extract_upload(Some("multipart/form-data; boundary=\"b\""), "/convert", body)
            .unwrap_err();
        assert!(err.to_string().contains("no `file` field"));
    }

    #[test]
    fn test_non_ascii_download_name() {
        assert_eq!(
            attachment("발표_merged.pdf"),
            "attachment; filename=\"___merged.pdf\"; filename*=UTF-8''%EB%B0%9C%ED%91%9C_merged.pdf"
        );
    }
}
