// ABOUTME: Library module for the slidepress program.
// ABOUTME: Converts HTML slide decks into merged PDFs and editable PPTX files.

// Reexport modules
pub mod config;
pub mod deck;
pub mod errors;
pub mod isolate;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod pptx;
pub mod progress;
pub mod render;
pub mod server;
pub mod style;
pub mod utils;
pub mod workspace;

// Reexport common types and functions
pub use config::Config;
pub use errors::{PressError, Result};
pub use loader::SourceDocument;
pub use pipeline::{convert_file, convert_html_to_pdf, ConversionContext, ConversionOutput};
pub use pptx::{export_pptx_file, PptxConfig};
pub use progress::{LogProgress, NoopProgress, ProgressSink};
pub use render::{ChromeExporter, PageExporter, PageSize, RenderConfig};
pub use server::{serve, ServerConfig};
pub use workspace::RequestWorkspace;
