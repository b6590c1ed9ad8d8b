// ABOUTME: Main entry point for the slidepress program.
// ABOUTME: Provides CLI interface and executes commands from the library.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an HTML slide deck into one merged PDF
    Convert(ConvertArgs),

    /// Export an HTML slide deck as an editable PPTX
    ExportPptx(ExportPptxArgs),

    /// Serve the conversion API over HTTP
    Serve(ServeArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Path to the HTML deck
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the output PDF
    #[arg(short, long)]
    output: PathBuf,

    /// Chrome or Chromium executable
    #[arg(long)]
    browser_path: Option<String>,

    /// Directory for per-request workspaces
    #[arg(long)]
    workspace_dir: Option<PathBuf>,

    /// Delay after the document is ready, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Bound on waiting for the slide to become visible, in milliseconds
    #[arg(long)]
    visibility_timeout_ms: Option<u64>,
}

#[derive(Args)]
struct ExportPptxArgs {
    /// Path to the HTML deck
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the output PPTX
    #[arg(short, long)]
    output: PathBuf,

    /// Presentation title
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut config = slidepress::Config::from_env();

    let result = match &cli.command {
        Some(Commands::Convert(args)) => {
            if let Some(dir) = &args.workspace_dir {
                config.workspace_dir = dir.clone();
            }
            let render_config = config.get_render_config(
                args.browser_path.clone(),
                args.settle_ms,
                args.visibility_timeout_ms,
            );

            slidepress::convert_file(&args.input, &args.output, &config, render_config).and_then(
                |written| {
                    let pages = slidepress::merge::page_count(&written)?;
                    println!("PDF generated successfully: {:?} ({} pages)", written, pages);
                    Ok(())
                },
            )
        }
        Some(Commands::ExportPptx(args)) => {
            let pptx_config = config.get_pptx_config(args.title.clone());
            slidepress::export_pptx_file(&args.input, &args.output, &pptx_config).map(|slides| {
                println!("PPTX generated successfully: {:?} ({} slides)", args.output, slides);
            })
        }
        Some(Commands::Serve(args)) => {
            let server_config = config.get_server_config(args.host.clone(), args.port);
            let render_config = config.get_render_config(None, None, None);
            slidepress::serve(server_config, config.clone(), render_config)
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
