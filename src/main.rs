//! Taiyaku CLI - bilingual e-book translator.

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use taiyaku::book::{BookOptions, translate_book};
use taiyaku::config::Config;
use taiyaku::console::{Console, ConsoleLogger};
use taiyaku::providers::{EchoProvider, GoogleTranslateProvider, TextProvider};
use taiyaku::translator::Translator;

/// Adds a translation under every paragraph of an extracted EPUB.
#[derive(Parser, Debug)]
#[command(name = "taiyaku")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the extracted container (with META-INF/container.xml).
    book_dir: PathBuf,

    /// Use this config file instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source language code (overrides config).
    #[arg(long)]
    source: Option<String>,

    /// Target language code (overrides config).
    #[arg(long)]
    target: Option<String>,

    /// Translate plain text instead of inline markup.
    #[arg(long)]
    clean_format: bool,

    /// Translate creator names as well as the title.
    #[arg(long)]
    translate_authors: bool,

    /// Echo every paragraph instead of calling the translation API.
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = Console::new();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    ConsoleLogger::init(level).context("Failed to install logger")?;

    console.section("Taiyaku - Bilingual Book Translator");

    // Load configuration
    console.step("Loading configuration...");
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(source) = args.source {
        config.translation.source_language_code = source;
    }
    if let Some(target) = args.target {
        config.translation.target_language_code = target;
    }
    if args.clean_format {
        config.translation.clean_format = true;
    }

    // Check if this is first run (credentials not configured)
    if !args.dry_run && !config.provider.is_configured() {
        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => Config::config_path()?,
        };
        console.warning(&format!(
            "Translation API not configured. Please edit: {}",
            config_path.display()
        ));
        console.info("Set provider.project_id and provider.access_token, or run with --dry-run.");
        return Ok(());
    }

    config
        .validate_with_options(!args.dry_run)
        .context("Invalid configuration")?;
    console.success("Configuration loaded");

    let provider: Arc<dyn TextProvider> = if args.dry_run {
        Arc::new(EchoProvider)
    } else {
        Arc::new(
            GoogleTranslateProvider::new(config.provider.clone())
                .context("Failed to create translation client")?,
        )
    };
    console.info(&format!(
        "Translating {} -> {} via {}",
        config.translation.source_language_code,
        config.translation.target_language_code,
        provider.name()
    ));

    let translator = Translator::new(provider, config.translation.clone());
    let options = BookOptions {
        translate_authors: args.translate_authors,
    };

    console.step(&format!("Translating {}...", args.book_dir.display()));
    let report = match translate_book(&args.book_dir, &translator, options).await {
        Ok(report) => report,
        Err(e) => {
            console.error(&format!("{:#}", anyhow::Error::from(e)));
            std::process::exit(1);
        }
    };

    console.success(&format!(
        "Translated {} documents",
        console.count(report.documents.len())
    ));
    for href in &report.skipped {
        console.warning(&format!("Skipped missing document {}", console.muted(href)));
    }
    if let Some(title) = &report.title {
        console.info(&format!("Title: {}", title));
    }

    console.section("Done!");
    Ok(())
}
