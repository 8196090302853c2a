use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

mod config;
mod csv_out;
mod deck;
mod extract;
mod fetch;
mod input;
mod media;
mod models;
mod pipeline;

use deck::{Branding, Rgb};
use fetch::{BrowserlessRenderer, HttpFetcher};
use media::ImageData;
use pipeline::{scrape_all, ScrapeOptions};

/// Scrape real-estate listings into a CSV file and a branded slide deck.
#[derive(Parser, Debug)]
#[command(name = "imovirtual-deck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file with one column of listing URLs (header + rows)
    #[arg(default_value = config::DEFAULT_INPUT)]
    input: PathBuf,

    /// Output CSV file
    #[arg(long, default_value = config::DEFAULT_CSV_OUT)]
    csv: PathBuf,

    /// Output PowerPoint file
    #[arg(long, default_value = config::DEFAULT_PPTX_OUT)]
    pptx: PathBuf,

    /// Images kept per listing
    #[arg(long, default_value_t = config::MAX_IMAGES)]
    max_images: usize,

    /// Logo image (PNG, JPEG or GIF) for the slides
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Company name on the cover slide
    #[arg(long, default_value = config::COMPANY_NAME)]
    company: String,

    /// Deck title on the cover slide
    #[arg(long, default_value = config::DECK_TITLE)]
    title: String,

    /// Accent color as RRGGBB
    #[arg(long, default_value = config::ACCENT_COLOR)]
    accent: Rgb,

    /// Do not download images (the CSV still lists their URLs)
    #[arg(long)]
    no_images: bool,

    /// Render pages through a Browserless endpoint instead of plain HTTP
    #[arg(long, env = "BROWSERLESS_URL")]
    browserless_url: Option<String>,

    /// Token for the Browserless endpoint
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    browserless_token: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let branding = Branding {
        company_name: args.company.clone(),
        deck_title: args.title.clone(),
        accent: args.accent,
        logo: args.logo.as_deref().map(load_logo).transpose()?,
    };

    let urls = input::read_urls(&args.input)
        .with_context(|| format!("Failed to read URL list from {}", args.input.display()))?;
    tracing::info!("{} listing URLs in {}", urls.len(), args.input.display());

    let options = ScrapeOptions {
        max_images: args.max_images,
        download_images: !args.no_images,
    };

    let listings = match args.browserless_url.as_deref() {
        Some(endpoint) => {
            tracing::info!("rendering pages through {}", endpoint);
            let renderer = BrowserlessRenderer::new(endpoint, args.browserless_token.as_deref())?;
            scrape_all(&renderer, &urls, &options).await
        }
        None => {
            let fetcher = HttpFetcher::new()?;
            scrape_all(&fetcher, &urls, &options).await
        }
    };

    csv_out::write_csv(&args.csv, &listings, args.max_images)
        .with_context(|| format!("Failed to write {}", args.csv.display()))?;

    deck::write_deck(&args.pptx, branding, &listings)
        .with_context(|| format!("Failed to write {}", args.pptx.display()))?;

    Ok(())
}

fn load_logo(path: &Path) -> Result<ImageData> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read logo {}", path.display()))?;
    ImageData::from_bytes(bytes)
        .with_context(|| format!("Logo {} is not a PNG, JPEG or GIF image", path.display()))
}
