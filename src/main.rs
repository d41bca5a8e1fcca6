//! PackagingPal - packaging sourcing assistant
//!
//! Terminal REPL by default, HTTP + SSE chat server with `--serve`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use packaging_pal::config::{self, CliOverrides, Config, ContinuationMode, Settings};
use packaging_pal::image::ReferenceImage;
use packaging_pal::provider::OpenAiProvider;
use packaging_pal::repl::colors::{self, ansi::*};
use packaging_pal::responses::Client as ResponsesClient;
use packaging_pal::search::SearchClient;
use packaging_pal::{SessionFactory, SessionOptions, prompt, repl, server};

#[derive(Parser)]
#[command(name = "packaging-pal")]
#[command(about = "Chat assistant for finding packaging products", version)]
struct Args {
    /// Run as HTTP server instead of REPL
    #[arg(long)]
    serve: bool,

    /// HTTP server port
    #[arg(long, default_value = "3000")]
    port: u16,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,

    /// OpenAI base URL (proxies, compatible gateways)
    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Completion model
    #[arg(long, env = "PACKAGING_PAL_MODEL")]
    model: Option<String>,

    /// Product search base URL (the client POSTs to <url>/search)
    #[arg(long, env = "IMPACKED_SEARCH_URL")]
    search_url: Option<String>,

    /// Vector store id for the file_search tool
    #[arg(long, env = "OPENAI_VECTOR_STORE_ID")]
    vector_store: Option<String>,

    /// Number of hits requested from the search endpoint
    #[arg(long)]
    top_k: Option<usize>,

    /// Reference image (png/jpg) attached from the first turn
    #[arg(long)]
    image: Option<PathBuf>,

    /// How turns carry earlier context
    #[arg(long, value_enum)]
    continuation: Option<ContinuationMode>,

    /// File replacing the built-in system prompt
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from ~/.packaging-pal/.env or current dir)
    let env_path = Some(config::config_dir().join(".env")).filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    // CLI args > env vars (handled by clap) > config file > defaults
    let overrides = CliOverrides {
        openai_api_key: args.openai_api_key,
        openai_base_url: args.openai_base_url,
        model: args.model,
        search_base_url: args.search_url,
        vector_store_id: args.vector_store,
        top_k: args.top_k,
        continuation: args.continuation,
        system_prompt_file: args.system_prompt_file,
    };
    let settings = Settings::resolve(overrides, Config::load())?;

    let system_prompt = match &settings.system_prompt_file {
        Some(path) => prompt::load_system_prompt(path)?,
        None => prompt::default_system_prompt(),
    };

    let client = ResponsesClient::new(settings.openai_api_key.clone()).with_base_url(&settings.openai_base_url);
    let provider = OpenAiProvider::new(client, settings.model.clone()).with_temperature(settings.temperature);
    let search = SearchClient::new(
        &settings.search_base_url,
        Duration::from_secs(settings.search_timeout_secs),
    )?;

    let factory = SessionFactory::new(
        Arc::new(provider),
        Arc::new(search),
        SessionOptions::from(&settings),
        system_prompt,
    );

    let image = match &args.image {
        Some(path) => Some(ReferenceImage::from_path(path)?),
        None => None,
    };

    println!();
    println!("{}{}  PackagingPal {}{}", BOLD, MAGENTA, env!("CARGO_PKG_VERSION"), RESET);
    println!("{}", colors::separator(50));
    println!("{}", colors::banner_line("Model", &settings.model));
    println!("{}", colors::banner_line("Search", &factory.search_endpoint()));
    println!("{}", colors::banner_line("Top-k", &settings.top_k.to_string()));
    println!(
        "{}",
        colors::banner_line(
            "Continuation",
            match settings.continuation {
                ContinuationMode::Transcript => "transcript",
                ContinuationMode::Chained => "chained",
            }
        )
    );
    if settings.system_prompt_file.is_some() {
        println!("{}", colors::banner_line("Prompt", &colors::warning("custom")));
    }
    if let Some(img) = &image {
        println!("{}", colors::banner_line("Image", &img.describe()));
    }
    println!("{}", colors::separator(50));
    println!();

    if args.serve {
        if image.is_some() {
            tracing::warn!("--image only applies to the REPL; upload images through /api/image");
        }
        server::run(args.port, factory).await
    } else {
        repl::run(factory, image).await
    }
}
