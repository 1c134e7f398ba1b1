use anyhow::{Context, Result};
use backlink::handlers::{
    ConfigOverrides, cache_directory, exit_code, load_config, load_seed_urls, render_cache_stats,
    render_header, render_report, write_json_report,
};
use backlink_core::{BacklinkResult, CrawlConfig, CrawlEngine, FetchGateway, ProgressCallback};
use backlink_scanner::{
    BrowserFetcher, CachingFetcher, FallbackFetcher, HttpFetcher, RenderServiceFetcher,
    ResponseCache, SqliteCache,
};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let outcome = match matches.subcommand() {
        Some(("verify", sub_matches)) => handle_verify(sub_matches).await,
        Some(("crawl", sub_matches)) => handle_crawl(sub_matches).await,
        Some(("cache", sub_matches)) => match sub_matches.subcommand() {
            Some(("stats", secondary)) => handle_cache_stats(secondary),
            Some(("clear", secondary)) => handle_cache_clear(secondary),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so reports on stdout stay clean. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_config(args: &ArgMatches) -> Result<CrawlConfig> {
    let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let overrides = ConfigOverrides {
        max_hops: args.get_one::<usize>("max-hops").copied(),
        only_trusted_surfaces: args.get_flag("only-well-known-id-sites"),
        only_strong_links: args.get_flag("only-rel-me"),
        no_cache: args.get_flag("no-cache"),
        cache_dir: args.get_one::<String>("cache-dir").cloned(),
    };
    Ok(overrides.apply(config))
}

/// Where pages the plain HTTP fetch could not load get a second try.
enum Renderer<'a> {
    None,
    Service(&'a str),
    Local(Option<&'a PathBuf>),
}

impl<'a> Renderer<'a> {
    fn from_args(args: &'a ArgMatches) -> Self {
        if args.get_flag("render-local") {
            Renderer::Local(args.get_one::<PathBuf>("chrome"))
        } else if let Some(endpoint) = args.get_one::<String>("render-endpoint") {
            Renderer::Service(endpoint)
        } else {
            Renderer::None
        }
    }
}

/// HTTP fetcher, optionally backed by a renderer, behind the response cache.
async fn build_gateway(
    config: &CrawlConfig,
    renderer: Renderer<'_>,
) -> Result<Box<dyn FetchGateway>> {
    let http = HttpFetcher::new(config).context("Failed to build HTTP client")?;
    let gateway: Box<dyn FetchGateway> = match renderer {
        Renderer::Service(endpoint) => {
            let service = RenderServiceFetcher::new(endpoint, config)
                .context("Failed to configure rendering service")?;
            info!("Retrying failed fetches through {}", service.endpoint());
            Box::new(FallbackFetcher::new(http, service))
        }
        Renderer::Local(executable) => {
            let browser = BrowserFetcher::launch(config, executable.map(PathBuf::as_path))
                .await
                .context("Failed to launch headless browser")?;
            Box::new(FallbackFetcher::new(http, browser))
        }
        Renderer::None => Box::new(http),
    };

    if !config.cache.enabled {
        return Ok(gateway);
    }
    let cache = SqliteCache::in_directory(&cache_directory(config), config.cache.expire_secs)
        .context("Failed to open response cache")?;
    Ok(Box::new(
        CachingFetcher::new(gateway, cache).with_store_errors(config.cache.store_errors),
    ))
}

fn progress_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Fetching origin...");
    spinner
}

async fn run_crawl(args: &ArgMatches) -> Result<BacklinkResult> {
    let url = args
        .get_one::<String>("URL")
        .context("An origin URL is required")?;
    let config = build_config(args)?;
    let seeds = match args.get_one::<PathBuf>("links-file") {
        Some(path) => load_seed_urls(path)?,
        None => Vec::new(),
    };
    let gateway = build_gateway(&config, Renderer::from_args(args)).await?;

    let spinner = progress_spinner(args.get_flag("quiet"));
    let spinner_clone = spinner.clone();
    let progress: ProgressCallback = Arc::new(move |hop: usize, url: String| {
        spinner_clone.set_message(format!("hop {}: {}", hop, url));
    });

    let engine = CrawlEngine::new(gateway, config)?
        .with_seeds(seeds)
        .with_progress_callback(progress);
    let result = engine.run(url).await;
    spinner.finish_and_clear();
    Ok(result?)
}

async fn handle_verify(args: &ArgMatches) -> Result<i32> {
    let url = args
        .get_one::<String>("URL")
        .context("An origin URL is required")?;
    {
        let mut out = io::stdout().lock();
        render_header(&mut out, url)?;
        out.flush()?;
    }

    let result = run_crawl(args).await?;

    let mut out = io::stdout().lock();
    render_report(&mut out, &result)?;
    Ok(exit_code(&result))
}

async fn handle_crawl(args: &ArgMatches) -> Result<i32> {
    let json_path = args
        .get_one::<PathBuf>("json")
        .context("--json is required")?;
    let result = run_crawl(args).await?;

    write_json_report(json_path, &result)?;
    if !args.get_flag("quiet") {
        println!(
            "{} Full evidence report written to {}",
            "✓".green().bold(),
            json_path.display()
        );
    }
    Ok(0)
}

fn open_cache(args: &ArgMatches) -> Result<(SqliteCache, PathBuf)> {
    let config = build_cache_config(args)?;
    let directory = cache_directory(&config);
    let cache = SqliteCache::in_directory(&directory, config.cache.expire_secs)
        .with_context(|| format!("Failed to open cache in {}", directory.display()))?;
    let location = cache.path().to_path_buf();
    Ok((cache, location))
}

fn build_cache_config(args: &ArgMatches) -> Result<CrawlConfig> {
    let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let overrides = ConfigOverrides {
        cache_dir: args.get_one::<String>("cache-dir").cloned(),
        ..Default::default()
    };
    Ok(overrides.apply(config))
}

fn handle_cache_stats(args: &ArgMatches) -> Result<i32> {
    let (cache, location) = open_cache(args)?;
    let stats = cache.stats()?;
    render_cache_stats(&mut io::stdout().lock(), &stats, &location)?;
    Ok(0)
}

fn handle_cache_clear(args: &ArgMatches) -> Result<i32> {
    let (cache, location) = open_cache(args)?;
    let removed = cache.clear()?;
    println!(
        "{} Removed {} cached responses from {}",
        "✓".green().bold(),
        removed,
        location.display()
    );
    Ok(0)
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
