use anyhow::{Context, Result, bail};
use backlink_core::{BacklinkResult, Classification, CrawlConfig, RunError, ScoreLabel};
use backlink_scanner::CacheStats;
use colored::Colorize;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

/// Exit code for a run that found neither evidence nor errors.
pub const EXIT_NO_BACKLINKS: i32 = 100;

pub const DEFAULT_CACHE_DIR: &str = "~/.cache/backlink";

// Seed files

/// Load candidate URLs, one per line. Blank lines and `#` comments are skipped.
pub fn load_seed_urls(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read links file {}", path.display()))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_seed_line)
        .collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }
    info!("Loaded {} candidate URLs from {}", urls.len(), path.display());
    Ok(urls)
}

/// Parse one seed line, assuming `https://` when the scheme is missing.
pub fn parse_seed_line(line: &str) -> Option<String> {
    let candidate = if line.contains("://") {
        line.to_string()
    } else {
        format!("https://{}", line)
    };

    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Some(candidate)
        }
        _ => {
            warn!("Skipping invalid URL '{}'", line);
            None
        }
    }
}

// Configuration

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    backlink: Option<CrawlConfig>,
}

/// Load a `[backlink]` table from a TOML file, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<CrawlConfig> {
    let Some(path) = path else {
        return Ok(CrawlConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    match file.backlink {
        Some(config) => {
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => {
            warn!("No [backlink] table in {}; using defaults", path.display());
            Ok(CrawlConfig::default())
        }
    }
}

/// Command-line settings layered over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_hops: Option<usize>,
    pub only_trusted_surfaces: bool,
    pub only_strong_links: bool,
    pub no_cache: bool,
    pub cache_dir: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: CrawlConfig) -> CrawlConfig {
        if let Some(max_hops) = self.max_hops {
            config.max_hops = max_hops;
        }
        if self.only_trusted_surfaces {
            config.only_trusted_surfaces = true;
        }
        if self.only_strong_links {
            config.only_strong_links = true;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(dir) = self.cache_dir {
            config.cache.directory = Some(dir);
        }
        config
    }
}

/// Cache directory from the configuration, falling back to [`DEFAULT_CACHE_DIR`].
pub fn cache_directory(config: &CrawlConfig) -> PathBuf {
    let raw = config
        .cache
        .directory
        .as_deref()
        .unwrap_or(DEFAULT_CACHE_DIR);
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

// Reports

/// Origin, the pages that link back to it directly, and pages reached through them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkGraphView {
    pub origin: String,
    pub direct: BTreeSet<String>,
    pub indirect: BTreeMap<String, BTreeSet<String>>,
}

pub fn link_graph_view(result: &BacklinkResult) -> LinkGraphView {
    let mut view = LinkGraphView {
        origin: result.origin_url.clone(),
        ..Default::default()
    };

    for record in result.positive_evidence() {
        if record.classification == Some(Classification::Indirect) {
            if let Some(pivot) = pivot_from_notes(&record.notes) {
                view.indirect
                    .entry(pivot.to_string())
                    .or_default()
                    .insert(record.source.url.clone());
            }
        } else {
            view.direct.insert(record.source.url.clone());
        }
    }
    view
}

/// The `pivot=` field of an indirect record's notes.
pub fn pivot_from_notes(notes: &str) -> Option<&str> {
    let (_, rest) = notes.split_once("pivot=")?;
    let pivot = rest.split_once(" chain=").map_or(rest, |(p, _)| p).trim();
    (!pivot.is_empty()).then_some(pivot)
}

pub fn exit_code(result: &BacklinkResult) -> i32 {
    if result.evidence.is_empty() && result.is_complete() {
        EXIT_NO_BACKLINKS
    } else {
        0
    }
}

pub fn render_header(out: &mut dyn Write, url: &str) -> std::io::Result<()> {
    writeln!(
        out,
        "{} {}...",
        "Verifying backlinks for:".bright_white().bold(),
        url
    )
}

pub fn render_score_line(out: &mut dyn Write, result: &BacklinkResult) -> std::io::Result<()> {
    let label = match result.label {
        ScoreLabel::High => result.label.as_str().green().bold(),
        ScoreLabel::Medium => result.label.as_str().yellow().bold(),
        ScoreLabel::Low => result.label.as_str().red().bold(),
    };
    writeln!(out)?;
    writeln!(out, "{} {} ({})", "Score:".bold(), result.score, label)
}

pub fn render_evidence(out: &mut dyn Write, result: &BacklinkResult) -> std::io::Result<()> {
    if result.evidence.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{}", "--- Evidence Found ---".bright_blue().bold())?;
    for record in &result.evidence {
        let tag = record
            .classification
            .map(|c| c.as_str())
            .unwrap_or(record.kind.as_str())
            .to_uppercase();
        let tag = format!("{:<8}", tag);
        let tag = match record.classification {
            Some(Classification::Strong) => tag.green(),
            Some(Classification::Weak) => tag.cyan(),
            Some(Classification::Indirect) => tag.yellow(),
            Some(Classification::Excluded) => tag.red(),
            None => tag.bright_black(),
        };
        writeln!(
            out,
            "- [{}] on: {} (hop {})",
            tag, record.source.url, record.hops
        )?;
    }
    Ok(())
}

pub fn render_link_graph(out: &mut dyn Write, view: &LinkGraphView) -> std::io::Result<()> {
    if view.direct.is_empty() && view.indirect.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{}", "--- Link Graph ---".bright_blue().bold())?;
    writeln!(out, "{}", view.origin.bright_white())?;

    let pivots: BTreeSet<&String> = view.direct.iter().chain(view.indirect.keys()).collect();
    for pivot in pivots {
        let marker = if view.direct.contains(pivot) {
            "[direct]".green()
        } else {
            "[anchor]".bright_black()
        };
        writeln!(out, "├─ {}  {}", pivot, marker)?;
        for neighbour in view.indirect.get(pivot).into_iter().flatten() {
            writeln!(
                out,
                "│  └─ {}  {}",
                neighbour,
                format!("[indirect via {}]", pivot).yellow()
            )?;
        }
    }
    Ok(())
}

pub fn render_errors(out: &mut dyn Write, errors: &[RunError]) -> std::io::Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{}", "--- Errors Encountered ---".red().bold())?;
    for error in errors {
        writeln!(out, "- {}", error)?;
    }
    Ok(())
}

/// The full `verify` report.
pub fn render_report(out: &mut dyn Write, result: &BacklinkResult) -> std::io::Result<()> {
    render_score_line(out, result)?;
    render_evidence(out, result)?;
    render_link_graph(out, &link_graph_view(result))?;
    render_errors(out, &result.errors)
}

pub fn render_cache_stats(
    out: &mut dyn Write,
    stats: &CacheStats,
    location: &Path,
) -> std::io::Result<()> {
    writeln!(out, "{}", "Response cache".bright_white().bold())?;
    writeln!(out, "  {} {}", "Location:".bold(), location.display())?;
    writeln!(out, "  {} {}", "Entries:".bold(), stats.entries)?;
    writeln!(out, "  {} {}", "Expired:".bold(), stats.expired)?;
    writeln!(out, "  {} {} bytes", "Size:".bold(), stats.bytes)
}

/// Write the whole result as pretty JSON, creating parent directories as needed.
pub fn write_json_report(path: &Path, result: &BacklinkResult) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
