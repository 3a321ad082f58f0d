//! scoreline - print the timeline geometry of a MusicXML or YAML score
//!
//! ```text
//! scoreline score.musicxml --ensemble orchestra --slice-range 5-9 --connections
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use scoreline::{
    timeline_from_musicxml, timeline_from_yaml, Advisory, PipelineConfig, SliceRange,
    TimelineUnit,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Parser)]
#[command(name = "scoreline")]
#[command(about = "Turn a score into render-ready timeline geometry")]
#[command(version)]
struct Cli {
    /// MusicXML file, or a .yaml/.yml serialized score
    input: PathBuf,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML pipeline configuration; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// auto, orchestra, bigband or ungrouped
    #[arg(short, long)]
    ensemble: Option<String>,

    /// Sounding fraction of staccato notes (0.1-0.9)
    #[arg(long)]
    staccato_factor: Option<f64>,

    /// Draw each note as one segment instead of splitting overlaps
    #[arg(long)]
    no_split_overlaps: bool,

    /// Unit for slice ranges and ticks: bar or beat
    #[arg(long)]
    timeline_unit: Option<String>,

    /// 1-indexed, end-exclusive range, e.g. 2-4
    #[arg(long)]
    slice_range: Option<String>,

    /// Build connection lines between melodic steps
    #[arg(long)]
    connections: bool,

    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config '{}'", path.display()))?;
            PipelineConfig::from_yaml(&content)
                .with_context(|| format!("loading config '{}'", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(ensemble) = &cli.ensemble {
        config.ensemble = ensemble.parse()?;
    }
    if let Some(factor) = cli.staccato_factor {
        config.staccato_factor = factor;
    }
    if cli.no_split_overlaps {
        config.split_overlaps = false;
    }
    if let Some(unit) = &cli.timeline_unit {
        config.timeline_unit = unit.parse::<TimelineUnit>()?;
    }
    if let Some(range) = &cli.slice_range {
        config.slice = Some(range.parse::<SliceRange>()?);
    }
    if cli.connections {
        config.show_connections = true;
    }
    config.validate()?;
    Ok(config)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let timeline = if is_yaml(&cli.input) {
        let content = fs::read_to_string(&cli.input)
            .with_context(|| format!("reading '{}'", cli.input.display()))?;
        timeline_from_yaml(&content, &config)
    } else {
        let bytes = fs::read(&cli.input).with_context(|| format!("reading '{}'", cli.input.display()))?;
        timeline_from_musicxml(&bytes, &config)
    }
    .with_context(|| format!("building timeline for '{}'", cli.input.display()))?;

    for advisory in &timeline.advisories {
        if matches!(advisory, Advisory::EnsembleSuggestion { .. }) {
            eprintln!("{}", advisory);
        }
    }

    let rendered = match cli.format {
        Format::Json => serde_json::to_string_pretty(&timeline)?,
        Format::Yaml => serde_yaml::to_string(&timeline)?,
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("writing '{}'", path.display()))?;
            eprintln!("Wrote timeline to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
