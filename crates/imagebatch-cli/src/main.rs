mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use imagebatch_contracts::events::EventWriter;
use imagebatch_contracts::records::{write_summary, GenerationRecordStore, RunSummary};
use imagebatch_contracts::sizes::SizeResolver;
use imagebatch_contracts::styles::{is_known_style, RECRAFT_STYLES};
use imagebatch_engine::items::{HERO_PROMPT, HERO_SIZE};
use imagebatch_engine::{
    default_provider_registry, load_manifest, marketing_manifest, BatchRunner, GenerationItem,
    ItemOutcome, ItemReport, StyleSweep,
};
use serde_json::{json, Map};
use uuid::Uuid;

use crate::config::{sibling_path, EnvSource};

#[derive(Debug, Parser)]
#[command(name = "imagebatch", version, about = "Resumable batch image generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the landing page image set (or a JSON manifest).
    Run(RunArgs),
    /// Render one prompt in every style for side-by-side comparison.
    Styles(StylesArgs),
    /// Print the stored outcome of every item in a record.
    Status(StatusArgs),
    /// Print the size catalog, or resolve a target size against it.
    Sizes(SizesArgs),
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long, default_value = "replicate")]
    provider: String,
    #[arg(long, default_value = ".env.local")]
    env_file: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    manifest: Option<PathBuf>,
    #[arg(long, default_value = "./public/imgs")]
    out_dir: PathBuf,
    #[arg(long, default_value = "./saas_generation_record.json")]
    record: PathBuf,
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct StylesArgs {
    #[arg(long, default_value = HERO_PROMPT)]
    prompt: String,
    #[arg(long, default_value = HERO_SIZE)]
    size: String,
    #[arg(long, default_value = "hero")]
    prefix: String,
    /// Restrict the sweep to these styles (repeatable). Defaults to all.
    #[arg(long = "style")]
    styles: Vec<String>,
    #[arg(long, default_value = "./public/imgs/styles")]
    styles_dir: PathBuf,
    #[arg(long, default_value = "./styles_test_record.json")]
    record: PathBuf,
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    #[arg(long, default_value = "./saas_generation_record.json")]
    record: PathBuf,
}

#[derive(Debug, Parser)]
struct SizesArgs {
    #[arg(long)]
    target: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagebatch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_batch_native(args),
        Command::Styles(args) => run_styles_native(args),
        Command::Status(args) => run_status(args),
        Command::Sizes(args) => run_sizes(args),
    }
}

fn run_batch_native(args: RunArgs) -> Result<i32> {
    let items = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => marketing_manifest(&args.out_dir)?,
    };
    println!("Generating {} marketing images...", items.len());
    execute_batch(
        &items,
        &args.record,
        Duration::from_millis(args.delay_ms),
        &args.provider,
    )
}

fn run_styles_native(args: StylesArgs) -> Result<i32> {
    let styles: Vec<String> = if args.styles.is_empty() {
        RECRAFT_STYLES.iter().map(|style| style.to_string()).collect()
    } else {
        args.styles.clone()
    };
    for style in &styles {
        if !is_known_style(style) {
            eprintln!("warning: '{style}' is not a known Recraft style; sending it anyway");
        }
    }
    let sweep = StyleSweep {
        prefix: args.prefix.clone(),
        prompt: args.prompt.clone(),
        size: args.size.clone(),
        out_dir: args.styles_dir.clone(),
    };
    let items = sweep.items(styles.as_slice())?;
    println!("Testing {} styles...", items.len());
    let code = execute_batch(
        &items,
        &args.record,
        Duration::from_millis(args.delay_ms),
        &args.provider,
    )?;
    println!("Images saved in: {}", args.styles_dir.display());
    Ok(code)
}

fn execute_batch(
    items: &[GenerationItem],
    record_path: &Path,
    delay: Duration,
    provider_args: &ProviderArgs,
) -> Result<i32> {
    let env = EnvSource::load(Some(provider_args.env_file.as_path()));
    let replicate = env.replicate_config();
    if provider_args.provider == "replicate" && !replicate.has_token() {
        eprintln!("warning: REPLICATE_API_TOKEN is not set; every attempt will fail");
    }
    let registry = default_provider_registry(replicate);
    let Some(provider) = registry.get(&provider_args.provider) else {
        bail!(
            "unknown provider '{}' (available: {})",
            provider_args.provider,
            registry.names().join(", ")
        );
    };

    let events_path = provider_args
        .events
        .clone()
        .unwrap_or_else(|| sibling_path(record_path, "events.jsonl"));
    let summary_path = provider_args
        .summary
        .clone()
        .unwrap_or_else(|| sibling_path(record_path, "summary.json"));
    let batch_id = Uuid::new_v4().to_string();

    let runner = BatchRunner::new(provider, GenerationRecordStore::new(record_path))
        .with_events(EventWriter::new(&events_path, batch_id))
        .with_delay(delay);
    let summary = runner
        .run_with(items, print_item_report)
        .with_context(|| format!("batch aborted (record {})", record_path.display()))?;

    let mut extra = Map::new();
    extra.insert("provider".to_string(), json!(provider.name()));
    extra.insert(
        "record_path".to_string(),
        json!(record_path.to_string_lossy()),
    );
    write_summary(&summary_path, &summary, Some(&extra))?;
    print_summary(&summary);
    Ok(if summary.has_failures() { 2 } else { 0 })
}

fn print_item_report(report: &ItemReport<'_>) {
    let item = report.item;
    let position = format!("[{}/{}]", report.index + 1, report.total);
    let destination = item.destination.display();
    match report.outcome {
        ItemOutcome::Skipped => {
            println!("{position} skip {destination} (already generated)");
        }
        ItemOutcome::Succeeded { size, bytes } => {
            println!(
                "{position} ✓ {destination} ({} -> {size}, style {}, {bytes} bytes)",
                item.requested_size(),
                item.style
            );
        }
        ItemOutcome::Failed { message, .. } => {
            println!(
                "{position} × {destination} [{}] style {}: {message}",
                item.identifier, item.style
            );
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Done.");
    println!("Total:     {}", summary.total);
    println!("Succeeded: {}", summary.succeeded);
    println!("Skipped:   {}", summary.skipped);
    println!("Failed:    {}", summary.failed);
}

fn run_status(args: StatusArgs) -> Result<i32> {
    let record = GenerationRecordStore::new(&args.record).load()?;
    if record.is_empty() {
        println!("No generation record at {}", args.record.display());
        return Ok(0);
    }
    for (identifier, entry) in &record {
        let style = entry.style.as_deref().unwrap_or("-");
        match entry.error.as_deref() {
            Some(error) => println!(
                "{identifier}\t{}\t{style}\t{}\t{error}",
                entry.status, entry.last_attempt
            ),
            None => println!(
                "{identifier}\t{}\t{style}\t{}",
                entry.status, entry.last_attempt
            ),
        }
    }
    let succeeded = record.values().filter(|entry| entry.is_success()).count();
    println!(
        "{succeeded}/{} succeeded, {} pending retry",
        record.len(),
        record.len() - succeeded
    );
    Ok(0)
}

fn run_sizes(args: SizesArgs) -> Result<i32> {
    let resolver = SizeResolver::default();
    let Some(target) = args.target else {
        for size in resolver.catalog.sizes() {
            println!("{size}\t{:.3}", size.ratio());
        }
        return Ok(0);
    };
    let resolution = resolver.resolve_size_text(&target)?;
    if resolution.exact {
        println!("{} is supported as-is", resolution.size);
    } else {
        println!(
            "{} -> {} (ratio delta {:.3})",
            resolution.requested_text(),
            resolution.size,
            resolution.ratio_delta
        );
    }
    Ok(0)
}
