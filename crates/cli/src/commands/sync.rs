//! sync command - Make a destination prefix mirror a source prefix

use anyhow::Context as _;
use clap::Args;
use s3tk_core::{ComparisonMode, CopyFailure, DeleteFailure, SyncOptions, SyncReport};

use super::{Context, fail, observer, resolve_uri};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Make a destination prefix mirror a source prefix
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source URI (s3://bucket/prefix)
    #[arg(long)]
    pub src: Option<String>,

    /// Destination URI (s3://bucket/prefix)
    #[arg(long)]
    pub dst: Option<String>,

    /// How objects present on both sides are compared: name, etag or size
    #[arg(long)]
    pub compare: Option<ComparisonMode>,

    /// Delete destination objects that do not exist at the source
    #[arg(long)]
    pub delete_extra: bool,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel requests
    #[arg(short = 'P', long)]
    pub max_workers: Option<usize>,

    /// Keys per batch-delete request (at most 1000)
    #[arg(long)]
    pub delete_batch_size: Option<usize>,

    /// Only consider relative keys matching these globs (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Ignore relative keys matching these globs (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
}

impl SyncArgs {
    /// Overlay command-line flags on the configured options
    fn apply(&self, mut options: SyncOptions) -> SyncOptions {
        if let Some(mode) = self.compare {
            options.compare_mode = mode;
        }
        options.delete_extra |= self.delete_extra;
        options.dry_run |= self.dry_run;
        if let Some(workers) = self.max_workers {
            options.max_workers = workers;
        }
        if let Some(batch) = self.delete_batch_size {
            options.delete_batch_size = batch;
        }
        if !self.include.is_empty() {
            options.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude = self.exclude.clone();
        }
        options
    }
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    match run(&args, ctx).await {
        Ok(report) => {
            render(&formatter, &report);
            ExitCode::from_outcome(report.has_errors())
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &SyncArgs, ctx: &Context) -> anyhow::Result<SyncReport> {
    let section = &ctx.config.sync;
    let source = resolve_uri(args.src.as_deref(), section.src.as_deref(), "src")?;
    let destination = resolve_uri(args.dst.as_deref(), section.dst.as_deref(), "dst")?;
    let options = args.apply(section.options.clone());

    let client = ctx.client().await?;
    let progress = ctx.progress();
    s3tk_core::sync(&client, &source, &destination, &options, observer(&progress))
        .await
        .with_context(|| format!("sync {source} -> {destination} failed"))
}

pub(crate) fn copy_failure_rows(errors: &[CopyFailure]) -> Vec<[String; 2]> {
    errors
        .iter()
        .map(|e| [format!("{} -> {}", e.source_key, e.destination_key), e.message.clone()])
        .collect()
}

pub(crate) fn delete_failure_rows(errors: &[DeleteFailure]) -> Vec<[String; 2]> {
    errors
        .iter()
        .map(|e| {
            let reason = match &e.code {
                Some(code) => format!("{code} {}", e.message),
                None => e.message.clone(),
            };
            [e.key.clone(), reason]
        })
        .collect()
}

fn render(formatter: &Formatter, report: &SyncReport) {
    if formatter.is_json() {
        formatter.json(report);
        return;
    }

    let stats = &report.stats;
    formatter.field(
        "Source",
        formatter.style_name(&format!("s3://{}/{}", stats.source_bucket, stats.prefix_src)),
    );
    formatter.field(
        "Destination",
        formatter.style_name(&format!("s3://{}/{}", stats.target_bucket, stats.prefix_dst)),
    );
    formatter.field("Compare", stats.compare_mode);
    formatter.field("Listed", format!("{} source, {} destination", stats.total_src, stats.total_dst));
    formatter.field("Copied", report.copied.len());
    formatter.field("Deleted", report.deleted.len());
    formatter.field("Unchanged", stats.unchanged);

    formatter.failures("Copy failures", ["Object", "Error"], copy_failure_rows(&report.errors_copy));
    formatter.failures("Delete failures", ["Key", "Error"], delete_failure_rows(&report.errors_delete));

    if stats.dry_run {
        formatter.warning("Dry run: no objects were copied or deleted");
    } else if !report.has_errors() {
        formatter.success("Sync complete");
    }
}
