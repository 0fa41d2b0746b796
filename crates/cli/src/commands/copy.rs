//! copy command - Copy objects by suffix, or whole folders

use std::collections::BTreeMap;

use anyhow::Context as _;
use clap::Args;
use s3tk_core::{
    MaskCopyOptions, MaskCopyReport, PrefixCopyReport, SplitOptions, copy_by_mask, copy_prefixes,
};

use super::sync::copy_failure_rows;
use super::{Context, fail, observer, resolve_uri};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Copy objects by suffix, or whole folders
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source URI (s3://bucket/prefix)
    #[arg(long)]
    pub src: Option<String>,

    /// Destination URI (s3://bucket/prefix)
    #[arg(long)]
    pub dst: Option<String>,

    /// Only copy keys ending with this suffix
    #[arg(long, conflicts_with = "folders")]
    pub suffix: Option<String>,

    /// Copy these folders below the source instead (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub folders: Vec<String>,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel copies
    #[arg(short = 'P', long)]
    pub max_workers: Option<usize>,
}

impl CopyArgs {
    fn apply(&self, mut options: MaskCopyOptions) -> MaskCopyOptions {
        if let Some(suffix) = &self.suffix {
            options.suffix = suffix.clone();
        }
        options.dry_run |= self.dry_run;
        if let Some(workers) = self.max_workers {
            options.max_workers = workers;
        }
        options
    }
}

/// Execute the copy command
pub async fn execute(args: CopyArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    if args.folders.is_empty() {
        match run_mask(&args, ctx).await {
            Ok(report) => {
                render_mask(&formatter, &report);
                ExitCode::from_outcome(report.has_errors())
            }
            Err(e) => fail(&formatter, e),
        }
    } else {
        match run_folders(&args, ctx).await {
            Ok(summary) => {
                let has_errors = summary.values().any(|folder| folder.error_count() > 0);
                render_folders(&formatter, &summary);
                ExitCode::from_outcome(has_errors)
            }
            Err(e) => fail(&formatter, e),
        }
    }
}

async fn run_mask(args: &CopyArgs, ctx: &Context) -> anyhow::Result<MaskCopyReport> {
    let section = &ctx.config.copy;
    let source = resolve_uri(args.src.as_deref(), section.src.as_deref(), "src")?;
    let destination = resolve_uri(args.dst.as_deref(), section.dst.as_deref(), "dst")?;
    let options = args.apply(section.options.clone());

    let client = ctx.client().await?;
    let progress = ctx.progress();
    copy_by_mask(&client, &source, &destination, &options, observer(&progress))
        .await
        .with_context(|| format!("copy {source} -> {destination} failed"))
}

async fn run_folders(
    args: &CopyArgs,
    ctx: &Context,
) -> anyhow::Result<BTreeMap<String, PrefixCopyReport>> {
    let section = &ctx.config.copy;
    let source = resolve_uri(args.src.as_deref(), section.src.as_deref(), "src")?;
    let destination = resolve_uri(args.dst.as_deref(), section.dst.as_deref(), "dst")?;
    let mask = args.apply(section.options.clone());
    let options = SplitOptions {
        max_workers: mask.max_workers,
        dry_run: mask.dry_run,
    };

    let client = ctx.client().await?;
    let progress = ctx.progress();
    copy_prefixes(
        &client,
        &source,
        &destination,
        &args.folders,
        &options,
        observer(&progress),
    )
    .await
    .with_context(|| format!("copy folders {source} -> {destination} failed"))
}

fn render_mask(formatter: &Formatter, report: &MaskCopyReport) {
    if formatter.is_json() {
        formatter.json(report);
        return;
    }

    let stats = &report.stats;
    formatter.field(
        "Source",
        formatter.style_name(&format!("s3://{}/{}", stats.source_bucket, stats.prefix)),
    );
    formatter.field(
        "Destination",
        formatter.style_name(&format!("s3://{}/{}", stats.target_bucket, stats.prefix_dst)),
    );
    formatter.field("Matched", stats.total);
    formatter.field("Copied", report.copied.len());
    formatter.failures("Copy failures", ["Object", "Error"], copy_failure_rows(&report.errors));

    if stats.dry_run {
        formatter.warning("Dry run: no objects were copied");
    } else if !report.has_errors() {
        formatter.success("Copy complete");
    }
}

/// Render a per-folder summary; shared with the split command
pub(crate) fn render_folders(formatter: &Formatter, summary: &BTreeMap<String, PrefixCopyReport>) {
    if formatter.is_json() {
        formatter.json(summary);
        return;
    }

    for (folder, report) in summary {
        formatter.field(folder, format!("{} copied, {} errors", report.copied_count(), report.error_count()));
    }
    let rows = summary
        .iter()
        .flat_map(|(folder, report)| report.errors.iter().map(move |e| [folder.clone(), e.clone()]))
        .collect();
    formatter.failures("Folder failures", ["Folder", "Error"], rows);
}
