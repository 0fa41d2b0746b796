//! download command - Download objects to a local directory

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use s3tk_core::{DownloadOptions, DownloadReport, SkipIf, download_by_mask};

use super::{Context, fail, observer, resolve_uri};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

const DEFAULT_TARGET: &str = "./downloads";

/// Download objects to a local directory
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Source URI (s3://bucket/prefix)
    #[arg(long)]
    pub src: Option<String>,

    /// Local target directory (default: ./downloads)
    #[arg(long)]
    pub dst: Option<PathBuf>,

    /// Only download keys ending with this suffix
    #[arg(long)]
    pub suffix: Option<String>,

    /// Write every file directly into the target directory
    #[arg(long)]
    pub flatten: bool,

    /// Replace existing local files
    #[arg(long)]
    pub overwrite: bool,

    /// Keep an existing file when it matches: none or size
    #[arg(long)]
    pub skip_if: Option<SkipIf>,

    /// Only download relative keys matching these globs (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Skip relative keys matching these globs (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Set local modification times to the objects' last-modified times
    #[arg(long)]
    pub preserve_mtime: bool,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel downloads
    #[arg(short = 'P', long)]
    pub max_workers: Option<usize>,
}

impl DownloadArgs {
    fn apply(&self, mut options: DownloadOptions) -> DownloadOptions {
        if let Some(suffix) = &self.suffix {
            options.suffix = suffix.clone();
        }
        if self.flatten {
            options.keep_structure = false;
        }
        options.overwrite |= self.overwrite;
        if let Some(skip_if) = self.skip_if {
            options.skip_if = skip_if;
        }
        if !self.include.is_empty() {
            options.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude = self.exclude.clone();
        }
        options.preserve_mtime |= self.preserve_mtime;
        options.dry_run |= self.dry_run;
        if let Some(workers) = self.max_workers {
            options.max_workers = workers;
        }
        options
    }
}

/// Execute the download command
pub async fn execute(args: DownloadArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    match run(&args, ctx).await {
        Ok(report) => {
            render(&formatter, &report);
            ExitCode::from_outcome(report.has_errors())
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &DownloadArgs, ctx: &Context) -> anyhow::Result<DownloadReport> {
    let section = &ctx.config.download;
    let source = resolve_uri(args.src.as_deref(), section.src.as_deref(), "src")?;
    let target = args
        .dst
        .clone()
        .or_else(|| section.dst.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET));
    let options = args.apply(section.options.clone());

    let client = ctx.client().await?;
    let progress = ctx.progress();
    download_by_mask(&client, &source, &target, &options, observer(&progress))
        .await
        .with_context(|| format!("download {source} -> {} failed", target.display()))
}

fn render(formatter: &Formatter, report: &DownloadReport) {
    if formatter.is_json() {
        formatter.json(report);
        return;
    }

    let stats = &report.stats;
    formatter.field(
        "Source",
        formatter.style_name(&format!("s3://{}/{}", stats.bucket, stats.prefix)),
    );
    formatter.field("Target", formatter.style_name(&stats.dst_root.display().to_string()));
    formatter.field("Matched", stats.total);
    formatter.field(
        "Downloaded",
        format!("{} ({})", report.downloaded.len(), formatter.style_size(stats.bytes)),
    );
    formatter.field("Skipped", report.skipped.len());

    let rows = report
        .errors
        .iter()
        .map(|e| match e.split_once(": ") {
            Some((key, reason)) => [key.to_string(), reason.to_string()],
            None => [String::new(), e.clone()],
        })
        .collect();
    formatter.failures("Download failures", ["Key", "Error"], rows);

    if stats.dry_run {
        formatter.warning("Dry run: no files were written");
    } else if !report.has_errors() {
        formatter.success("Download complete");
    }
}
