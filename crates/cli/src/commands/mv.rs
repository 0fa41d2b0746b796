//! move command - Copy objects then delete the copied sources

use anyhow::Context as _;
use clap::Args;
use s3tk_core::{MoveOptions, MoveReport, move_objects};

use super::sync::{copy_failure_rows, delete_failure_rows};
use super::{Context, fail, observer, resolve_uri};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Copy objects then delete the copied sources
#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Source URI (s3://bucket/prefix)
    #[arg(long)]
    pub src: Option<String>,

    /// Destination URI (s3://bucket/prefix)
    #[arg(long)]
    pub dst: Option<String>,

    /// Only move keys ending with this suffix
    #[arg(long)]
    pub suffix: Option<String>,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel copies
    #[arg(short = 'P', long)]
    pub max_workers: Option<usize>,

    /// Keys per batch-delete request (at most 1000)
    #[arg(long)]
    pub delete_batch_size: Option<usize>,
}

impl MoveArgs {
    fn apply(&self, mut options: MoveOptions) -> MoveOptions {
        if let Some(suffix) = &self.suffix {
            options.suffix = suffix.clone();
        }
        options.dry_run |= self.dry_run;
        if let Some(workers) = self.max_workers {
            options.max_workers = workers;
        }
        if let Some(batch) = self.delete_batch_size {
            options.delete_batch_size = batch;
        }
        options
    }
}

/// Execute the move command
pub async fn execute(args: MoveArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    match run(&args, ctx).await {
        Ok(report) => {
            render(&formatter, &report);
            ExitCode::from_outcome(report.has_errors())
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &MoveArgs, ctx: &Context) -> anyhow::Result<MoveReport> {
    let section = &ctx.config.relocate;
    let source = resolve_uri(args.src.as_deref(), section.src.as_deref(), "src")?;
    let destination = resolve_uri(args.dst.as_deref(), section.dst.as_deref(), "dst")?;
    let options = args.apply(section.options.clone());

    let client = ctx.client().await?;
    let progress = ctx.progress();
    move_objects(&client, &source, &destination, &options, observer(&progress))
        .await
        .with_context(|| format!("move {source} -> {destination} failed"))
}

fn render(formatter: &Formatter, report: &MoveReport) {
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
    if !stats.suffix.is_empty() {
        formatter.field("Suffix", &stats.suffix);
    }
    formatter.field("Matched", stats.total);
    formatter.field("Moved", report.moved.len());
    formatter.field("Sources deleted", report.deleted_source.len());

    formatter.failures("Copy failures", ["Object", "Error"], copy_failure_rows(&report.errors_copy));
    formatter.failures(
        "Delete failures (copied, source kept)",
        ["Key", "Error"],
        delete_failure_rows(&report.errors_delete),
    );

    if stats.dry_run {
        formatter.warning("Dry run: no objects were copied or deleted");
    } else if !report.has_errors() {
        formatter.success("Move complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_flag_overrides_config() {
        let args = MoveArgs {
            src: None,
            dst: None,
            suffix: Some(".png".into()),
            dry_run: true,
            max_workers: None,
            delete_batch_size: Some(100),
        };
        let configured = MoveOptions {
            suffix: ".jpg".into(),
            max_workers: 3,
            ..Default::default()
        };

        let options = args.apply(configured);
        assert_eq!(options.suffix, ".png");
        assert!(options.dry_run);
        assert_eq!(options.max_workers, 3);
        assert_eq!(options.delete_batch_size, 100);
    }
}
