//! split command - Copy folders into common and add-on sets
//!
//! Folders under the source root that also exist under the reference root
//! go below the common root; the rest go below the add-on root.

use anyhow::Context as _;
use clap::Args;
use s3tk_core::{Error, SplitOptions, SplitReport, SplitRoots, copy_common_and_addon};

use super::copy::render_folders;
use super::{Context, fail, observer};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Split folders into common and add-on sets against a reference root
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Bucket holding all four roots
    #[arg(long)]
    pub bucket: Option<String>,

    /// Root whose folders are copied
    #[arg(long)]
    pub src_root: Option<String>,

    /// Root whose folder names decide common vs add-on
    #[arg(long)]
    pub ref_root: Option<String>,

    /// Destination root for folders present in both
    #[arg(long)]
    pub common_dst: Option<String>,

    /// Destination root for folders only under the source root
    #[arg(long)]
    pub addon_dst: Option<String>,

    /// Show what would be done without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel copies
    #[arg(short = 'P', long)]
    pub max_workers: Option<usize>,
}

fn required(flag: &Option<String>, configured: &Option<String>, name: &str) -> Result<String, Error> {
    flag.clone()
        .or_else(|| configured.clone())
        .ok_or_else(|| Error::Config(format!("missing {name}: pass --{name} or set it in [split]")))
}

impl SplitArgs {
    fn roots(&self, ctx: &Context) -> Result<SplitRoots, Error> {
        let section = &ctx.config.split;
        Ok(SplitRoots {
            bucket: required(&self.bucket, &section.bucket, "bucket")?,
            src_root: required(&self.src_root, &section.src_root, "src-root")?,
            ref_root: required(&self.ref_root, &section.ref_root, "ref-root")?,
            common_dst_root: required(&self.common_dst, &section.common_dst_root, "common-dst")?,
            addon_dst_root: required(&self.addon_dst, &section.addon_dst_root, "addon-dst")?,
        })
    }

    fn apply(&self, mut options: SplitOptions) -> SplitOptions {
        options.dry_run |= self.dry_run;
        if let Some(workers) = self.max_workers {
            options.max_workers = workers;
        }
        options
    }
}

/// Execute the split command
pub async fn execute(args: SplitArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    match run(&args, ctx).await {
        Ok(report) => {
            render(&formatter, &report);
            ExitCode::from_outcome(report.has_errors())
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &SplitArgs, ctx: &Context) -> anyhow::Result<SplitReport> {
    let roots = args.roots(ctx)?;
    let options = args.apply(ctx.config.split.options.clone());

    let client = ctx.client().await?;
    let progress = ctx.progress();
    copy_common_and_addon(&client, &roots, &options, observer(&progress))
        .await
        .with_context(|| format!("split of s3://{}/{} failed", roots.bucket, roots.src_root))
}

fn render(formatter: &Formatter, report: &SplitReport) {
    if formatter.is_json() {
        formatter.json(report);
        return;
    }

    formatter.field("Common folders", report.common_count);
    render_folders(formatter, &report.common);
    formatter.field("Add-on folders", report.addon_count);
    render_folders(formatter, &report.addon);

    if report.dry_run {
        formatter.warning("Dry run: no objects were copied");
    } else if !report.has_errors() {
        formatter.success("Split complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_prefers_flag() {
        let value = required(&Some("flag".into()), &Some("config".into()), "bucket").unwrap();
        assert_eq!(value, "flag");
        let value = required(&None, &Some("config".into()), "bucket").unwrap();
        assert_eq!(value, "config");
        assert!(matches!(required(&None, &None, "bucket"), Err(Error::Config(_))));
    }
}
