//! Command implementations
//!
//! Each subcommand lives in its own module with an `Args` struct and an
//! `execute` function returning the process exit code.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Subcommand};
use s3tk_core::{BucketPath, Config, ConfigManager, Error, ProgressObserver, parse_s3_uri};
use s3tk_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressReporter};

pub mod completions;
pub mod copy;
pub mod download;
pub mod mv;
pub mod split;
pub mod sync;

/// Options accepted by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: <config dir>/s3tk/config.toml)
    #[arg(long, global = true, env = "S3TK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Named AWS profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Endpoint URL of an S3-compatible service
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, global = true)]
    pub path_style: bool,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make a destination prefix mirror a source prefix
    Sync(sync::SyncArgs),

    /// Copy objects then delete the copied sources
    #[command(name = "move")]
    Move(mv::MoveArgs),

    /// Copy objects by suffix, or whole folders
    Copy(copy::CopyArgs),

    /// Split folders into common and add-on sets against a reference root
    Split(split::SplitArgs),

    /// Download objects to a local directory
    Download(download::DownloadArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Dispatch a parsed command
pub async fn execute(command: Commands, global: GlobalArgs) -> ExitCode {
    if let Commands::Completions(args) = command {
        return completions::execute(args);
    }

    let formatter = Formatter::new(global.output_config());
    let ctx = match Context::load(global) {
        Ok(ctx) => ctx,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return exit_code_for(&e);
        }
    };

    match command {
        Commands::Sync(args) => sync::execute(args, &ctx).await,
        Commands::Move(args) => mv::execute(args, &ctx).await,
        Commands::Copy(args) => copy::execute(args, &ctx).await,
        Commands::Split(args) => split::execute(args, &ctx).await,
        Commands::Download(args) => download::execute(args, &ctx).await,
        Commands::Completions(_) => ExitCode::Success,
    }
}

/// Loaded configuration plus global flags, shared by the commands
pub struct Context {
    pub config: Config,
    pub global: GlobalArgs,
}

impl Context {
    /// Load the config file and apply global flag overrides
    pub fn load(global: GlobalArgs) -> anyhow::Result<Self> {
        let manager = match &global.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new()?,
        };
        let mut config = manager
            .load()
            .with_context(|| format!("failed to load {}", manager.path().display()))?;

        let client = &mut config.client;
        if global.profile.is_some() {
            client.profile = global.profile.clone();
        }
        if global.region.is_some() {
            client.region = global.region.clone();
        }
        if global.endpoint.is_some() {
            client.endpoint = global.endpoint.clone();
        }
        client.force_path_style |= global.path_style;

        Ok(Self { config, global })
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.global.output_config())
    }

    pub async fn client(&self) -> anyhow::Result<S3Client> {
        S3Client::new(&self.config.client)
            .await
            .context("failed to create S3 client")
    }

    /// Progress bars, unless output is JSON or quiet
    pub fn progress(&self) -> Option<ProgressReporter> {
        self.global
            .output_config()
            .progress_enabled()
            .then(ProgressReporter::new)
    }
}

/// View a reporter as the engine's observer handle
pub fn observer(reporter: &Option<ProgressReporter>) -> Option<&dyn ProgressObserver> {
    reporter.as_ref().map(|r| r as &dyn ProgressObserver)
}

/// Resolve an S3 URI: command-line flag first, then the config file
pub fn resolve_uri(flag: Option<&str>, configured: Option<&str>, name: &str) -> Result<BucketPath, Error> {
    let uri = flag
        .or(configured)
        .ok_or_else(|| Error::Config(format!("missing {name}: pass --{name} or set it in the config file")))?;
    parse_s3_uri(uri)
}

/// Exit code for an error surfaced through anyhow
pub fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(ExitCode::from_error)
        .unwrap_or(ExitCode::GeneralError)
}

/// Report a fatal error and convert it to an exit code
pub fn fail(formatter: &Formatter, error: anyhow::Error) -> ExitCode {
    formatter.error(&format!("{error:#}"));
    exit_code_for(&error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uri_precedence() {
        let uri = resolve_uri(Some("s3://flag/a/"), Some("s3://config/b/"), "src").unwrap();
        assert_eq!(uri.bucket, "flag");

        let uri = resolve_uri(None, Some("s3://config/b/"), "src").unwrap();
        assert_eq!(uri, BucketPath::new("config", "b/"));

        assert!(matches!(resolve_uri(None, None, "dst"), Err(Error::Config(_))));
    }

    #[test]
    fn test_exit_code_through_context() {
        let err = anyhow::Error::new(Error::NotFound("s3://b/k".into())).context("listing source");
        assert_eq!(exit_code_for(&err), ExitCode::NotFound);

        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), ExitCode::GeneralError);
    }

    #[test]
    fn test_context_applies_global_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nregion = \"eu-west-1\"\nendpoint = \"http://a\"\n").unwrap();

        let global = GlobalArgs {
            config: Some(path),
            endpoint: Some("http://b".into()),
            ..Default::default()
        };
        let ctx = Context::load(global).unwrap();
        assert_eq!(ctx.config.client.region.as_deref(), Some("eu-west-1"));
        assert_eq!(ctx.config.client.endpoint.as_deref(), Some("http://b"));
    }

    #[test]
    fn test_invalid_config_is_usage_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nmax_workers = 0\n").unwrap();

        let global = GlobalArgs {
            config: Some(path),
            ..Default::default()
        };
        let err = Context::load(global).err().unwrap();
        assert_eq!(exit_code_for(&err), ExitCode::UsageError);
    }
}
