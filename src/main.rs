//! Mergetail command-line entry point.
//!
//! Reads command lines from stdin (or a `mergetail.toml`), runs them all at once and
//! prints their combined, prefixed output to stdout. Diagnostics go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use thiserror::Error;
use tracing::Level;

use mergetail::config::{self, Config, DEFAULT_CONFIG_FILE};
use mergetail::input::{self, InputError, InputMode, DEFAULT_PLACEHOLDER};
use mergetail::output::DEFAULT_MAX_LINE_BYTES;
use mergetail::{merge_tail, CommandSpec, MergeError, MergeOptions, TracingObserver};

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "mergetail",
    version,
    about = "Run commands read from stdin and merge their output with colored prefixes",
    long_about = "Run commands read from stdin and merge their output with colored prefixes.\n\n\
        Each stdin line is `PREFIX PROGRAM [ARGS...]`, or with -t the line is substituted \
        into the template and used as the prefix.",
    styles = help_styles()
)]
struct Cli {
    /// Path to mergetail.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any mergetail.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Placeholder replaced by the input line in the template.
    #[arg(short = 'I', value_name = "TOKEN")]
    placeholder: Option<String>,
    /// Treat the trailing arguments as a command template.
    #[arg(short = 't', long = "template")]
    template: bool,
    /// Do not colorize prefixes.
    #[arg(long)]
    no_color: bool,
    /// Longest accepted output line in bytes.
    #[arg(long)]
    max_line_bytes: Option<usize>,
    /// More diagnostics on stderr (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only report errors on stderr.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
    /// Template words, each split with shell rules (with -t).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARG")]
    args: Vec<String>,
}

/// The run was stopped by a signal.
#[derive(Error, Debug)]
#[error("interrupted by {0}")]
struct Interrupted(&'static str);

/// Runtime configuration derived from CLI arguments and the config file.
#[derive(Debug, Clone)]
struct RunSettings {
    mode: InputMode,
    options: MergeOptions,
    commands: Vec<CommandSpec>,
}

impl RunSettings {
    fn from_cli(cli: &Cli, config: Config) -> Result<Self> {
        let placeholder = cli
            .placeholder
            .clone()
            .or(config.placeholder)
            .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string());

        let pieces = if cli.template {
            Some(cli.args.clone())
        } else if !cli.args.is_empty() {
            bail!("unexpected arguments {:?} (use -t for a template)", cli.args);
        } else {
            config.template
        };
        let mode = match pieces {
            Some(pieces) => InputMode::Template {
                template: input::parse_template(&pieces).map_err(anyhow::Error::msg)?,
                placeholder,
            },
            None => InputMode::Direct,
        };

        let options = MergeOptions {
            color: !cli.no_color && config.color.unwrap_or(true),
            max_line_bytes: cli
                .max_line_bytes
                .or(config.max_line_bytes)
                .unwrap_or(DEFAULT_MAX_LINE_BYTES),
        };

        let commands = config
            .commands
            .iter()
            .map(config::CommandConfig::to_spec)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mode,
            options,
            commands,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let settings = RunSettings::from_cli(&cli, config)?;

    let commands = if settings.commands.is_empty() {
        let mode = settings.mode.clone();
        tokio::task::spawn_blocking(move || {
            input::read_commands(std::io::stdin().lock(), &mode)
        })
        .await
        .context("stdin reader panicked")??
    } else {
        settings.commands.clone()
    };
    tracing::debug!("running {} commands", commands.len());

    let observer = Arc::new(TracingObserver);
    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = merge_tail(commands, &mut stdout, &settings.options, observer) => {
            result.map_err(anyhow::Error::from)
        }
        // Dropping the merge signals every process group before this branch returns.
        signal = shutdown_signal() => Err(Interrupted(signal).into()),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    if cli.no_config {
        return Ok(Config::default());
    }
    let path = cli
        .config
        .clone()
        .or_else(default_config_path);
    match path {
        Some(path) => config::load_config(&path),
        None => Ok(Config::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(input) = err.downcast_ref::<InputError>() {
        return match input {
            InputError::BadLine { .. } => 2,
            InputError::Read(_) => 3,
        };
    }
    if err.downcast_ref::<MergeError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<Interrupted>().is_some() {
        return 130;
    }
    1
}

fn help_styles() -> Styles {
    let accent = Style::new().fg_color(Some(AnsiColor::BrightBlue.into()));
    Styles::styled()
        .header(accent.effects(Effects::BOLD | Effects::UNDERLINE))
        .usage(accent.effects(Effects::BOLD))
        .literal(Style::new().effects(Effects::BOLD))
        .placeholder(Style::new().effects(Effects::ITALIC))
        .error(
            Style::new()
                .fg_color(Some(AnsiColor::BrightRed.into()))
                .effects(Effects::BOLD),
        )
        .invalid(Style::new().fg_color(Some(AnsiColor::BrightRed.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mergetail").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn template_captures_trailing_arguments() {
        let cli = parse(&["-I", "XX", "-t", "tail", "-f", "XX.log"]);
        let settings = RunSettings::from_cli(&cli, Config::default()).unwrap();
        assert_eq!(
            settings.mode,
            InputMode::Template {
                template: vec!["tail".into(), "-f".into(), "XX.log".into()],
                placeholder: "XX".into(),
            }
        );
    }

    #[test]
    fn attached_placeholder_is_accepted() {
        let cli = parse(&["-I%", "-t", "echo %"]);
        assert_eq!(cli.placeholder.as_deref(), Some("%"));
    }

    #[test]
    fn arguments_without_template_flag_are_rejected() {
        let cli = parse(&["echo", "hi"]);
        assert!(RunSettings::from_cli(&cli, Config::default()).is_err());
    }

    #[test]
    fn empty_template_is_rejected() {
        let cli = parse(&["-t"]);
        assert!(RunSettings::from_cli(&cli, Config::default()).is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let cli = parse(&["--no-color", "--max-line-bytes", "10"]);
        let config = Config {
            color: Some(true),
            max_line_bytes: Some(99),
            ..Config::default()
        };
        let settings = RunSettings::from_cli(&cli, config).unwrap();
        assert!(!settings.options.color);
        assert_eq!(settings.options.max_line_bytes, 10);
        assert_eq!(settings.mode, InputMode::Direct);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn absent_default_config_yields_empty_config() {
        // The crate root carries no mergetail.toml.
        assert!(default_config_path().is_none());
        let config = load_config(&parse(&[])).unwrap();
        assert!(config.commands.is_empty());
    }

    #[test]
    fn exit_codes_follow_failure_stage() {
        let bad_line = anyhow::Error::from(InputError::BadLine {
            line: 1,
            reason: "x".into(),
        });
        assert_eq!(exit_code(&bad_line), 2);
        let merge = anyhow::Error::from(MergeError::Aggregate { count: 2 });
        assert_eq!(exit_code(&merge), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
