#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use lts_core::ShardStore;
use lts_core::config::resolve_config;
use lts_core::timing::timing_enabled_from_env;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lts: read ranges from a sharded long-term store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root directory of the shard tree.
    #[arg(long, global = true, default_value = ".")]
    base: PathBuf,

    /// Config file (defaults to <base>/lts.toml, then the user config).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit read timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Show which shard file a logical range maps to",
        after_help = "EXAMPLES:\n    lts resolve 230000000010 220"
    )]
    Resolve(cmd::ResolveArgs),

    #[command(
        about = "Read a logical byte range, following it across shards",
        after_help = "EXAMPLES:\n    lts --base /srv/lts read 99999990 20\n    lts read 0 4096 --out chunk.bin --stats"
    )]
    Read(cmd::ReadArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("LTS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "lts=debug,lts_core=debug,info"
        } else {
            "lts=info,lts_core=info,warn"
        })
    });

    let format = env::var("LTS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = resolve_config(&cli.base, cli.config.as_deref())?;
    let store = ShardStore::open(&cli.base, &config)?;
    let timing_enabled = cli.timing || timing_enabled_from_env();
    store.timings().set_enabled(timing_enabled);

    let output = cli.output_mode();
    let command_result = match &cli.command {
        Commands::Resolve(args) => cmd::run_resolve(args, &store, output),
        Commands::Read(args) => cmd::run_read(args, &store, output),
    };

    if timing_enabled {
        let report = store.timing_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    command_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["lts", "--timing", "resolve", "0", "1"]);
        assert!(cli.timing);
        assert!(matches!(cli.command, Commands::Resolve(_)));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["lts", "read", "10", "20", "--json", "--base", "/srv/lts"]);
        assert!(cli.output_mode().is_json());
        assert_eq!(cli.base, PathBuf::from("/srv/lts"));
    }

    #[test]
    fn read_args_parse() {
        let cli = Cli::parse_from(["lts", "read", "100", "200", "--out", "x.bin", "--stats"]);
        let Commands::Read(args) = cli.command else {
            panic!("expected read subcommand");
        };
        assert_eq!(args.offset, 100);
        assert_eq!(args.size, 200);
        assert_eq!(args.out, Some(PathBuf::from("x.bin")));
        assert!(args.stats);
    }

    #[test]
    fn verbose_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["lts", "read", "0", "10", "-v"]);
        assert!(cli.verbose);
    }

    #[test]
    fn default_output_is_human() {
        let cli = Cli::parse_from(["lts", "resolve", "0", "0"]);
        assert!(!cli.output_mode().is_json());
        assert_eq!(cli.base, PathBuf::from("."));
    }
}
