//! Smoke CLI - Main Entry Point
//!
//! Runs the bundled self-test pool, plus any YAML test trees found under
//! `--spec-dir`, through the default-run policy or an explicit instruction.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use smoke_core::remote::LoopbackBuilder;
use smoke_core::spec::loader::load_all;
use smoke_core::{
    parse_include, parse_list, Host, Instruction, RemoteHost, Reporter, ReporterOptions, RunOptions, RunOutcome,
    Runner, Suite, TestRegistry, DEFAULT_CONFIG_FILE,
};

mod output;
mod selftest;

/// Smoke - hierarchical test-tree runner
#[derive(Parser)]
#[command(name = "smoke")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// `*` for every test, `/regex/` to match ids, or an exact test id;
    /// omitted means the default-run policy
    instruction: Option<String>,

    /// Run configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Include paths, e.g. `root/group;other.test`
    #[arg(long)]
    include: Vec<String>,

    /// Abort a tree after its first failure
    #[arg(long)]
    quit_on_first_fail: bool,

    /// Run selected trees concurrently
    #[arg(long)]
    concurrent: bool,

    /// Do not log excluded tests
    #[arg(long)]
    no_log_excludes: bool,

    /// Run remotely
    #[arg(long)]
    remote: bool,

    /// Capability names for remote runs (`*` for all)
    #[arg(long)]
    cap: Vec<String>,

    /// Capability preset names for remote runs
    #[arg(long)]
    cap_preset: Vec<String>,

    /// Serve remote sessions from an in-process browser host
    #[arg(long)]
    loopback: bool,

    /// Directory of YAML test trees to add to the pool
    #[arg(long)]
    spec_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Fold command-line flags over file options; lists accumulate.
    fn merge(&self, mut options: RunOptions) -> RunOptions {
        for include in &self.include {
            options.include.extend(parse_include(include));
        }
        for cap in &self.cap {
            options.cap.extend(parse_list(cap));
        }
        for preset in &self.cap_preset {
            options.cap_preset.extend(parse_list(preset));
        }
        options.quit_on_first_fail |= self.quit_on_first_fail;
        options.concurrent |= self.concurrent;
        options.remote |= self.remote;
        if self.no_log_excludes {
            options.log_excludes = false;
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let options = match RunOptions::load(&cli.config) {
        Ok(options) => cli.merge(options),
        Err(e) => {
            output::print_error(&format!("Cannot load {}: {}", cli.config.display(), e));
            std::process::exit(2);
        }
    };

    let instruction = match cli.instruction.as_deref().map(str::parse::<Instruction>).transpose() {
        Ok(instruction) => instruction,
        Err(e) => {
            output::print_error(&e.to_string());
            std::process::exit(2);
        }
    };

    let reporter = Arc::new(Reporter::new(ReporterOptions::from(&options)));
    let nodes = match collect_nodes(cli.spec_dir.as_ref()) {
        Ok(nodes) => nodes,
        Err(e) => {
            output::print_error(&format!("Cannot load test specs: {}", e));
            std::process::exit(2);
        }
    };
    let pool = register(Host::Native, &nodes, &reporter);
    info!("{} test trees registered", pool.len());

    let mut runner = Runner::new(reporter.clone(), options.clone());
    if cli.loopback {
        let remote_reporter = Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        });
        let host = RemoteHost::new(register(Host::Browser, &nodes, &remote_reporter), options.clone());
        runner = runner.with_sessions(Arc::new(LoopbackBuilder::new(Arc::new(host))));
    }

    let success = match instruction {
        None => {
            let run = runner.run_default(&pool).await;
            output::print_run(&run, cli.format);
            run.is_success()
        }
        Some(instruction) => {
            let remote = options.remote || options.wants_capabilities();
            match runner.run(&pool, &instruction, remote).await {
                RunOutcome::NothingRun => {
                    output::print_snapshot(&reporter.snapshot(), cli.format);
                    reporter.snapshot().is_success()
                }
                RunOutcome::Local(snapshot) => {
                    output::print_snapshot(&snapshot, cli.format);
                    snapshot.is_success()
                }
                RunOutcome::Remote(summary) => {
                    output::print_remote_run(&summary, cli.format);
                    summary.is_success() && reporter.snapshot().is_success()
                }
            }
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn collect_nodes(spec_dir: Option<&PathBuf>) -> smoke_core::Result<Vec<smoke_core::TestNode>> {
    let mut nodes = selftest::pool();
    if let Some(dir) = spec_dir {
        let loaded = load_all(dir, &selftest::functions())?;
        debug!("Loaded {} test trees from {}", loaded.len(), dir.display());
        nodes.extend(loaded);
    }
    Ok(nodes)
}

fn register(host: Host, nodes: &[smoke_core::TestNode], reporter: &Reporter) -> Vec<Suite> {
    let mut registry = TestRegistry::new(host);
    for node in nodes {
        registry.define(node.clone(), reporter);
    }
    registry.ordered()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_lists() {
        let cli = Cli::parse_from([
            "smoke",
            "--include",
            "a/b;c",
            "--include",
            "d",
            "--cap",
            "chrome,firefox",
            "--no-log-excludes",
        ]);
        let file = RunOptions {
            include: vec![vec!["z".to_string()]],
            ..Default::default()
        };
        let options = cli.merge(file);
        assert_eq!(options.include.len(), 4);
        assert_eq!(options.cap, vec!["chrome", "firefox"]);
        assert!(!options.log_excludes);
        assert!(cli.instruction.is_none());
    }

    #[test]
    fn test_spec_dir_trees_join_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.yaml"),
            "id: extra\ntests:\n  - [one, pass]\n  - [two, note]\n",
        )
        .unwrap();
        let nodes = collect_nodes(Some(&dir.path().to_path_buf())).unwrap();
        assert!(nodes.iter().any(|node| node.id == "extra"));

        let reporter = Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        });
        let pool = register(Host::Native, &nodes, &reporter);
        assert_eq!(pool.first().map(Suite::id), Some("minimal"));
    }
}
