//! Scenario script runner.
//!
//! Feeds scripts (or stdin lines) through the interpreter pipeline against
//! a target network: load the deployment manifest, expand macros, process
//! events one at a time. Script mode aborts on the first failure; the
//! interactive prompt prints the error and keeps the previous world.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use scen_common::MacroTable;
use scen_engine::{networks, run_line, run_script, LogPrinter, Registry, SimBackend, World};

/// Scenario script runner
#[derive(Parser)]
#[command(name = "scen-repl")]
#[command(about = "Runs scenario scripts against a target network")]
#[command(version)]
struct Cli {
    /// Target network identifier
    #[arg(short, long, default_value = "development")]
    network: String,

    /// Directory holding the networks/ manifests
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Macro definition file, loaded ahead of every script
    #[arg(short, long)]
    macros: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Do not write deployment or settings files
    #[arg(long)]
    dry_run: bool,

    /// Scenario scripts to run in order; reads stdin when omitted
    scripts: Vec<PathBuf>,
}

fn init_logging(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::BrightBlack);
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}] {}", colors.color(record.level()), message))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .context("failed to initialize logging")?;
    Ok(())
}

fn load_macros(cli: &Cli) -> Result<MacroTable> {
    match &cli.macros {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read macro file {}", path.display()))?;
            let table = MacroTable::parse_defs(&text)
                .with_context(|| format!("bad macro file {}", path.display()))?;
            Ok(table)
        }
        None => Ok(MacroTable::new()),
    }
}

fn init_world(cli: &Cli) -> Result<World> {
    let backend = Arc::new(SimBackend::new());
    let accounts = backend.named_accounts();
    let mut world = World::init(
        cli.network.clone(),
        accounts,
        backend,
        Arc::new(Registry::core()),
        Arc::new(LogPrinter),
    );
    if let Some(base_path) = &cli.base_path {
        world = world.with_base_path(base_path.clone());
    }
    let world = world.update_settings(|settings| {
        settings.verbose = cli.verbose;
        settings.dry_run = cli.dry_run;
    });

    let world = networks::load_settings(world).context("failed to load settings")?;
    let (world, contract_info) =
        networks::load_contracts(world).context("failed to load deployment manifest")?;

    log::info!("Network: {}", world.network);
    if !world.accounts.is_empty() {
        log::info!("Accounts:");
        for account in &world.accounts {
            log::info!("\t{} ({})", account.address, account.name);
        }
    }
    if !contract_info.is_empty() {
        log::info!("Contracts:");
        for info in &contract_info {
            log::info!("\t{}", info);
        }
    }
    Ok(world)
}

async fn run_scripts(mut world: World, cli: &Cli, macros: &MacroTable) -> Result<()> {
    for path in &cli.scripts {
        log::info!("Running script: {}...", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read script {}", path.display()))?;
        world = run_script(world, &text, macros)
            .await
            .map_err(anyhow::Error::new)
            .with_context(|| format!("script {} failed", path.display()))?;
    }
    log::info!("Script complete.");
    Ok(())
}

async fn prompt_loop(mut world: World, macros: &MacroTable) -> Result<()> {
    loop {
        print!(" > ");
        io::stdout().flush().ok();
        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .context("failed to read stdin")?;
        if read == 0 {
            return Ok(());
        }
        match run_line(world.clone(), &line, macros).await {
            Ok(next) => world = next,
            // Keep the previous world; the failed event left no partial
            // state behind.
            Err(failure) => log::error!("{}", failure),
        }
    }
}

async fn repl(cli: Cli) -> Result<()> {
    let macros = load_macros(&cli)?;
    let world = init_world(&cli)?;

    if !macros.is_empty() {
        let names: Vec<&str> = macros.names().collect();
        log::info!("Available macros: {}", names.join(", "));
    }

    if cli.scripts.is_empty() {
        prompt_loop(world, &macros).await
    } else {
        run_scripts(world, &cli, &macros).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(failure) = init_logging(cli.verbose) {
        eprintln!("{:#}", failure);
        return ExitCode::FAILURE;
    }
    match repl(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            log::error!("{:#}", failure);
            ExitCode::FAILURE
        }
    }
}
