//! recon-eval CLI
//!
//! Command-line entry point for the reconstruction quality harness.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use recon_eval::cli::{commands, Cli, Commands};
use recon_eval::dsp::ReconstructionConfig;
use recon_eval::pipeline::BatchConfig;
use recon_eval::quality::PesqMode;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only results
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("recon-eval v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("recon-eval v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Evaluate {
            dir,
            sample_rate,
            no_reconstruct,
            transform,
            keep_going,
            save_dir,
            report,
            no_progress,
        } => {
            let config = BatchConfig {
                sample_rate,
                reconstruct: !no_reconstruct,
                reconstruction: ReconstructionConfig::from(&transform),
                mode: PesqMode::Wideband,
                keep_going,
                save_dir,
                progress: !no_progress,
            };
            commands::evaluate(&dir, &config, report.as_deref())
                .with_context(|| format!("evaluation of {} failed", dir.display()))?;
        }
        Commands::Score {
            reference,
            degraded,
            sample_rate,
            mode,
        } => {
            commands::score(&reference, &degraded, sample_rate, mode)
                .with_context(|| format!("scoring {} failed", degraded.display()))?;
        }
        Commands::Reconstruct {
            input,
            output,
            sample_rate,
            transform,
        } => {
            commands::reconstruct(
                &input,
                &output,
                sample_rate,
                &ReconstructionConfig::from(&transform),
            )
            .with_context(|| format!("reconstruction of {} failed", input.display()))?;
        }
    }
    Ok(())
}
