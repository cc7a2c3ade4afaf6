//! CLI binary for managing a local MEV playground.

use std::{
    io::{BufRead, Write},
    process::ExitCode,
};

use clap::Parser;
use eyre::{Result, WrapErr};
use mev_playground::{
    Playground, PlaygroundError,
    cli::{Command, PlaygroundCli},
};
use tokio_util::sync::CancellationToken;

/// Exit code of a `start` that left a component unhealthy or pending.
const COMPONENT_FAILURE: u8 = 5;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = PlaygroundCli::parse();
    if let Err(e) = cli.logging.init_tracing() {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<PlaygroundError>() {
            Some(e) => {
                eprintln!("error[{}] during {}: {e}", e.kind(), e.phase());
                ExitCode::from(e.exit_code() as u8)
            }
            None => {
                eprintln!("error: {err:?}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: PlaygroundCli) -> Result<ExitCode> {
    let config = cli.resolve_config()?;
    let playground = Playground::docker(config)?;

    match cli.command {
        Command::Start(_) => start(&playground).await,
        Command::Stop => {
            let report = playground.stop().await?;
            println!("Stopped {} containers", report.stopped.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Nuke { yes, artifacts_only } => {
            let target = if artifacts_only { "generated artifacts" } else { "containers, network and data" };
            if !yes && !confirm(&format!(
                "This removes all playground {target} under {}. Continue? [y/N] ",
                playground.config().data_dir.display()
            ))? {
                println!("Aborted");
                return Ok(ExitCode::SUCCESS);
            }
            playground.nuke(artifacts_only).await?;
            println!("Removed playground {target}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let report = playground.status().await;
            println!();
            print!("{report}");
            if report.is_down() {
                println!("\nPlayground is not running. Start it with 'mev-playground start'");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Logs { component, tail } => {
            print!("{}", playground.logs(&component, tail).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Info { json } => {
            let info = playground.info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info).wrap_err("Failed to encode info")?);
            } else {
                print!("{info}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn start<R, T>(playground: &Playground<R, T>) -> Result<ExitCode>
where
    R: mev_playground::runtime::ContainerRuntime,
    T: mev_playground::genesis::GenesisTool,
{
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, leaving started components running...");
            on_signal.cancel();
        }
    });

    println!("Starting playground...");
    let report = playground.start(&cancel).await?;
    println!();
    print!("{report}");
    println!("Genesis time:    {}", report.context.genesis.genesis_time);
    println!("Validators root: {}", report.context.genesis.validators_root);

    if report.is_success() {
        println!();
        print!("{}", playground.info()?);
        println!("\nPlayground started successfully!");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(COMPONENT_FAILURE))
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
