use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelvoice::logging::init_with_default("warn").context("init logging")?;

    let cli = novelvoice::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelvoice::cli::Command::Translate(args) => {
            novelvoice::commands::translate(args)
                .await
                .context("translate")?;
        }
        novelvoice::cli::Command::Replay(args) => {
            novelvoice::commands::replay(args).await.context("replay")?;
        }
        novelvoice::cli::Command::List(args) => {
            novelvoice::commands::list(args).await.context("list")?;
        }
        novelvoice::cli::Command::Wipe(args) => {
            novelvoice::commands::wipe(args).await.context("wipe")?;
        }
    }

    Ok(())
}
