// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use gas_refund::config::{generate_refund_node_config_and_write_to_file, RefundNodeConfig};
use gas_refund::node::{run_api_server, run_computation_round};
use gas_refund_pg_db::DbArgs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one computation round across all configured chains.
    Run {
        #[clap(long)]
        config_path: PathBuf,
        #[clap(flatten)]
        db_args: DbArgs,
    },
    /// Serve the claim read API.
    Serve {
        #[clap(long)]
        config_path: PathBuf,
        #[clap(flatten)]
        db_args: DbArgs,
    },
    /// Write a config template to the given path.
    GenerateConfig {
        #[clap(long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            config_path,
            db_args,
        } => {
            let config = RefundNodeConfig::load(&config_path)?;

            let cancel = CancellationToken::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    cancel_on_signal.cancel();
                }
            });

            run_computation_round(&config, db_args, cancel).await?;
        }
        Command::Serve {
            config_path,
            db_args,
        } => {
            let config = RefundNodeConfig::load(&config_path)?;
            run_api_server(&config, db_args).await?;
        }
        Command::GenerateConfig { path } => {
            generate_refund_node_config_and_write_to_file(&path)?;
            info!("Config template written to {path:?}");
        }
    }
    Ok(())
}
