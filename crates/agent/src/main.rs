// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use outpost::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let _log_guard = match outpost::init_tracing(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("fatal: logging init failed: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = outpost::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
