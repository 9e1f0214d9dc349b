// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use clap::Parser;
use elkan_tools::cli::ElkanToolsArgs;
use elkan_tools::util::install_panic_handler;

#[tokio::main]
pub async fn main() {
    env_logger::init();

    // Install global panic handler
    install_panic_handler();

    // Parse arguments from command line
    let args = ElkanToolsArgs::parse();

    // Run with the parsed arguments
    let status = args.run(&mut std::io::stdout()).await;
    std::process::exit(status);
}
