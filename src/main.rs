//! aish - natural-language shell assistant

use aish::cli::{self, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (WARN level by default, RUST_LOG or --debug for more)
    cli::init_logging(cli.debug);

    let code = cli::run(cli).await;
    std::process::exit(code);
}
