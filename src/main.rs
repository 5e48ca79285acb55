use clap::Parser;
use runlog_lib::cli::{self, Cli};

#[tokio::main]
async fn main() {
    runlog_lib::init_logging();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
