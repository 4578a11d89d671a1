// Replug - Auto-reconnecting serial console for USB devices
use clap::Parser;

use replug::cli::args::Args;
use replug::cli::commands::execute;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Exit explicitly: the stdin pump may still sit in a blocking read,
    // which would otherwise stall runtime shutdown.
    match execute(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
