use clap::Parser;

use adherence_lib::cli::{self, Cli};
use adherence_lib::config::{self, TrackerConfig};

#[tokio::main]
async fn main() {
    adherence_lib::init_tracing();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let args = Cli::parse();
    let config = args.resolve_config(TrackerConfig::from_env());

    match cli::run(args.command, config).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
