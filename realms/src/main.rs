//! Infinite Realms: an endless, illustrated text adventure.
//!
//! Line-oriented front end for the turn engine:
//!
//! ```bash
//! cargo run -p realms -- --size 2K --save-dir ~/.realms
//! ```

mod headless;

use std::sync::Arc;

use realms_core::KeySlot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the story on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args);
    let keys = KeySlot::from_env();
    let input = headless::stdin_lines();
    let credentials = Arc::new(headless::PromptCredentials::new(keys.clone(), input.clone()));

    headless::run_headless(config, keys, credentials, input).await?;
    Ok(())
}

fn print_help() {
    println!("Infinite Realms - an endless, illustrated text adventure");
    println!();
    println!("USAGE:");
    println!("  realms [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --size <1K|2K|4K>     Illustration size (default 1K)");
    println!("  --save-dir <DIR>      Where the save file lives (default ./saves)");
    println!("  --story-model <NAME>  Model for the story");
    println!("  --image-model <NAME>  Model for illustrations");
    println!("  --chat-model <NAME>   Model for the companion");
    println!("  --history <N>         History items sent with each turn (default 4)");
    println!("  -h, --help            Show this help");
    println!();
    println!("ENVIRONMENT:");
    println!("  GEMINI_API_KEY        API key (API_KEY also works; .env is read)");
    println!("  RUST_LOG              Log filter for stderr (default warn)");
}
