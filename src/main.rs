use clap::Parser;
use corebox::{run, Cli};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("[ERROR] {e:#}");
        std::process::exit(1);
    }
}
