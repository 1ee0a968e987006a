use clap::Parser;
use presentation::cli::{Cli, CliApp};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = CliApp::new(&cli)?;
    app.run().await
}
