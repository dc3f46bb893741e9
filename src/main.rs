mod cli;

use anyhow::Result;
use storyreel::core::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Copy 'config.example.yml' to 'config.yml' and fill in your generation settings.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let mut app = cli::App::new(config)?;
    app.run().await
}
