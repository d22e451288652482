//! Outdoor temperature importer.
//!
//! Reads daily-average outdoor air temperatures for one city from a
//! public weather site and uploads them to a metering server's
//! outdoor-temperature registry for a territory. One import per
//! invocation, strictly sequential, no state kept between runs.

mod config;
mod error;
mod lers;
mod model;
mod sources;

use clap::Parser;

use crate::config::{AuthMode, ImportOptions};
use crate::error::Result;

#[tokio::main]
async fn main() {
    let app_config = config::load_app_config().expect("Failed to load AppConfig");
    tracing_subscriber::fmt()
        .with_max_level(app_config.log_level())
        .init();

    let options = ImportOptions::parse();

    if let Err(err) = run(&options).await {
        // anyhow's alternate format prints the whole cause chain.
        let err = anyhow::Error::from(err);
        tracing::error!("Failed to import daily-average temperatures: {err:#}");
        wait_for_acknowledgement();
        std::process::exit(1);
    }
}

async fn run(options: &ImportOptions) -> Result<()> {
    let auth_mode = options.auth_mode()?;
    let today = chrono::Local::now().date_naive();
    let (from, to) = options.import_window(today)?;

    let mut server = lers::LersClient::new(&options.server);
    match auth_mode {
        AuthMode::Token(token) => server.set_token(token),
        AuthMode::Credentials { login, password } => {
            server.authenticate(&login, &password).await?;
        }
    }

    let territory = server.get_territory(&options.destination_territory).await?;
    tracing::info!(
        "importing into territory '{}' (id {}, UTC{:+})",
        territory.name,
        territory.id,
        territory.time_zone_offset
    );

    let reader = sources::create_reader(options.source);
    tracing::info!(
        "reading daily-average temperatures for '{}', {from} to {to}",
        options.source_city
    );
    let records = reader
        .read_temperatures(
            &options.source_city,
            territory.time_zone_offset as i64,
            from,
            to,
        )
        .await?;

    tracing::info!("read {} record(s), saving to the server", records.len());
    server.save(&records, &territory, options.missing_only).await?;

    Ok(())
}

/// Lets an operator see the diagnostic before the console window closes.
fn wait_for_acknowledgement() {
    eprintln!();
    eprintln!("Press Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
