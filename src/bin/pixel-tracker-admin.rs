use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixel_tracker::config::DatabaseConfig;
use pixel_tracker::ids::new_tracker_id;
use pixel_tracker::storage;

#[derive(Parser)]
#[command(name = "pixel-tracker-admin")]
#[command(about = "Pixel tracker management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tracker and print its id
    Create,
    /// Delete a tracker (recorded visits are kept)
    Delete {
        /// Tracker ID
        id: String,
    },
    /// List all trackers with their visit counts
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = DatabaseConfig::from_env()?;

    let storage = storage::connect(&config).await?;

    // Ensure database is initialized
    storage.init().await.context("database initialization failed")?;

    match cli.command {
        Commands::Create => {
            let tracker = storage.create_tracker(&new_tracker_id()).await?;
            println!("✓ Created tracker '{}'", tracker.id);
        }
        Commands::Delete { id } => {
            if storage.delete_tracker(&id).await? {
                println!("✓ Deleted tracker '{}'", id);
            } else {
                println!("⚠ Tracker '{}' not found", id);
            }
        }
        Commands::List => {
            let trackers = storage.list_trackers().await?;
            if trackers.is_empty() {
                println!("No trackers found.");
            } else {
                println!("{:<24} {:<22} {}", "Tracker ID", "Created", "Visits");
                println!("{}", "-".repeat(60));
                for tracker in trackers {
                    let created = chrono::DateTime::from_timestamp_millis(tracker.created_at)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| tracker.created_at.to_string());
                    println!("{:<24} {:<22} {}", tracker.id, created, tracker.visits);
                }
            }
        }
    }

    storage.close().await;
    Ok(())
}
