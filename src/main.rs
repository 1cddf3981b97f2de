//! titlescout CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use titlescout::{
    config::Config,
    error::Result,
    extract::{cmd_extract, ExtractStats, OpenAiClient},
    ocr::{cmd_ocr, OcrStats},
    report::{write_extractions_csv, write_rows_csv},
    scrape::{run_scrape, ChromiumPortal, Downloader, ScrapeStats},
    status::RunStatus,
    store::ArtifactStore,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "titlescout")]
#[command(version, about = "Scrape, OCR, and extract fields from county land records", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize titlescout configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Scrape the portal and download new PDFs
    Scrape,

    /// Deduplicate the store and convert PDFs to searchable text
    Ocr,

    /// Extract fields from searchable PDFs via the completion model
    Extract,

    /// Run all three stages in order
    Run,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli);
    }

    // Handle completions command (doesn't need config)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "titlescout", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let mut store = ArtifactStore::open(&config.paths.store_dir)?;
    let mut status = RunStatus::default();
    status.start();

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Scrape => {
            let stats = match stage_scrape(&config, &mut store, &mut status).await {
                Ok(stats) => stats,
                Err(e) => {
                    status.fail(&e.to_string());
                    return Err(e);
                }
            };
            status.complete();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_scrape_stats(&stats);
            }
        }

        Commands::Ocr => {
            let stats = match cmd_ocr(&config, &mut store, &mut status) {
                Ok(stats) => stats,
                Err(e) => {
                    status.fail(&e.to_string());
                    return Err(e);
                }
            };
            status.complete();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_ocr_stats(&stats);
            }
        }

        Commands::Extract => {
            let stats = match stage_extract(&config, &store, &mut status).await {
                Ok(stats) => stats,
                Err(e) => {
                    status.fail(&e.to_string());
                    return Err(e);
                }
            };
            status.complete();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_extract_stats(&stats);
            }
        }

        Commands::Run => {
            let result = run_all(&config, &mut store, &mut status).await;
            match result {
                Ok((scrape, ocr, extract)) => {
                    status.complete();
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                    } else {
                        print_scrape_stats(&scrape);
                        print_ocr_stats(&ocr);
                        print_extract_stats(&extract);
                    }
                }
                Err(e) => {
                    status.fail(&e.to_string());
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                    }
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

/// Scrape stage: browser session, portal sweep, and the rows CSV
async fn stage_scrape(
    config: &Config,
    store: &mut ArtifactStore,
    status: &mut RunStatus,
) -> Result<ScrapeStats> {
    let portal = ChromiumPortal::launch(&config.browser).await?;
    let downloader = Downloader::new(config.download.timeout_secs)?;

    let result = run_scrape(&portal, config, store, &downloader, status).await;
    portal.close().await?;
    let (table, stats) = result?;

    if !table.rows.is_empty() {
        let path = config.paths.base_dir.join(&config.output.rows_file);
        write_rows_csv(&path, &table)?;
        status.log(&format!("Wrote scraped rows to {}", path.display()));
    }
    Ok(stats)
}

/// Extract stage: completion client, extraction sweep, and the records CSV
async fn stage_extract(
    config: &Config,
    store: &ArtifactStore,
    status: &mut RunStatus,
) -> Result<ExtractStats> {
    let client = OpenAiClient::new(&config.extract, config.api_key()?)?;
    let (records, stats) = cmd_extract(config, store, &client, status).await?;

    if !records.is_empty() {
        let path = config.paths.base_dir.join(&config.output.extractions_file);
        write_extractions_csv(&path, &records)?;
        status.log(&format!("Wrote extraction records to {}", path.display()));
    }
    Ok(stats)
}

async fn run_all(
    config: &Config,
    store: &mut ArtifactStore,
    status: &mut RunStatus,
) -> Result<(ScrapeStats, OcrStats, ExtractStats)> {
    let scrape = stage_scrape(config, store, status).await?;
    let ocr = cmd_ocr(config, store, status)?;
    let extract = stage_extract(config, store, status).await?;
    Ok((scrape, ocr, extract))
}

fn print_scrape_stats(stats: &ScrapeStats) {
    println!("\n✓ Scrape complete");
    println!("  Pages visited: {}", stats.pages_visited);
    println!("  Rows seen: {}", stats.rows_seen);
    println!("  Rows saved: {}", stats.rows_saved);
    println!("  Rows skipped: {}", stats.rows_skipped);
    println!("  Rows failed: {}", stats.rows_failed);
    println!("  PDFs downloaded: {}", stats.pdfs_downloaded);
}

fn print_ocr_stats(stats: &OcrStats) {
    println!("\n✓ OCR complete");
    println!("  Duplicates removed: {}", stats.duplicates_removed);
    println!("  Files processed: {}", stats.files_processed);
    println!("  Files converted: {}", stats.files_converted);
    println!("  Files failed: {}", stats.files_failed);
}

fn print_extract_stats(stats: &ExtractStats) {
    println!("\n✓ Extraction complete");
    println!("  Documents processed: {}", stats.documents_processed);
    println!("  Documents with fields: {}", stats.documents_with_fields);
    println!("  Documents without text: {}", stats.documents_without_text);
    println!("  Chunk completions sent: {}", stats.chunks_sent);
}

fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // If the user names a config file, its parent is the base directory
    let (base_dir, config_path) = if let Some(path) = cli.config {
        let base = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir);
        let config = if path.extension().map_or(false, |e| e == "toml") {
            path
        } else {
            path.join("config.toml")
        };
        (base, config)
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    if config_path.exists() && !force {
        eprintln!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
        std::process::exit(1);
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.save()?;
    std::fs::create_dir_all(&config.paths.store_dir)?;

    println!("✓ titlescout initialized successfully");
    println!("  Config: {}", config_path.display());
    println!("  Store:  {}", config.paths.store_dir.display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to customize portal selectors and categories");
    println!(
        "  2. Export credentials: {} and {}",
        config.portal.username_env, config.portal.password_env
    );
    println!("  3. Export the completion API key: {}", config.extract.api_key_env);
    println!("  4. Run the pipeline: titlescout run");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'titlescout init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
