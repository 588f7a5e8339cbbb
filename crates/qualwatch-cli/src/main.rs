// Qualwatch CLI - operator tooling for the report quality pipeline

mod backfill;
mod simulate;

use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use qualwatch_anomaly::{load_config, QualwatchConfig};
use qualwatch_core::backfill::convert_export;
use qualwatch_core::Normalizer;
use simulate::Scenario;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "qualwatch")]
#[command(version = "0.1.0")]
#[command(about = "Report quality pipeline tooling", long_about = None)]
struct Cli {
    /// TOML config file (all defaults when omitted)
    #[arg(short, long, env = "QUALWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish synthetic quality events
    Simulate {
        /// Scenario to simulate
        #[arg(short, long, default_value = "normal")]
        scenario: Scenario,

        /// Number of teams
        #[arg(short, long, default_value = "3")]
        teams: usize,

        /// Interval between ticks (milliseconds)
        #[arg(short, long, default_value = "1000")]
        interval: u64,

        /// Run duration in seconds (0 = forever)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },

    /// Convert a document export and publish it to the backfill subject
    Backfill {
        /// Path to export file (JSON)
        file: PathBuf,

        /// Convert and report only, publish nothing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => QualwatchConfig::default(),
    };

    match cli.command {
        Commands::Simulate { scenario, teams, interval, duration } => {
            run_simulation(&config, scenario, teams, interval, duration).await?;
        }
        Commands::Backfill { file, dry_run } => {
            run_backfill(&config, &file, dry_run).await?;
        }
    }

    Ok(())
}

async fn run_simulation(
    config: &QualwatchConfig,
    scenario: Scenario,
    teams: usize,
    interval_ms: u64,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let nats = async_nats::connect(config.nats.url.as_str()).await?;
    let subject = config.nats.events_subject.clone();

    println!();
    println!("{}", "╔══════════════════════════════════════════════════╗".cyan());
    println!("{}", "║         📈 Qualwatch Event Simulator             ║".cyan().bold());
    println!("{}", "╠══════════════════════════════════════════════════╣".cyan());
    println!("║  Scenario: {:<37} ║", format!("{:?}", scenario).yellow());
    println!("║  Teams: {:<40} ║", teams.to_string().green());
    println!("║  Subject: {:<38} ║", subject.green());
    println!("{}", "╚══════════════════════════════════════════════════╝".cyan());
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let mut headers = async_nats::HeaderMap::new();
    headers.insert("source", "simulate");

    let interval = Duration::from_millis(interval_ms);
    let start = std::time::Instant::now();
    let mut tick: u64 = 0;
    let mut sent: u64 = 0;

    loop {
        // Check duration limit
        if duration > 0 && start.elapsed().as_secs() >= duration {
            println!("\n{} Duration limit reached, {} messages sent.", "✓".green(), sent);
            break;
        }

        if tick == simulate::WARMUP_TICKS && scenario != Scenario::Normal {
            println!("{} scenario {:?} active", "⚠".yellow().bold(), scenario);
        }

        for payload in simulate::generate_tick(scenario, tick, teams) {
            match nats
                .publish_with_headers(subject.clone(), headers.clone(), payload.into())
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => println!("{} Failed to publish: {}", "✗".red(), e),
            }
        }

        println!(
            "{} tick {} {}",
            Utc::now().format("%H:%M:%S").to_string().dimmed(),
            tick,
            format!("({} sent)", sent).dimmed()
        );

        tick += 1;
        tokio::time::sleep(interval).await;
    }

    nats.flush().await?;
    Ok(())
}

async fn run_backfill(
    config: &QualwatchConfig,
    file: &Path,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{} {}", "📥 Backfilling:".cyan().bold(), file.display());
    println!("{}", "─".repeat(40).dimmed());

    let content = std::fs::read_to_string(file)?;
    let outcomes = convert_export(&content, &Normalizer::default(), Utc::now())?;
    let (events, report) = backfill::plan(outcomes);

    println!("Found {} documents, {} unique events", report.documents, report.events);

    if !dry_run && !events.is_empty() {
        let nats = async_nats::connect(config.nats.url.as_str()).await?;
        let subject = config.nats.backfill_subject.clone();

        let pb = indicatif::ProgressBar::new(events.len() as u64);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        let mut failed = 0;
        for event in &events {
            let published = match serde_json::to_vec(event) {
                Ok(payload) => nats.publish(subject.clone(), payload.into()).await.is_ok(),
                Err(_) => false,
            };
            if !published {
                failed += 1;
            }
            pb.inc(1);
        }
        nats.flush().await?;
        pb.finish_with_message("Done!");

        println!("  {} {}", "Published:".dimmed(), (events.len() - failed).to_string().green());
        println!("  {} {}", "Failed:".dimmed(), failed.to_string().red());
    }

    println!("\n{}", "Results:".green().bold());
    println!("  {} {}", "Events:".dimmed(), report.events.to_string().green());
    println!("  {} {}", "Duplicates:".dimmed(), report.duplicates.to_string().yellow());
    println!("  {} {}", "Skipped:".dimmed(), report.skipped.to_string().yellow());
    println!("  {} {}", "Dropped:".dimmed(), report.dropped.to_string().red());

    Ok(())
}
