use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod aggregate;
mod config;
mod db;
mod engine;
mod error;
mod heuristic;
mod import;
mod knn;
mod leaderboard;
mod models;
mod report;
mod training;

use config::RatingConfig;
use engine::{History, RatingEngine, RatingOutcome, RatingPath};
use models::{MonthlyAggregate, MonthlySearch, YearMonth};

#[derive(Parser)]
#[command(name = "performance-track")]
#[command(about = "Monthly performance ratings from daily attendance and task logs", long_about = None)]
struct Cli {
    /// TOML file with rating settings (RATING_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Rate a daily log offline, without stored history
    Rate {
        #[arg(long)]
        csv: PathBuf,
        /// Print rated months as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a daily log, rate it against stored history and save it
    Import {
        #[arg(long)]
        csv: PathBuf,
        /// Rate and print without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the best employee of the last six months
    TopPerformer,
    /// Rank employees over the last six months
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Browse stored monthly ratings
    Search {
        #[arg(long)]
        employee_id: Option<String>,
        /// Case-insensitive part of the employee name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        month: Option<YearMonth>,
    },
    /// List months that have stored ratings
    Months,
    /// Generate a markdown report for one month
    Report {
        #[arg(long)]
        month: YearMonth,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_outcome(outcome: &RatingOutcome) {
    match outcome.path {
        RatingPath::Trained { source } => println!(
            "Rated {} employee-months with the classifier (trained on {}).",
            outcome.records.len(),
            source
        ),
        RatingPath::Untrainable => println!(
            "Rated {} employee-months with the fallback rule (no training data).",
            outcome.records.len()
        ),
    }
    if outcome.fallbacks > 0 {
        println!("{} records fell back to the rule-based rating.", outcome.fallbacks);
    }
    for record in &outcome.records {
        print_record(record);
    }
}

fn print_record(record: &MonthlyAggregate) {
    let rating = record
        .performance_rating
        .map(|r| r.value().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "- {} {} ({}, {}): attendance {:.1}%, KPI {:.1}%, overtime {:.1}h, rating {}",
        record.year_month,
        record.employee_name,
        record.employee_id,
        record.department,
        record.metrics.attendance_rate,
        record.metrics.kpi_completion,
        record.metrics.overtime_hours,
        rating
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let rating_config = RatingConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Rate { csv, json } => {
            let batch = import::read_csv(&csv)?;
            let mut engine = RatingEngine::new(rating_config);
            let outcome = engine.run(&batch.records, &History::default())?;
            tracing::debug!(state = ?engine.state(), "rating finished");

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.records)?);
            } else {
                print_outcome(&outcome);
            }
            if !batch.skipped.is_empty() {
                println!("Skipped {} malformed rows.", batch.skipped.len());
            }
        }
        Commands::Import { csv, dry_run } => {
            let batch = import::read_csv(&csv)?;
            let pool = connect().await?;

            let existing = db::months_with_data(&pool, &batch.months()).await?;
            if !existing.is_empty() {
                let months: Vec<String> = existing.iter().map(|m| m.to_string()).collect();
                anyhow::bail!(
                    "performance data already exists for {}; refusing to import again",
                    months.join(", ")
                );
            }

            let history = db::load_history(&pool).await?;
            let mut engine = RatingEngine::new(rating_config);
            let outcome = engine.run(&batch.records, &history)?;
            tracing::debug!(state = ?engine.state(), "rating finished");
            print_outcome(&outcome);
            if !batch.skipped.is_empty() {
                println!("Skipped {} malformed rows.", batch.skipped.len());
            }

            if dry_run {
                println!("Dry run: nothing saved.");
            } else {
                let (daily, monthly) =
                    db::save_import(&pool, &batch.records, &outcome.records).await?;
                println!(
                    "Saved {daily} daily records and {monthly} monthly ratings from {}.",
                    csv.display()
                );
            }
        }
        Commands::TopPerformer => {
            let pool = connect().await?;
            let records = db::fetch_monthly_history(&pool).await?;

            match leaderboard::top_performer(&records) {
                Some(top) => println!(
                    "Top performer for the six months through {}: {} ({}, {}) score {:.2}",
                    top.latest_month, top.employee_name, top.employee_id, top.department, top.score
                ),
                None => println!("No performance data available."),
            }
        }
        Commands::Leaderboard { limit } => {
            let pool = connect().await?;
            let records = db::fetch_monthly_history(&pool).await?;

            let Some((latest, ranked)) = leaderboard::rank_window(&records) else {
                println!("No performance data available.");
                return Ok(());
            };

            println!(
                "Leaderboard for {} through {}:",
                leaderboard::window_start(latest),
                latest
            );
            for (position, score) in ranked.iter().take(limit).enumerate() {
                println!(
                    "{}. {} ({}, {}) score {:.2} across {} months",
                    position + 1,
                    score.employee_name,
                    score.employee_id,
                    score.department,
                    score.score,
                    score.months_counted
                );
            }
        }
        Commands::Search {
            employee_id,
            name,
            month,
        } => {
            let pool = connect().await?;
            let search = MonthlySearch {
                employee_id,
                name,
                month,
            };
            let records = db::search_monthly(&pool, &search).await?;

            if records.is_empty() {
                println!("No matching performance records.");
            } else {
                println!("Found {} performance records:", records.len());
                for record in &records {
                    print_record(record);
                }
            }
        }
        Commands::Months => {
            let pool = connect().await?;
            let months = db::list_months(&pool).await?;

            if months.is_empty() {
                println!("No performance data available.");
            }
            for month in months {
                println!("{month}");
            }
        }
        Commands::Report { month, out } => {
            let pool = connect().await?;
            let records = db::fetch_month(&pool, month).await?;
            let history = db::fetch_monthly_history(&pool).await?;
            let top = leaderboard::top_performer(&history);

            let report = report::build_report(month, &records, top.as_ref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
