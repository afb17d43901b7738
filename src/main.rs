mod crawl;
mod db;
mod error;
mod extract;
mod fetch;
mod loader;
mod normalize;
mod output;
mod record;
mod settings;
mod validate;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::crawl::{CrawlOptions, CrawlReport, Crawler};
use crate::fetch::HttpSource;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "fandom_crawler", about = "Fandom character crawler and loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl character categories and write the intermediate JSON file
    Crawl {
        /// Output file (default: CRAWLER_JSON_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Category page to start from; repeatable (default: CRAWLER_START_URLS)
        #[arg(short = 'u', long = "start-url")]
        start_urls: Vec<String>,
        /// Max concurrent page fetches
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Stop scheduling after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Upsert the intermediate JSON file into the database
    Load {
        /// Input file (default: CRAWLER_JSON_PATH)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Create the table, crawl (unless disabled) and load
    Run {
        /// Skip the crawl and load the existing file
        #[arg(long)]
        no_crawl: bool,
    },
    /// Check which start URLs are reachable
    Check,
    /// Show table statistics
    Stats,
    /// Characters overview table
    Overview {
        /// Filter by collection (e.g. "dr stone")
        #[arg(short, long)]
        collection: Option<String>,
        /// Filter by gender (Male, Female, Unknown)
        #[arg(short, long)]
        gender: Option<String>,
        /// Filter by status (Alive, Deceased, Unknown)
        #[arg(short, long)]
        status: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Search characters by name (empty query lists everything)
    Search {
        #[arg(default_value = "")]
        query: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;

    let result = match cli.command {
        Commands::Crawl {
            output,
            start_urls,
            concurrency,
            max_pages,
        } => {
            if let Some(path) = output {
                settings.json_path = path;
            }
            if !start_urls.is_empty() {
                settings.start_urls = start_urls;
            }
            if let Some(n) = concurrency {
                settings.concurrency = n;
            }
            if max_pages.is_some() {
                settings.max_pages = max_pages;
            }
            crawl_to_file(&settings).await.map(|_| ())
        }
        Commands::Load { input } => {
            if let Some(path) = input {
                settings.json_path = path;
            }
            let conn = db::connect(&settings.database_url)?;
            db::init_schema(&conn)?;
            let count = loader::import_file(&conn, &settings.json_path)?;
            println!("Loaded {} characters into {}", count, settings.database_url);
            Ok(())
        }
        Commands::Run { no_crawl } => {
            let conn = db::connect(&settings.database_url)?;
            db::init_schema(&conn)?;

            if settings.crawl_before_load(no_crawl) {
                let t_crawl = Instant::now();
                crawl_to_file(&settings).await?;
                println!("Crawled in {}", format_duration(t_crawl.elapsed()));
            }

            let count = loader::import_file(&conn, &settings.json_path)?;
            println!("Loaded {} characters into {}", count, settings.database_url);
            Ok(())
        }
        Commands::Check => {
            let source = http_source(&settings)?;
            let results = fetch::probe(&source, &settings.start_urls).await;
            for r in &results {
                match &r.error {
                    None => println!("ACCESSIBLE : {}", r.url),
                    Some(e) => println!("BLOCKED    : {} - {}", r.url, e),
                }
            }
            let ok = results.iter().filter(|r| r.accessible()).count();
            println!("\n{}/{} start URLs reachable", ok, results.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database_url)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Characters:  {}", s.total);
            println!("Collections: {}", s.collections);
            println!("\nBy gender:");
            for (label, n) in &s.by_gender {
                println!("  {:<10} {}", label, n);
            }
            println!("\nBy status:");
            for (label, n) in &s.by_status {
                println!("  {:<10} {}", label, n);
            }
            Ok(())
        }
        Commands::Overview {
            collection,
            gender,
            status,
            limit,
        } => {
            let conn = db::connect(&settings.database_url)?;
            db::init_schema(&conn)?;
            let filter = db::OverviewFilter {
                collection: collection.as_deref(),
                gender: gender.as_deref(),
                status: status.as_deref(),
            };
            let rows = db::fetch_overview(&conn, &filter, limit)?;
            print_rows(&rows);
            Ok(())
        }
        Commands::Search { query, limit } => {
            let conn = db::connect(&settings.database_url)?;
            db::init_schema(&conn)?;
            let rows = db::search_by_name(&conn, &query, limit)?;
            print_rows(&rows);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn http_source(settings: &Settings) -> anyhow::Result<HttpSource> {
    HttpSource::new(&settings.user_agent, settings.request_timeout())
}

/// Crawl every start URL and overwrite the intermediate file with the result.
async fn crawl_to_file(settings: &Settings) -> anyhow::Result<CrawlReport> {
    let source = http_source(settings)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} pages ({per_sec})")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    println!(
        "Crawling {} start URLs ({} concurrent fetches)...",
        settings.start_urls.len(),
        settings.concurrency
    );
    let crawler = Crawler::new(
        source,
        CrawlOptions {
            concurrency: settings.concurrency,
            allowed_domains: settings.allowed_domains.clone(),
            max_pages: settings.max_pages,
        },
    )
    .with_progress(pb.clone());
    let report = crawler.run(&settings.start_urls).await;
    pb.finish_and_clear();

    output::write_records(&settings.json_path, &report.records)?;
    println!(
        "Done: {} pages, {} characters kept, {} rejected, {} fetch errors -> {}",
        report.pages_fetched,
        report.records.len(),
        report.rejected,
        report.failures.len(),
        settings.json_path.display()
    );
    for f in report.failures.iter().take(10) {
        println!("  failed: {} - {}", f.url, f.cause);
    }
    if report.failures.len() > 10 {
        println!("  ... and {} more", report.failures.len() - 10);
    }
    Ok(report)
}

fn print_rows(rows: &[db::CharacterRow]) {
    if rows.is_empty() {
        println!("No characters found.");
        return;
    }

    println!(
        "{:>3} | {:<28} | {:<24} | {:<8} | {:<8}",
        "#", "Name", "Collection", "Gender", "Status"
    );
    println!("{}", "-".repeat(82));
    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>3} | {:<28} | {:<24} | {:<8} | {:<8}",
            i + 1,
            truncate(&r.name, 28),
            truncate(&r.source_collection, 24),
            r.gender,
            r.status
        );
    }

    println!("\n--- Links ---");
    for r in rows {
        match &r.image_url {
            Some(img) => println!("  {}: {} (image: {})", truncate(&r.name, 28), r.source_url, img),
            None => println!("  {}: {}", truncate(&r.name, 28), r.source_url),
        }
    }

    println!("\n{} characters", rows.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
