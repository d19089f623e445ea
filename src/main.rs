mod config;
mod db;
mod error;
mod parser;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use config::Conventions;
use parser::records::{CategoryTable, LocationTable, PriceRow, References};
use parser::LocationReport;

#[derive(Parser)]
#[command(name = "col_prices", about = "Cost-of-living price tables → per-category rows")]
struct Cli {
    /// SQLite file holding extracted tables and reference tables
    #[arg(long, env = "COL_DB", default_value = config::DEFAULT_DB_PATH, global = true)]
    db: PathBuf,

    #[command(flatten)]
    conventions: ConventionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConventionArgs {
    /// Type value of category boundary rows
    #[arg(long, default_value = "Edit", global = true)]
    sentinel: String,
    /// Avg_price value meaning "no data"
    #[arg(long, default_value = "?", global = true)]
    unknown: String,
    /// Name of the group before the first boundary row
    #[arg(long, default_value = "Restaurants", global = true)]
    leading_category: String,
}

impl From<ConventionArgs> for Conventions {
    fn from(args: ConventionArgs) -> Self {
        Self {
            sentinel: args.sentinel,
            unknown_marker: args.unknown,
            leading_category: args.leading_category,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Load extracted tables (JSON list of {country, city, rows})
    Import { file: PathBuf },
    /// Register reference category names
    AddCategories {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Segment every stored table and emit JSON lines, one per location and category
    Run {
        /// Max locations to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Categories to extract (default: leading group + all reference categories)
        #[arg(short, long = "category")]
        categories: Vec<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the category blocks found in one table
    Inspect { country: String, city: String },
    /// Print the pivoted row for one location and category
    Segment {
        country: String,
        city: String,
        category: String,
    },
    /// Parse a single price string
    Parse { price: String },
    /// Show database statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let conventions = Conventions::from(cli.conventions);

    match cli.command {
        Commands::Init => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", cli.db.display());
        }
        Commands::Import { file } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let n = db::import_pages_json(&conn, &file)?;
            println!("Imported {} tables from {}", n, file.display());
        }
        Commands::AddCategories { names } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            for name in &names {
                let id = db::insert_category(&conn, name)?;
                println!("{:>4}  {}", id, name);
            }
        }
        Commands::Run {
            limit,
            categories,
            out,
        } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let refs = load_references(&conn)?;
            let pages = db::fetch_pages(&conn, limit)?;
            if pages.is_empty() {
                println!("No tables stored. Run 'import' first.");
                return Ok(());
            }
            let targets = if categories.is_empty() {
                default_targets(&refs, &conventions)
            } else {
                categories
            };

            info!(
                "Processing {} tables x {} categories",
                pages.len(),
                targets.len()
            );
            let reports = process_pages(&pages, &targets, &refs, &conventions);

            let counts = match out {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_reports(BufWriter::new(file), &reports)?
                }
                None => write_reports(io::stdout().lock(), &reports)?,
            };
            counts.print();
        }
        Commands::Inspect { country, city } => {
            let conn = db::connect(&cli.db)?;
            let page = db::fetch_page(&conn, &country, &city)?
                .with_context(|| format!("No table stored for {}/{}", country, city))?;
            let index = parser::segments::CategoryIndex::build(&page.rows, &conventions)?;

            let leading = index.leading();
            println!(
                "{:>4} | {:>4} | {:>5} | {}",
                "from", "to", "rows", "category"
            );
            println!("{}", "-".repeat(40));
            println!(
                "{:>4} | {:>4} | {:>5} | {} (leading)",
                leading.start,
                leading.end,
                leading.len(),
                conventions.leading_category
            );
            for block in index.blocks() {
                println!(
                    "{:>4} | {:>4} | {:>5} | {}",
                    block.start,
                    block.end,
                    block.len(),
                    block.label
                );
            }
        }
        Commands::Segment {
            country,
            city,
            category,
        } => {
            let conn = db::connect(&cli.db)?;
            let refs = load_references(&conn)?;
            let page = db::fetch_page(&conn, &country, &city)?
                .with_context(|| format!("No table stored for {}/{}", country, city))?;
            match parser::segments::segment(&page.rows, &category, &conventions)? {
                Some(record) => {
                    let row = parser::records::pivot(
                        &country,
                        &city,
                        record,
                        &refs,
                        &conventions,
                    )?;
                    println!("{}", serde_json::to_string_pretty(&row)?);
                }
                None => println!("No {} data for {}/{}.", category, country, city),
            }
        }
        Commands::Parse { price } => {
            let cell = parser::price::convert_cell(&price, &conventions.unknown_marker);
            println!("{}", serde_json::to_string(&cell)?);
        }
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Locations:  {}", s.locations);
            println!("Categories: {}", s.categories);
            println!("Tables:     {}", s.tables);
            println!("Raw rows:   {}", s.raw_rows);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    Ok(())
}

fn load_references(conn: &rusqlite::Connection) -> anyhow::Result<References> {
    Ok(References {
        locations: LocationTable::new(&db::fetch_locations(conn)?),
        categories: CategoryTable::new(&db::fetch_categories(conn)?),
    })
}

fn default_targets(refs: &References, conventions: &Conventions) -> Vec<String> {
    std::iter::once(conventions.leading_category.clone())
        .chain(
            refs.categories
                .names()
                .iter()
                .filter(|name| !conventions.is_leading(name))
                .cloned(),
        )
        .collect()
}

/// Segment tables in parallel; reports come back in input order.
fn process_pages(
    pages: &[db::RawPage],
    targets: &[String],
    refs: &References,
    conventions: &Conventions,
) -> Vec<LocationReport> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut reports = Vec::with_capacity(pages.len());
    for chunk in pages.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| parser::process_location(page, targets, refs, conventions))
            .collect();
        reports.extend(results);
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    reports
}

struct RunCounts {
    locations: usize,
    rows: usize,
    absent: usize,
    errors: usize,
    malformed: usize,
}

impl RunCounts {
    fn print(&self) {
        eprintln!(
            "{} locations: {} rows, {} absent categories, {} failed records, {} unparseable prices.",
            self.locations, self.rows, self.absent, self.errors, self.malformed,
        );
    }
}

fn write_reports<W: Write>(mut w: W, reports: &[LocationReport]) -> anyhow::Result<RunCounts> {
    let mut counts = RunCounts {
        locations: reports.len(),
        rows: 0,
        absent: 0,
        errors: 0,
        malformed: 0,
    };

    for report in reports {
        for row in &report.rows {
            write_row(&mut w, row)?;
        }
        for err in &report.errors {
            warn!("Skipped record: {}", err);
        }
        counts.rows += report.rows.len();
        counts.absent += report.absent.len();
        counts.errors += report.errors.len();
        counts.malformed += report.malformed_cells();
    }

    w.flush()?;
    Ok(counts)
}

fn write_row<W: Write>(w: &mut W, row: &PriceRow) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *w, row)?;
    w.write_all(b"\n")?;
    Ok(())
}
