use anyhow::Context;
use clap::{Parser, Subcommand};
use review_scheduler::database::SqliteStore;
use review_scheduler::export::json::{export_records_to_path, import_legacy_json};
use review_scheduler::models::{ReviewField, ReviewRecord};
use review_scheduler::store::FixedClock;
use review_scheduler::{CardId, LearnerId, Scheduler, SchedulerConfig};

#[derive(Parser)]
#[command(name = "review-scheduler", about = "Spaced repetition review scheduler", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Acting learner id
    #[arg(long, global = true, default_value = "1")]
    learner: i64,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Memorize a card for the first time
    Memorize {
        card: i64,
        /// Grade 0-5 (default 4)
        #[arg(long)]
        grade: Option<i64>,
    },

    /// Review a memorized card
    Review {
        card: i64,
        /// Grade 0-5
        grade: i64,
    },

    /// Drop a card's review data
    Forget { card: i64 },

    /// Cram queue management
    #[command(subcommand)]
    Cram(CramCommand),

    /// Forecast how many cards fall due on each of the coming days
    Distribution {
        #[arg(long)]
        days_range: Option<i64>,
    },

    /// Preview the outcome of reviewing a card today with each grade
    Simulate { card: i64 },

    /// List cards due today or earlier
    Outstanding,

    /// Show a card's review data
    Show {
        card: i64,
        /// Print a single field, e.g. easiness_factor
        #[arg(long)]
        field: Option<String>,
    },

    /// Set or clear a card's comment
    Comment { card: i64, text: Option<String> },

    /// Import review data from a legacy scheduler JSON dump
    ImportLegacy { file: String },

    /// Export the learner's review data to a JSON file
    Export { file: String },

    /// Move the simulated current date one day ahead
    AdvanceDay,
}

#[derive(Subcommand)]
enum CramCommand {
    /// Add a card to the cram queue
    Add { card: i64 },
    /// Remove a card from the cram queue
    Remove { card: i64 },
    /// Empty the cram queue
    Clear,
    /// List crammed cards
    List,
}

fn print_record(card: CardId, record: &ReviewRecord, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Plain => println!(
            "card {}: reps {}, EF {:.2}, interval {}d, due {}, grade {}, reviews {}, lapses {}{}",
            card,
            record.repetitions,
            record.easiness_factor,
            record.computed_interval,
            record.review_date,
            record.grade,
            record.reviews,
            record.lapses,
            if record.crammed { ", crammed" } else { "" }
        ),
    }
    Ok(())
}

fn print_records(records: &[(CardId, ReviewRecord)], format: &OutputFormat) -> anyhow::Result<()> {
    if records.is_empty() {
        println!("No cards.");
    }
    for (card, record) in records {
        print_record(*card, record, format)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => SchedulerConfig::default(),
    };

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path))?;
    let today = store.get_current_date()?;
    let scheduler = Scheduler::new(store, FixedClock::new(today), config);
    let learner = LearnerId(cli.learner);
    let format = &cli.format;

    match cli.command {
        Command::Memorize { card, grade } => {
            let record = scheduler.memorize(learner, CardId(card), grade)?;
            print_record(CardId(card), &record, format)?;
        }
        Command::Review { card, grade } => {
            let record = scheduler.review(learner, CardId(card), grade)?;
            print_record(CardId(card), &record, format)?;
        }
        Command::Forget { card } => {
            scheduler.forget(learner, CardId(card))?;
            println!("Card {} forgotten.", card);
        }
        Command::Cram(subcmd) => match subcmd {
            CramCommand::Add { card } => {
                let record = scheduler.add_to_cram(learner, CardId(card))?;
                print_record(CardId(card), &record, format)?;
            }
            CramCommand::Remove { card } => {
                scheduler.remove_from_cram(learner, CardId(card))?;
                println!("Card {} removed from cram.", card);
            }
            CramCommand::Clear => {
                let outcome = scheduler.clear_cram(learner)?;
                println!("Cleared {} cards from cram.", outcome.cleared.len());
                for (card, err) in &outcome.failed {
                    eprintln!("  card {}: {}", card, err);
                }
            }
            CramCommand::List => print_records(&scheduler.cram_queue(learner)?, format)?,
        },
        Command::Distribution { days_range } => {
            let distribution = scheduler.project_distribution(learner, days_range)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&distribution.to_day_counts())?)
                }
                OutputFormat::Plain => {
                    for day in distribution.iter() {
                        println!("+{} {}: {}", day.offset, day.date, day.count);
                    }
                }
            }
        }
        Command::Simulate { card } => {
            let projected = scheduler.simulate_reviews(learner, CardId(card))?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&projected)?),
                OutputFormat::Plain => {
                    for review in &projected {
                        print!("grade {} -> ", review.grade);
                        print_record(CardId(card), &review.record, format)?;
                    }
                }
            }
        }
        Command::Outstanding => print_records(&scheduler.outstanding(learner)?, format)?,
        Command::Show { card, field } => {
            let record = scheduler.get_record(learner, CardId(card))?;
            match field {
                Some(name) => {
                    let field = ReviewField::from_name(&name)
                        .with_context(|| format!("unknown field '{}'", name))?;
                    println!("{}", record.field(field));
                }
                None => print_record(CardId(card), &record, format)?,
            }
        }
        Command::Comment { card, text } => {
            scheduler.set_comment(learner, CardId(card), text)?;
            println!("Comment updated.");
        }
        Command::ImportLegacy { file } => {
            let dump = import_legacy_json(&file)
                .map_err(|e| anyhow::anyhow!("reading {}: {}", file, e))?;
            let report = dump.import_into(&scheduler, learner);
            println!("Imported {} cards.", report.imported.len());
            for (card, err) in &report.rejected {
                eprintln!("  card {} rejected: {}", card, err);
            }
        }
        Command::Export { file } => {
            export_records_to_path(&scheduler.memorized(learner)?, &file)
                .map_err(|e| anyhow::anyhow!("writing {}: {}", file, e))?;
            println!("Exported to {}.", file);
        }
        Command::AdvanceDay => {
            let next_day = scheduler.store().advance_day()?;
            println!("Current date: {}", next_day);
        }
    }

    Ok(())
}
