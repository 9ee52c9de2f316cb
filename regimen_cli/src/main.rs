use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use regimen_core::*;
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "regimen")]
#[command(about = "Medication schedule engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $XDG_CONFIG_HOME/regimen/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override habit file (defaults to <data-dir>/habits.json)
    #[arg(long, global = true)]
    habits: Option<PathBuf>,

    /// Reference date for "today" (YYYY-MM-DD, defaults to the current date)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schedule and print its canonical form
    Validate {
        /// Schedule JSON file, or - for stdin
        schedule: PathBuf,
    },

    /// Show the local time of each dose on a date
    Resolve {
        schedule: PathBuf,

        /// Date to resolve for (defaults to the cycle start)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List expected doses over a date range
    Occurrences {
        schedule: PathBuf,

        /// First date of the range
        #[arg(long)]
        from: NaiveDate,

        /// Number of days in the range
        #[arg(long, default_value_t = 7)]
        days: u32,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write to a file instead of stdout (csv only)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Record a dose in the dose log
    Dose {
        /// Medication id (integer) or name
        medication: String,

        /// When it was taken (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Send a schedule and recorded doses to the matcher
    Match {
        schedule: PathBuf,

        /// Dose log to read (defaults to <data-dir>/doses.jsonl)
        #[arg(long)]
        doses: Option<PathBuf>,
    },

    /// Inspect or edit the habit file
    Habits {
        #[command(subcommand)]
        action: HabitsAction,
    },
}

#[derive(Subcommand)]
enum HabitsAction {
    /// Print the habit context
    Show,
    /// Set the home timezone
    SetTz { tz: String },
    /// Set a habit event time (HH:mm)
    SetEvent { name: String, time: String },
    /// Remove a habit event
    RemoveEvent { name: String },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Resolved paths and settings for one invocation
struct Context {
    config: Config,
    habits_path: PathBuf,
    doses_path: PathBuf,
    today: Option<NaiveDate>,
}

impl Context {
    fn habits(&self) -> Result<HabitContext> {
        HabitContext::load(&self.habits_path, self.config.habits.default_tz)
    }

    fn validator<'h>(&self, habits: &'h HabitContext) -> Validator<'h> {
        match self.today {
            Some(today) => Validator::with_today(habits, today),
            None => Validator::new(habits),
        }
    }

    fn load_schedule(&self, path: &Path, habits: &HabitContext) -> Result<Schedule> {
        let raw = read_json(path)?;
        self.validator(habits).validate(&raw)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    regimen_core::logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error[{}]: {}", e.code(), e);
            if let Error::MatcherRejected { body, .. } = &e {
                eprintln!("{}", body);
            }
            if e.is_validation() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }

    let ctx = Context {
        habits_path: cli.habits.unwrap_or_else(|| config.data.habits_path()),
        doses_path: config.data.doses_path(),
        today: cli.today,
        config,
    };

    match cli.command {
        Commands::Validate { schedule } => cmd_validate(&ctx, &schedule),
        Commands::Resolve { schedule, date } => cmd_resolve(&ctx, &schedule, date),
        Commands::Occurrences {
            schedule,
            from,
            days,
            format,
            output,
        } => cmd_occurrences(&ctx, &schedule, DateRange::days(from, days), format, output),
        Commands::Dose { medication, at } => cmd_dose(&ctx, &medication, at),
        Commands::Match { schedule, doses } => cmd_match(&ctx, &schedule, doses),
        Commands::Habits { action } => cmd_habits(&ctx, action),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&contents)?)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_validate(ctx: &Context, path: &Path) -> Result<()> {
    let habits = ctx.habits()?;
    let schedule = ctx.load_schedule(path, &habits)?;
    print_json(&schedule.to_raw(&habits))
}

fn describe(spec: &TimeSpec) -> String {
    match spec {
        TimeSpec::Event { event, when } => format!("{} {}", when.as_str(), event),
        TimeSpec::Exact { utc } => format!("exact ({} UTC)", utc),
    }
}

fn cmd_resolve(ctx: &Context, path: &Path, date: Option<NaiveDate>) -> Result<()> {
    let habits = ctx.habits()?;
    let schedule = ctx.load_schedule(path, &habits)?;
    let resolved = resolve(&schedule, &habits);
    let date = date.unwrap_or_else(|| schedule.cycle_start());

    if !schedule.is_regular() {
        println!("As needed: no scheduled times.");
        return Ok(());
    }

    println!("Times on {} ({}):", date, habits.tz);
    for time in resolved.times_on(date) {
        println!("  {}  {}", time.local_time, describe(&time.spec));
    }
    Ok(())
}

fn cmd_occurrences(
    ctx: &Context,
    path: &Path,
    range: DateRange,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    if output.is_some() && format != OutputFormat::Csv {
        return Err(Error::Config("--output requires --format csv".into()));
    }

    let habits = ctx.habits()?;
    let schedule = ctx.load_schedule(path, &habits)?;
    let resolved = resolve(&schedule, &habits);
    let occurrences = generate(&resolved, range);

    match format {
        OutputFormat::Csv => {
            let count = match output {
                Some(out) => regimen_core::export::export_to_path(&out, occurrences)?,
                None => regimen_core::export::write_csv(io::stdout().lock(), occurrences)?,
            };
            tracing::info!("{} occurrence(s) written", count);
        }
        OutputFormat::Json => {
            print_json(&occurrences.collect::<Vec<_>>())?;
        }
        OutputFormat::Table => {
            let mut count = 0;
            for o in occurrences {
                println!(
                    "{}  {}  {:<24} {}",
                    o.date,
                    o.local_time,
                    describe(&o.source),
                    o.instant.to_rfc3339()
                );
                count += 1;
            }
            if count == 0 {
                println!("No occurrences between {} and {}.", range.start, range.end);
            }
        }
    }
    Ok(())
}

fn parse_medication(raw: &str) -> MedicationRef {
    raw.parse::<i64>()
        .map(MedicationRef::Id)
        .unwrap_or_else(|_| MedicationRef::Name(raw.to_string()))
}

fn cmd_dose(ctx: &Context, medication: &str, at: Option<DateTime<Utc>>) -> Result<()> {
    let dose = Dose::new(parse_medication(medication), at.unwrap_or_else(Utc::now));
    let mut log = JsonlDoseLog::new(&ctx.doses_path);
    log.append(&dose)?;

    println!("✓ Dose recorded: {} at {}", dose.medication_id, dose.taken_at.to_rfc3339());
    Ok(())
}

fn cmd_match(ctx: &Context, path: &Path, doses_path: Option<PathBuf>) -> Result<()> {
    let habits = ctx.habits()?;
    let schedule = ctx.load_schedule(path, &habits)?;
    let resolved = resolve(&schedule, &habits);

    let doses = read_doses(doses_path.as_deref().unwrap_or(&ctx.doses_path))?;
    let matcher = HttpMatcher::from_config(&ctx.config.matcher)?;
    let verdicts = MatchingGateway::new(matcher).submit(&resolved, &doses)?;
    print_json(&verdicts)
}

fn cmd_habits(ctx: &Context, action: HabitsAction) -> Result<()> {
    let path = &ctx.habits_path;
    let fallback = ctx.config.habits.default_tz;

    let habits = match action {
        HabitsAction::Show => ctx.habits()?,
        HabitsAction::SetTz { tz } => {
            let tz = tz
                .parse()
                .map_err(|_| Error::Config(format!("unknown timezone {:?}", tz)))?;
            HabitContext::update(path, fallback, |h| {
                h.tz = tz;
                Ok(())
            })?
        }
        HabitsAction::SetEvent { name, time } => {
            let time: TimeOfDay = time
                .parse()
                .map_err(|e| Error::Config(format!("{}", e)))?;
            HabitContext::update(path, fallback, |h| {
                h.events.insert(name, time);
                Ok(())
            })?
        }
        HabitsAction::RemoveEvent { name } => HabitContext::update(path, fallback, |h| {
            if h.events.remove(&name).is_none() {
                tracing::warn!("No habit event named {:?}", name);
            }
            Ok(())
        })?,
    };

    print_json(&habits)
}
