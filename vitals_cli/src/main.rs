use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;
use vitals_core::channels::dispatcher_from_config;
use vitals_core::stats::{WindowSummary, DEFAULT_WINDOWS};
use vitals_core::*;

#[derive(Parser)]
#[command(name = "vitals")]
#[command(about = "Health measurement, medication and workout reminders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User to act for; optional when only one user is configured
    #[arg(long, global = true)]
    user: Option<String>,

    /// Pretend the current time is this RFC 3339 instant (for testing)
    #[arg(long, global = true, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,

    /// Log every gate decision
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop until interrupted
    Run,

    /// Run a single scheduler pass and report what happened
    Tick,

    /// Measurement reminder controls
    Reminder {
        #[command(subcommand)]
        action: ReminderCommand,
    },

    /// Blood-pressure readings
    Bp {
        #[command(subcommand)]
        action: BpCommand,
    },

    /// Weight readings
    Weight {
        #[command(subcommand)]
        action: WeightCommand,
    },

    /// Sleep records
    Sleep {
        #[command(subcommand)]
        action: SleepCommand,
    },

    /// Day-weighted averages over 14/30/60 days
    Stats {
        /// bp or weight (both when omitted)
        domain: Option<Domain>,
    },

    /// Medications and dose confirmations
    Med {
        #[command(subcommand)]
        action: MedCommand,
    },

    /// Workout groups and sessions
    Workout {
        #[command(subcommand)]
        action: WorkoutCommand,
    },
}

#[derive(Subcommand)]
enum ReminderCommand {
    Enable { domain: Domain },
    Disable { domain: Domain },
    /// Remind me later
    Snooze {
        domain: Domain,
        #[arg(long, default_value_t = 60)]
        minutes: i64,
    },
    /// Not today: no reminders for the next 24 hours
    Suppress { domain: Domain },
    Status { domain: Domain },
}

#[derive(Args)]
struct MeasuredAt {
    /// When the measurement was taken (RFC 3339); defaults to now
    #[arg(long, value_parser = parse_instant)]
    measured_at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum BpCommand {
    Add {
        systolic: i32,
        diastolic: i32,
        #[arg(long)]
        pulse: Option<i32>,
        #[command(flatten)]
        when: MeasuredAt,
    },
    /// Leave a reading out of averages and the dominant category
    Exclude {
        id: Uuid,
        /// Include the reading again
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommand {
    Add {
        kg: f64,
        #[command(flatten)]
        when: MeasuredAt,
    },
}

#[derive(Subcommand)]
enum SleepCommand {
    Add {
        #[arg(long, value_parser = parse_instant)]
        bed: DateTime<Utc>,
        #[arg(long, value_parser = parse_instant)]
        wake: DateTime<Utc>,
        /// 1 (poor) to 5 (great)
        #[arg(long)]
        quality: Option<u8>,
    },
}

#[derive(Subcommand)]
enum MedCommand {
    Add {
        name: String,
        dosage: String,
        /// Daily dose time (HH:MM), repeatable
        #[arg(long = "time", required = true, value_parser = parse_time)]
        times: Vec<NaiveTime>,
    },
    List,
    /// Confirm a dose was taken
    Take {
        id: Uuid,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        /// Local date of the dose (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Snooze {
        id: Uuid,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        minutes: Option<i64>,
    },
}

#[derive(Subcommand)]
enum WorkoutCommand {
    /// Add a recurring workout schedule
    GroupAdd {
        name: String,
        /// Weekdays, comma separated (mon,wed,fri)
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<Weekday>,
        /// Local start time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        /// Minutes of advance notice
        #[arg(long, default_value_t = 30)]
        notice: u32,
        /// Cycle through the group's variants
        #[arg(long)]
        rotating: bool,
    },
    /// Add an exercise set to a group
    VariantAdd {
        group: Uuid,
        name: String,
        #[arg(long = "exercise")]
        exercises: Vec<String>,
        #[arg(long)]
        order: Option<u32>,
    },
    List,
    Next,
    Start { id: Uuid },
    Skip { id: Uuid },
    Snooze {
        id: Uuid,
        #[arg(long)]
        minutes: Option<i64>,
    },
    Complete { id: Uuid },
    /// Start an unscheduled workout right away
    Adhoc { label: String },
    History,
}

/// System time, or a pinned instant from `--at`
enum CliClock {
    System(SystemClock),
    Fixed(FixedClock),
}

impl Clock for CliClock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            CliClock::System(clock) => clock.now(),
            CliClock::Fixed(clock) => clock.now(),
        }
    }
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 timestamp: {}", e))
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        vitals_core::logging::init_with_level("debug");
    } else {
        vitals_core::logging::init();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data.data_dir = data_dir;
    }

    let clock = Arc::new(match cli.at {
        Some(at) => CliClock::Fixed(FixedClock::new(at)),
        None => CliClock::System(SystemClock),
    });
    let store = FileStore::new(config.store_path());
    tracing::debug!("Using store {:?}", store.path());
    let dispatcher = dispatcher_from_config(&config, clock.clone());
    let scheduler = Scheduler::new(store, clock, dispatcher, config);

    match cli.command {
        Commands::Run => {
            let shutdown = AtomicBool::new(false);
            scheduler.run_forever(&shutdown);
            Ok(())
        }
        Commands::Tick => cmd_tick(&scheduler),
        Commands::Reminder { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            cmd_reminder(&scheduler, &user, action)
        }
        Commands::Bp { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            cmd_bp(&scheduler, &user, action)
        }
        Commands::Weight { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            let WeightCommand::Add { kg, when } = action;
            let reading = scheduler.controls().record_weight(&user, kg, when.measured_at)?;
            println!("✓ Recorded {:.1} kg ({})", reading.weight_kg, reading.id);
            Ok(())
        }
        Commands::Sleep { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            let SleepCommand::Add { bed, wake, quality } = action;
            let record = scheduler.controls().record_sleep(&user, bed, wake, quality)?;
            let slept = record.woke_up - record.went_to_bed;
            println!(
                "✓ Recorded {}h{:02}m of sleep",
                slept.num_hours(),
                slept.num_minutes() % 60
            );
            Ok(())
        }
        Commands::Stats { domain } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            cmd_stats(&scheduler, &user, domain)
        }
        Commands::Med { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            cmd_med(&scheduler, &user, action)
        }
        Commands::Workout { action } => {
            let user = resolve_user(scheduler.config(), cli.user.as_deref())?;
            cmd_workout(&scheduler, &user, action)
        }
    }
}

fn resolve_user(config: &Config, requested: Option<&str>) -> Result<String> {
    if let Some(id) = requested {
        return Ok(config.find_user(id)?.id.clone());
    }
    match config.users.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(Error::Config("no users configured".into())),
        _ => Err(Error::Config(
            "several users configured; pass --user".into(),
        )),
    }
}

fn cmd_tick<S: Store, C: Clock>(scheduler: &Scheduler<S, C>) -> Result<()> {
    let report = scheduler.tick();

    for (user, domain) in &report.sent {
        println!("sent {} reminder to {}", domain, user);
    }
    for (user, domain, gate) in &report.blocked {
        println!("{} {}: {}", user, domain, gate);
    }
    for (user, domain, error) in &report.failures {
        eprintln!("failed {} {}: {}", user, domain, error);
    }
    println!(
        "{} sent, {} blocked, {} failed",
        report.sent.len(),
        report.blocked.len(),
        report.failures.len()
    );
    Ok(())
}

fn cmd_reminder<S: Store, C: Clock>(scheduler: &Scheduler<S, C>, user: &str, action: ReminderCommand) -> Result<()> {
    let controls = scheduler.controls();
    let state = match action {
        ReminderCommand::Enable { domain } => controls.set_reminder_enabled(user, domain, true)?,
        ReminderCommand::Disable { domain } => controls.set_reminder_enabled(user, domain, false)?,
        ReminderCommand::Snooze { domain, minutes } => controls.snooze_reminder(user, domain, minutes)?,
        ReminderCommand::Suppress { domain } => controls.suppress_reminder_24h(user, domain)?,
        ReminderCommand::Status { domain } => controls.reminder_state(user, domain)?,
    };

    println!("{} reminders for {}", state.domain, user);
    println!("  Enabled:        {}", if state.enabled { "yes" } else { "no" });
    println!("  Preferred hour: {:02}:00", state.preferred_reminder_hour);
    if let Some(until) = state.snoozed_until {
        println!("  Snoozed until:  {}", until.to_rfc3339());
    }
    if let Some(until) = state.dont_remind_until {
        println!("  Quiet until:    {}", until.to_rfc3339());
    }
    if let Some(sent) = state.last_notification_sent_at {
        println!("  Last reminder:  {}", sent.to_rfc3339());
    }
    Ok(())
}

fn cmd_bp<S: Store, C: Clock>(scheduler: &Scheduler<S, C>, user: &str, action: BpCommand) -> Result<()> {
    let controls = scheduler.controls();
    match action {
        BpCommand::Add {
            systolic,
            diastolic,
            pulse,
            when,
        } => {
            let reading = controls.record_blood_pressure(user, systolic, diastolic, pulse, when.measured_at)?;
            println!(
                "✓ Recorded {}/{} ({}) {}",
                reading.systolic,
                reading.diastolic,
                reading.category().label(),
                reading.id
            );
        }
        BpCommand::Exclude { id, undo } => {
            controls.set_blood_pressure_excluded(user, id, !undo)?;
            if undo {
                println!("✓ Reading {} counts again", id);
            } else {
                println!("✓ Reading {} excluded from calculations", id);
            }
        }
    }
    Ok(())
}

fn cmd_stats<S: Store, C: Clock>(scheduler: &Scheduler<S, C>, user: &str, domain: Option<Domain>) -> Result<()> {
    let controls = scheduler.controls();
    let show_bp = matches!(domain, None | Some(Domain::BloodPressure));
    let show_weight = matches!(domain, None | Some(Domain::Weight));
    if !show_bp && !show_weight {
        return Err(Error::Other("statistics cover bp and weight only".into()));
    }

    if show_bp {
        println!("Blood pressure");
        for (window, summary) in controls.blood_pressure_summary(user, &DEFAULT_WINDOWS)? {
            print_window(window, summary.as_ref(), |s| {
                let pulse = s
                    .rounded(2)
                    .map(|p| format!(", pulse {}", p))
                    .unwrap_or_default();
                format!(
                    "{}/{}{}",
                    s.rounded(0).unwrap_or_default(),
                    s.rounded(1).unwrap_or_default(),
                    pulse
                )
            });
        }
    }
    if show_weight {
        println!("Weight");
        for (window, summary) in controls.weight_summary(user, &DEFAULT_WINDOWS)? {
            print_window(window, summary.as_ref(), |s| {
                format!("{:.1} kg", s.averages.first().copied().flatten().unwrap_or_default())
            });
        }
    }
    Ok(())
}

fn print_window(window: i64, summary: Option<&WindowSummary>, render: impl Fn(&WindowSummary) -> String) {
    match summary {
        Some(s) => println!(
            "  {:>2}d: {} ({} days, {} readings)",
            window,
            render(s),
            s.day_count,
            s.reading_count
        ),
        None => println!("  {:>2}d: no data", window),
    }
}

fn cmd_med<S: Store, C: Clock>(scheduler: &Scheduler<S, C>, user: &str, action: MedCommand) -> Result<()> {
    let controls = scheduler.controls();
    let slot_for = |id: Uuid, time: NaiveTime, date: Option<NaiveDate>| -> Result<DoseSlot> {
        match date {
            Some(date) => Ok(DoseSlot { date, time }),
            None => controls.dose_slot(user, id, time),
        }
    };

    match action {
        MedCommand::Add { name, dosage, times } => {
            let med = controls.add_medication(user, &name, &dosage, times)?;
            println!("✓ Added {} {} ({})", med.name, med.dosage, med.id);
        }
        MedCommand::List => {
            let meds = controls.medications(user)?;
            if meds.is_empty() {
                println!("No medications.");
            }
            for med in meds {
                let times: Vec<String> = med.times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                println!("{}  {} {} at {}", med.id, med.name, med.dosage, times.join(", "));
            }
        }
        MedCommand::Take { id, time, date } => {
            let slot = slot_for(id, time, date)?;
            if controls.confirm_medication_intake(user, id, slot)? {
                println!("✓ Dose of {} taken", slot);
            } else {
                println!("Dose of {} was already confirmed", slot);
            }
        }
        MedCommand::Snooze {
            id,
            time,
            date,
            minutes,
        } => {
            let slot = slot_for(id, time, date)?;
            let until = controls.snooze_medication(user, id, slot, minutes)?;
            println!("✓ Dose of {} snoozed until {}", slot, until.to_rfc3339());
        }
    }
    Ok(())
}

fn cmd_workout<S: Store, C: Clock>(scheduler: &Scheduler<S, C>, user: &str, action: WorkoutCommand) -> Result<()> {
    let controls = scheduler.controls();
    match action {
        WorkoutCommand::GroupAdd {
            name,
            days,
            time,
            notice,
            rotating,
        } => {
            let group = controls.add_workout_group(user, &name, days, time, notice, rotating)?;
            println!("✓ Added workout group {} ({})", group.name, group.id);
        }
        WorkoutCommand::VariantAdd {
            group,
            name,
            exercises,
            order,
        } => {
            let variant = controls.add_workout_variant(user, group, &name, exercises, order)?;
            println!("✓ Added variant {} ({})", variant.name, variant.id);
        }
        WorkoutCommand::List => {
            for (group, variants) in controls.workout_groups(user)? {
                let days: Vec<String> = group.weekdays.iter().map(|d| d.to_string()).collect();
                println!(
                    "{}  {} {} at {}{}",
                    group.id,
                    group.name,
                    days.join(","),
                    group.time_of_day.format("%H:%M"),
                    if group.rotating { " (rotating)" } else { "" }
                );
                for variant in variants {
                    println!("    {}  {} {}", variant.id, variant.name, variant.exercises.join(", "));
                }
            }
        }
        WorkoutCommand::Next => match controls.next_workout(user)? {
            Some(session) => print_session(&controls.describe_session(&session)?, &session),
            None => println!("No upcoming workout."),
        },
        WorkoutCommand::Start { id } => {
            controls.start_session(user, id)?;
            println!("✓ Session {} started", id);
        }
        WorkoutCommand::Skip { id } => {
            controls.skip_session(user, id)?;
            println!("✓ Session {} skipped", id);
        }
        WorkoutCommand::Snooze { id, minutes } => {
            let until = controls.snooze_session(user, id, minutes)?;
            println!("✓ Session {} snoozed until {}", id, until.to_rfc3339());
        }
        WorkoutCommand::Complete { id } => {
            let next = controls.complete_session(user, id)?;
            println!("✓ Session {} completed", id);
            if let Some(variant) = next {
                println!("  Next in rotation: {}", variant);
            }
        }
        WorkoutCommand::Adhoc { label } => {
            let id = controls.start_ad_hoc_session(user, &label)?;
            println!("✓ Started {} ({})", label, id);
        }
        WorkoutCommand::History => {
            let history = controls.workout_history(user)?;
            if history.is_empty() {
                println!("No finished workouts yet.");
            }
            for session in history {
                print_session(&controls.describe_session(&session)?, &session);
            }
        }
    }
    Ok(())
}

fn print_session(names: &(String, Option<String>), session: &WorkoutSession) {
    let (title, variant) = names;
    let variant = variant
        .as_ref()
        .map(|v| format!(" / {}", v))
        .unwrap_or_default();
    println!(
        "{}  {}{}  {}  [{}]",
        session.id,
        title,
        variant,
        session.scheduled_at.to_rfc3339(),
        session.status
    );
}
