use std::{
    collections::HashMap,
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    sync::mpsc,
    thread,
};

use clap::{command, Parser, Subcommand};
use lifetimer::{
    alarm::parse_time, AlarmBuilder, AlarmDue, AlarmId, AlarmService, AlarmStore, Config,
    DueSource, Event, FileBlobStore, InMemoryScheduler, Lifecycle, RepeatPolicy, SystemClock,
};

type CliStore = AlarmStore<FileBlobStore, InMemoryScheduler, SystemClock>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// config file to use instead of the platform default
    #[clap(long, short)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default config
    Init {
        #[clap(long, short)]
        force: bool,
    },
    List,
    Add {
        /// HH:MM, 24 hour clock
        time: String,
        /// once, daily, weekdays, weekends, never or a list like mon,wed
        #[clap(long, short, default_value = "weekdays")]
        repeat: RepeatPolicy,
        #[clap(long, short, default_value_t = 0.8)]
        volume: f64,
        #[clap(long)]
        disabled: bool,
    },
    Edit {
        /// alarm id or a unique prefix of it
        id: String,
        #[clap(long, short)]
        time: Option<String>,
        #[clap(long, short)]
        repeat: Option<RepeatPolicy>,
        #[clap(long, short)]
        volume: Option<f64>,
        #[clap(long)]
        enabled: Option<bool>,
    },
    Remove {
        id: String,
    },
    Toggle {
        id: String,
    },
    /// ring alarms as they come due; reads `stop <id>`, `snooze <id> [minutes]`
    /// and `quit` from stdin
    Watch,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    if let Err(e) = simple_file_logger::init_logger!("lifetimer") {
        eprintln!("couldn't initialize logger: {e:?}");
    }

    let args = Args::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    if let Some(Command::Init { force }) = args.command {
        if force || !config_path.exists() {
            Config::new().save(config_path.clone())?;
            println!("wrote {}", config_path.display());
        } else {
            println!("{} already exists, use --force to overwrite", config_path.display());
        }
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let mut store = AlarmStore::open(
        FileBlobStore::new(config.data_path()?),
        InMemoryScheduler::new(),
        SystemClock,
        config.seed_sample_alarms,
    );

    match args.command.unwrap_or(Command::List) {
        Command::Init { .. } => {}
        Command::List => list(&store),
        Command::Add {
            time,
            repeat,
            volume,
            disabled,
        } => {
            let (hour, minute) = parse_time(&time)?;
            let alarm = AlarmBuilder::new()
                .time(hour, minute)
                .repeat(repeat)
                .volume(volume)
                .enabled(!disabled)
                .build(chrono::Utc::now())?;
            println!("added {} {alarm}", short_id(&alarm.id()));
            store.add(alarm);
        }
        Command::Edit {
            id,
            time,
            repeat,
            volume,
            enabled,
        } => {
            let id = resolve(&store, &id)?;
            let Some(mut alarm) = store.get(&id).cloned() else {
                return Ok(());
            };
            if let Some(time) = time {
                let (hour, minute) = parse_time(&time)?;
                alarm.set_time(hour, minute)?;
            }
            if let Some(repeat) = repeat {
                alarm.set_repeat(repeat);
            }
            if let Some(volume) = volume {
                alarm.set_volume(volume)?;
            }
            if let Some(enabled) = enabled {
                alarm.set_enabled(enabled);
            }
            store.update(alarm);
            list(&store);
        }
        Command::Remove { id } => {
            let id = resolve(&store, &id)?;
            store.delete(&id);
        }
        Command::Toggle { id } => {
            let id = resolve(&store, &id)?;
            store.toggle(&id);
            list(&store);
        }
        Command::Watch => watch(store, &config)?,
    }
    Ok(())
}

fn short_id(id: &AlarmId) -> String {
    id.simple().to_string()[..8].to_string()
}

fn list(store: &CliStore) {
    if store.is_empty() {
        println!("no alarms");
    }
    let now = chrono::Local::now();
    for alarm in store.alarms() {
        match alarm.next_occurrence(&now) {
            Some(next) => println!(
                "{}  {alarm}  next: {}",
                short_id(&alarm.id()),
                next.format("%a %d %b %H:%M")
            ),
            None => println!("{}  {alarm}", short_id(&alarm.id())),
        }
    }
}

/// Ids are matched on their hyphen-less lowercase form, so `8FAA-1b`
/// matches `8faa1b..`.
fn matches_prefix(id: &AlarmId, prefix: &str) -> bool {
    let prefix = prefix.replace('-', "").to_ascii_lowercase();
    id.simple().to_string().starts_with(&prefix)
}

/// The only id among `ids` that starts with `prefix`.
fn unique_match(
    ids: impl IntoIterator<Item = AlarmId>,
    prefix: &str,
) -> Result<AlarmId, String> {
    let mut matches = ids.into_iter().filter(|id| matches_prefix(id, prefix));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(id),
        (None, _) => Err(format!("no alarm matches {prefix:?}")),
        (Some(_), Some(_)) => Err(format!("{prefix:?} matches more than one alarm")),
    }
}

fn resolve(store: &CliStore, prefix: &str) -> Result<AlarmId, String> {
    unique_match(store.alarms().iter().map(lifetimer::AlarmRecord::id), prefix)
}

fn watch(store: CliStore, config: &Config) -> Result<(), Box<dyn Error>> {
    let labels: HashMap<AlarmId, String> = store
        .alarms()
        .iter()
        .map(|alarm| (alarm.id(), alarm.to_string()))
        .collect();
    let snooze_minutes = config.snooze_minutes;
    let service = AlarmService::with_config(store, config);

    let (events, inbox) = mpsc::channel();
    let (outbox, rings) = mpsc::channel::<AlarmDue>();
    let worker = thread::spawn(move || service.run(&inbox, &outbox).store().len());
    let printer_labels = labels.clone();
    let printer = thread::spawn(move || {
        for due in rings {
            let label = printer_labels.get(&due.id).map_or("?", String::as_str);
            let how = match due.source {
                DueSource::Scanner => "caught by scanner",
                DueSource::Notification => "notification",
                DueSource::Snooze => "snoozed",
            };
            println!("ALARM {} {label} ({how})", short_id(&due.id));
        }
    });

    events.send(Event::Lifecycle(Lifecycle::BecameActive))?;
    println!("watching alarms, type `stop <id>`, `snooze <id> [minutes]` or `quit`");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let event = match (words.next(), words.next(), words.next()) {
            (Some("quit" | "q"), _, _) => break,
            (Some("stop"), Some(id), _) => find(&labels, id).map(Event::Stop),
            (Some("snooze"), Some(id), minutes) => find(&labels, id).map(|id| Event::Snooze {
                id,
                delay_minutes: minutes
                    .and_then(|minutes| minutes.parse().ok())
                    .unwrap_or(snooze_minutes),
            }),
            (None, _, _) => continue,
            _ => None,
        };
        match event {
            Some(event) => events.send(event)?,
            None => println!("didn't understand {line:?}"),
        }
    }
    events.send(Event::Shutdown)?;
    match worker.join() {
        Ok(count) => log::info!("watch finished with {count} alarms"),
        Err(_) => log::error!("alarm service thread panicked"),
    }
    // the printer ends once the service drops its outbox
    if printer.join().is_err() {
        log::error!("alarm printer thread panicked");
    }
    Ok(())
}

fn find(labels: &HashMap<AlarmId, String>, prefix: &str) -> Option<AlarmId> {
    match unique_match(labels.keys().copied(), prefix) {
        Ok(id) => Some(id),
        Err(e) => {
            println!("{e}");
            None
        }
    }
}
