use std::collections::HashMap;
use std::fmt;

use services::{Clock, SessionRuntimeService, StartRequest};
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;
use workout_core::model::{
    DayId, ExerciseId, ExerciseMeta, ExerciseSlot, GroupKind, RepRange, RestOverrides, RestPlan,
    RoutineDay, RoutineGroup, RoutineId, SessionId, SessionView, UserId,
};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    MissingSessionId,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingSessionId => write!(f, "finish requires --session <id>"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(flag: &'static str, raw: &str) -> Result<u64, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId {
        flag,
        raw: raw.to_string(),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed   [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- start  [--db <sqlite_url>] [--user <id>] [--routine <id>] [--day <id>]");
    eprintln!("  cargo run -p app -- show   [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- finish [--db <sqlite_url>] [--user <id>] --session <id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!("  --user 1, --routine 1, --day 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WORKOUT_DB_URL, WORKOUT_USER_ID");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Start,
    Show,
    Finish,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "start" => Some(Self::Start),
            "show" => Some(Self::Show),
            "finish" => Some(Self::Finish),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    routine_id: RoutineId,
    day_id: DayId,
    session_id: Option<SessionId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("WORKOUT_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("WORKOUT_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut routine_id = RoutineId::new(1);
        let mut day_id = DayId::new(1);
        let mut session_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = UserId::new(parse_id("--user", &value)?);
                }
                "--routine" => {
                    let value = require_value(args, "--routine")?;
                    routine_id = RoutineId::new(parse_id("--routine", &value)?);
                }
                "--day" => {
                    let value = require_value(args, "--day")?;
                    day_id = DayId::new(parse_id("--day", &value)?);
                }
                "--session" => {
                    let value = require_value(args, "--session")?;
                    session_id = Some(SessionId::new(parse_id("--session", &value)?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            routine_id,
            day_id,
            session_id,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// A two-group demo day: a bench/row superset plus straight squat sets.
fn demo_day(routine_id: RoutineId, day_id: DayId) -> RoutineDay {
    RoutineDay {
        routine_id,
        day_id,
        groups: vec![
            RoutineGroup {
                kind: GroupKind::Superset2,
                rounds_total: 3,
                rest: RestPlan {
                    between_exercises_seconds: 15,
                    after_round_seconds: 120,
                    after_set_seconds: 90,
                },
                slots: vec![
                    ExerciseSlot {
                        exercise_id: ExerciseId::new(1),
                        target_sets_per_round: 1,
                        rep_range: RepRange::new(8, 12).expect("valid range"),
                        notes: Some("pause at the chest".to_string()),
                    },
                    ExerciseSlot {
                        exercise_id: ExerciseId::new(2),
                        target_sets_per_round: 1,
                        rep_range: RepRange::new(10, 15).expect("valid range"),
                        notes: None,
                    },
                ],
            },
            RoutineGroup {
                kind: GroupKind::Single,
                rounds_total: 4,
                rest: RestPlan {
                    between_exercises_seconds: 0,
                    after_round_seconds: 180,
                    after_set_seconds: 180,
                },
                slots: vec![ExerciseSlot {
                    exercise_id: ExerciseId::new(3),
                    target_sets_per_round: 1,
                    rep_range: RepRange::new(5, 8).expect("valid range"),
                    notes: None,
                }],
            },
        ],
    }
}

fn demo_exercises() -> Vec<ExerciseMeta> {
    vec![
        ExerciseMeta {
            id: ExerciseId::new(1),
            name: "Bench Press".to_string(),
            description: Some("Barbell flat bench".to_string()),
            media_url: None,
        },
        ExerciseMeta {
            id: ExerciseId::new(2),
            name: "Bent-Over Row".to_string(),
            description: None,
            media_url: None,
        },
        ExerciseMeta {
            id: ExerciseId::new(3),
            name: "Back Squat".to_string(),
            description: None,
            media_url: None,
        },
    ]
}

fn print_view(view: &SessionView) {
    let names: HashMap<ExerciseId, &str> = view
        .exercises
        .iter()
        .map(|e| (e.id, e.name.as_str()))
        .collect();

    let session = &view.session;
    println!(
        "session {} [{}] routine {} day {} started {}",
        session.id,
        session.status.as_str(),
        session.routine_id,
        session.day_id,
        session.started_at
    );
    println!(
        "pointer: group {} exercise {} round {}",
        session.pointer.group_index, session.pointer.exercise_index, session.pointer.round_index
    );
    for (gi, group) in session.groups.iter().enumerate() {
        println!(
            "  group {gi}: {} x{} rounds",
            group.kind.as_str(),
            group.rounds_total
        );
        for item in &group.items {
            let name = names.get(&item.exercise_id).copied().unwrap_or("?");
            let done = item.sets.iter().filter(|s| s.is_done).count();
            println!(
                "    item {} {} ({}-{} reps): {done}/{} sets done",
                item.id,
                name,
                item.rep_range.min(),
                item.rep_range.max(),
                item.sets.len()
            );
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let repo = SqliteRepository::connect(&parsed.db_url).await?;
    repo.migrate().await?;

    match cmd {
        Command::Seed => {
            let day = demo_day(parsed.routine_id, parsed.day_id);
            repo.seed_routine_day(parsed.user_id, "Push/Pull Demo", &day)
                .await?;
            for meta in demo_exercises() {
                repo.seed_exercise(&meta).await?;
            }
            println!(
                "seeded routine {} day {} for user {} (db={})",
                parsed.routine_id, parsed.day_id, parsed.user_id, parsed.db_url
            );
            Ok(())
        }
        Command::Start => {
            let service =
                SessionRuntimeService::from_storage(Clock::default_clock(), &Storage::from_sqlite(repo));
            let view = service
                .start(
                    parsed.user_id,
                    StartRequest {
                        routine_id: parsed.routine_id,
                        day_id: parsed.day_id,
                        overrides: RestOverrides::default(),
                    },
                )
                .await?;
            print_view(&view);
            Ok(())
        }
        Command::Show => {
            let service =
                SessionRuntimeService::from_storage(Clock::default_clock(), &Storage::from_sqlite(repo));
            match service.get_active(parsed.user_id).await? {
                Some(view) => print_view(&view),
                None => println!("no active session for user {}", parsed.user_id),
            }
            Ok(())
        }
        Command::Finish => {
            let session_id = parsed.session_id.ok_or(ArgsError::MissingSessionId)?;
            let service =
                SessionRuntimeService::from_storage(Clock::default_clock(), &Storage::from_sqlite(repo));
            let view = service.finish(parsed.user_id, session_id).await?;
            print_view(&view);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
