use std::fmt;

use exam_core::model::{TestId, UserId};
use services::session::UpdateCause;
use services::{
    Clock, DriverExit, EngineConfig, ExamService, SessionCommand, SessionDriver, SessionSnapshot,
    Severity,
};
use storage::http::{HttpConfig, HttpConfigError};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingRequired { flag: &'static str, env: &'static str },
    UnknownArg(String),
    InvalidOutboxUrl { raw: String },
    Http(HttpConfigError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingRequired { flag, env } => {
                write!(f, "{flag} is required (or set {env})")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidOutboxUrl { raw } => write!(f, "invalid --outbox value: {raw}"),
            ArgsError::Http(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --api <url> --user <id> --test <id> [--outbox <sqlite_url>] [--retake]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_API_TIMEOUT_SECS");
    eprintln!("  EXAM_USER_ID, EXAM_TEST_ID, EXAM_OUTBOX_URL");
    eprintln!("  EXAM_TICK_SECS, EXAM_AUTOSAVE_SECS, EXAM_CLOCK_RESYNC_SECS, EXAM_REDIRECT_DELAY_SECS");
    eprintln!("  RUST_LOG (default: info)");
    eprintln!();
    eprintln!("Commands on stdin:");
    eprintln!("  n | next         p | prev         j <n> | jump <n>");
    eprintln!("  s <subject>      r | review       o <n> | select <n>");
    eprintln!("  t <n> | toggle <n>                i <text> | input <text>");
    eprintln!("  c | clear        submit           q | quit");
}

#[derive(Debug, Clone)]
struct Args {
    http: HttpConfig,
    user_id: UserId,
    test_id: TestId,
    outbox_url: Option<String>,
    retake: bool,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let mut api = non_empty("EXAM_API_BASE_URL");
        let mut user = non_empty("EXAM_USER_ID");
        let mut test = non_empty("EXAM_TEST_ID");
        let mut outbox_url = non_empty("EXAM_OUTBOX_URL");
        let mut retake = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => api = Some(require_value(args, "--api")?),
                "--user" => user = Some(require_value(args, "--user")?),
                "--test" => test = Some(require_value(args, "--test")?),
                "--outbox" => outbox_url = Some(require_value(args, "--outbox")?),
                "--retake" => retake = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let api = api.ok_or(ArgsError::MissingRequired {
            flag: "--api",
            env: "EXAM_API_BASE_URL",
        })?;
        let http = HttpConfig::new(api)
            .with_overrides(&env)
            .map_err(ArgsError::Http)?;
        Ok(Self {
            http,
            user_id: UserId::new(user.ok_or(ArgsError::MissingRequired {
                flag: "--user",
                env: "EXAM_USER_ID",
            })?),
            test_id: TestId::new(test.ok_or(ArgsError::MissingRequired {
                flag: "--test",
                env: "EXAM_TEST_ID",
            })?),
            outbox_url: outbox_url.map(normalize_sqlite_url),
            retake,
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
        .ok_or_else(|| ArgsError::InvalidOutboxUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidOutboxUrl {
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

/// Parse one stdin line. `Ok(None)` means the candidate asked to quit.
fn parse_command(line: &str) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let number = || -> Result<usize, String> {
        rest.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| format!("expected a number from 1, got {rest:?}"))
    };
    let command = match word {
        "n" | "next" => SessionCommand::Next,
        "p" | "prev" => SessionCommand::Prev,
        "j" | "jump" => SessionCommand::Jump(number()?),
        "s" | "subject" if !rest.is_empty() => SessionCommand::ChangeSubject(rest.to_string()),
        "r" | "review" => SessionCommand::MarkForReview,
        "o" | "select" => SessionCommand::SelectOption(number()?),
        "t" | "toggle" => SessionCommand::ToggleOption(number()?),
        "i" | "input" => SessionCommand::InputText(rest.to_string()),
        "c" | "clear" => SessionCommand::ClearAnswer,
        "submit" => SessionCommand::Submit,
        "q" | "quit" => return Ok(None),
        other => return Err(format!("unknown command: {other:?}")),
    };
    Ok(Some(command))
}

fn render(snapshot: &SessionSnapshot) {
    for notice in &snapshot.notices {
        match notice.severity() {
            Severity::Blocking => println!("!! {notice}"),
            Severity::Transient => println!("-- {notice}"),
        }
    }
    if let Some(error) = &snapshot.error {
        println!("!! {error}");
    }
    let quiet_tick = snapshot.cause == UpdateCause::Tick && snapshot.remaining_secs % 60 != 0;
    if quiet_tick || matches!(snapshot.cause, UpdateCause::Sync | UpdateCause::Autosave) {
        return;
    }
    let (mins, secs) = (snapshot.remaining_secs / 60, snapshot.remaining_secs % 60);
    let p = &snapshot.progress;
    println!(
        "[{mins:02}:{secs:02}] {} #{} | answered {} review {} skipped {} unseen {} unsynced {}",
        snapshot.subject,
        snapshot.position.index + 1,
        p.answered + p.review_answered,
        p.review + p.review_answered,
        p.skipped,
        p.not_visited,
        p.unsynced,
    );
    if snapshot.cause == UpdateCause::Tick {
        return;
    }
    if let Some(question) = &snapshot.question {
        if let Some(reason) = &question.unavailable_reason {
            println!("  (question unavailable: {reason})");
            return;
        }
        println!("  {}", question.text);
        for (i, option) in question.options.iter().enumerate() {
            println!("   {}. {option}", i + 1);
        }
        println!("  answer: {:?}  marked: {:?}", question.answer, question.marked_as);
    }
}

async fn read_commands(commands: mpsc::Sender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Some(command)) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(message) => println!("?? {message}"),
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv, |key| std::env::var(key).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let config = EngineConfig::from_env()?;

    let mut storage = Storage::http(parsed.http.clone())?;
    if let Some(url) = &parsed.outbox_url {
        prepare_sqlite_file(url)?;
        storage = storage.with_sqlite_outbox(url).await?;
    }

    let service = ExamService::new(Clock::default_clock(), storage).with_config(config);
    let session = if parsed.retake {
        service
            .start_retake(&parsed.test_id, &parsed.user_id)
            .await?
    } else {
        service
            .start_session(&parsed.test_id, &parsed.user_id)
            .await?
    };
    println!(
        "{}: {} questions, {} minutes",
        session.test().title,
        session.progress().total,
        session.test().duration_minutes
    );

    let (command_tx, command_rx) = mpsc::channel(32);
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(command_tx));
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = update_rx.recv().await {
            render(&snapshot);
        }
    });

    let mut driver = SessionDriver::new(session, config);
    let exit = driver.run(command_rx, update_tx).await;
    drop(driver);
    printer.await?;

    match exit {
        DriverExit::Submitted(outcome) => {
            tokio::time::sleep(outcome.redirect_after).await;
            println!("Submitted at {}.", outcome.submitted_at);
        }
        DriverExit::Closed => println!("Session closed; progress is saved."),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn argv(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn flags_override_environment() {
        let parsed = Args::parse(
            &mut argv(&["--user", "u9", "--retake"]),
            env(&[
                ("EXAM_API_BASE_URL", "https://exam.example.com"),
                ("EXAM_USER_ID", "u1"),
                ("EXAM_TEST_ID", "t1"),
            ]),
        )
        .unwrap();
        assert_eq!(parsed.user_id, UserId::new("u9"));
        assert_eq!(parsed.test_id, TestId::new("t1"));
        assert_eq!(parsed.http.base_url, "https://exam.example.com");
        assert!(parsed.retake);
        assert!(parsed.outbox_url.is_none());
    }

    #[test]
    fn missing_required_values_are_reported() {
        let err = Args::parse(&mut argv(&["--api", "http://x"]), env(&[])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingRequired { flag: "--user", .. }));
        let err = Args::parse(&mut argv(&["--test"]), env(&[])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingValue { flag: "--test" }));
        let err = Args::parse(&mut argv(&["--db", "x"]), env(&[])).unwrap_err();
        assert!(matches!(err, ArgsError::UnknownArg(_)));
    }

    #[test]
    fn bad_api_timeout_is_an_argument_error() {
        let err = Args::parse(
            &mut argv(&["--api", "http://x", "--user", "u1", "--test", "t1"]),
            env(&[("EXAM_API_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ArgsError::Http(HttpConfigError::InvalidTimeout { .. })));
    }

    #[test]
    fn outbox_paths_become_absolute_sqlite_urls() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:/tmp/outbox.db".into()),
            "sqlite:///tmp/outbox.db"
        );
    }

    #[test]
    fn stdin_commands_use_one_based_numbers() {
        assert_eq!(parse_command("o 1"), Ok(Some(SessionCommand::SelectOption(0))));
        assert_eq!(parse_command(" jump 3 "), Ok(Some(SessionCommand::Jump(2))));
        assert_eq!(
            parse_command("s Physics"),
            Ok(Some(SessionCommand::ChangeSubject("Physics".into())))
        );
        assert_eq!(
            parse_command("i 9.81 m/s"),
            Ok(Some(SessionCommand::InputText("9.81 m/s".into())))
        );
        assert_eq!(parse_command("quit"), Ok(None));
        assert!(parse_command("o 0").is_err());
        assert!(parse_command("s").is_err());
        assert!(parse_command("dance").is_err());
    }
}
