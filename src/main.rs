use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nilplayer::config::Config;
use nilplayer::local::{FileKeyValueStore, LocalResume};
use nilplayer::modal::{LinkStatus, check_link};
use nilplayer::models::{CourseCode, ProgressEntry, ProgressSnapshot, SessionId};
use nilplayer::store::{ProgressStore, RestProgressBackend, SaveOutcome};

#[derive(Parser)]
#[command(name = "nilplayer", version, about = "Inspect and repair course watch progress")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remote watch-progress records
    #[command(subcommand)]
    Progress(ProgressCommand),
    /// Media link checks
    #[command(subcommand)]
    Link(LinkCommand),
    /// Device-local audio resume entries
    #[command(subcommand)]
    Resume(ResumeCommand),
}

#[derive(Subcommand)]
enum ProgressCommand {
    Get(SessionArgs),
    /// Percentages for several sessions of one user
    List {
        #[arg(long)]
        user: String,
        #[arg(long = "session", required = true)]
        sessions: Vec<String>,
    },
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        session: String,
        #[arg(long)]
        position: f64,
        #[arg(long)]
        watched: Option<f64>,
        #[arg(long)]
        total: f64,
        #[arg(long)]
        completed: bool,
    },
}

#[derive(Subcommand)]
enum LinkCommand {
    /// Prints `valid` or `expired`
    Check { url: String },
}

#[derive(Subcommand)]
enum ResumeCommand {
    Get(SessionArgs),
    Clear(SessionArgs),
}

#[derive(Args)]
struct SessionArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    session: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nilplayer=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    debug!("Using store at {:?}", config.store.base_url);

    match cli.command {
        Command::Progress(command) => run_progress(&config, command).await,
        Command::Link(LinkCommand::Check { url }) => {
            match check_link(&url, config.playback.disable_url_validation) {
                LinkStatus::Valid => println!("valid"),
                LinkStatus::Expired => println!("expired"),
            }
            Ok(())
        }
        Command::Resume(command) => run_resume(&config, command),
    }
}

async fn run_progress(config: &Config, command: ProgressCommand) -> Result<()> {
    let backend = RestProgressBackend::new(&config.store).context("Invalid store configuration")?;
    let store = ProgressStore::new(Arc::new(backend));

    match command {
        ProgressCommand::Get(args) => {
            let session_id = SessionId::new(args.session);
            match store.load(Some(&args.user), &session_id).await? {
                Some(record) => println!(
                    "{}: position {}s, watched {}s of {}s{}",
                    session_id,
                    record.last_position,
                    record.watched_seconds,
                    record.total_seconds,
                    if record.completed { ", completed" } else { "" }
                ),
                None => println!("{}: no progress", session_id),
            }
        }
        ProgressCommand::List { user, sessions } => {
            let ids: Vec<SessionId> = sessions.into_iter().map(SessionId::new).collect();
            let records = store.load_many(Some(&user), &ids).await?;
            for id in &ids {
                match records.get(id) {
                    Some(record) => {
                        let entry = ProgressEntry::from_record(record);
                        let marker = if entry.is_done() { " (done)" } else { "" };
                        println!("{}\t{}%{}", id, entry.percent, marker);
                    }
                    None => println!("{}\t-", id),
                }
            }
        }
        ProgressCommand::Set {
            user,
            course,
            session,
            position,
            watched,
            total,
            completed,
        } => {
            let snapshot = ProgressSnapshot {
                last_position: position,
                watched_seconds: watched.unwrap_or(position),
                total_seconds: total,
                completed,
            };
            let course = course.map(CourseCode::new);
            let session_id = SessionId::new(session);
            let outcome = store
                .save(Some(&user), course.as_ref(), &session_id, &snapshot)
                .await?;
            if outcome == SaveOutcome::Saved {
                info!("Progress for {} saved", session_id);
            }
        }
    }
    Ok(())
}

fn run_resume(config: &Config, command: ResumeCommand) -> Result<()> {
    let path = config.local_store_path()?;
    let resume = LocalResume::new(Arc::new(FileKeyValueStore::open(path)));

    match command {
        ResumeCommand::Get(args) => {
            let session_id = SessionId::new(args.session);
            println!("{}", resume.read(Some(&args.user), &session_id));
        }
        ResumeCommand::Clear(args) => {
            let session_id = SessionId::new(args.session);
            resume.clear(Some(&args.user), &session_id);
            info!("Resume entry for {} cleared", session_id);
        }
    }
    Ok(())
}
