use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use miles_coach::providers::create_client;
use miles_coach::{ChatService, Coach, GoalService, ProfileService, RitualService};
use miles_core::{
    AuthSession, MilesConfig, MilestonePatch, NewGoal, NewMilestone, RitualKind, StoreBackend,
    Timeframe,
};
use miles_store::{DocumentStore, SqliteStore, Store};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod render;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "miles.toml")]
    config: PathBuf,

    /// Database path (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Storage backend: sqlite or document (overrides config)
    #[arg(long)]
    backend: Option<String>,

    /// Signed-in user id
    #[arg(long, env = "MILES_USER", default_value = "local")]
    user: String,

    /// Email recorded on first sign-in
    #[arg(long, env = "MILES_EMAIL", default_value = "local@localhost")]
    email: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage goals and milestones
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Talk to Miles (type 'quit' to exit)
    Chat,
    /// Show motivations Miles has picked up from your conversations
    Motivations,
    /// Get a short coaching tip
    Tip {
        #[arg(long)]
        mood: Option<String>,
    },
    /// Daily morning and evening rituals
    #[command(subcommand)]
    Ritual(RitualCommand),
}

#[derive(Subcommand, Debug)]
enum RitualCommand {
    /// Show which of today's rituals are done
    Status,
    /// Check off today's morning or evening ritual
    Done {
        /// morning or evening
        kind: String,
        /// Intention (morning) or reflection (evening)
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum GoalCommand {
    /// Create a goal
    New {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Milestone title (repeatable)
        #[arg(long = "milestone")]
        milestones: Vec<String>,
    },
    /// List your goals
    List,
    /// Show one goal with its milestones
    Show { id: String },
    /// Delete a goal
    Rm { id: String },
    /// Add a milestone to a goal
    MilestoneAdd { id: String, title: String },
    /// Update a milestone
    MilestoneSet {
        id: String,
        milestone_id: String,
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        completed: Option<bool>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a milestone
    MilestoneRm { id: String, milestone_id: String },
    /// Split the first stalled milestone of a goal
    Adjust { id: String },
    /// Ask Miles for milestone ideas
    Suggest {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Progress summary across your goals
    Summary {
        /// week, month or all
        #[arg(long, default_value = "all")]
        timeframe: String,
    },
}

struct App {
    user_id: String,
    goals: GoalService,
    chat: ChatService,
    rituals: RitualService,
    coach: Arc<Coach>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn open_store(config: &MilesConfig) -> Result<Arc<dyn Store>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            info!("Opening database at {}", config.store.db_path);
            let store = SqliteStore::new(&config.store.db_path)
                .await
                .with_context(|| format!("Failed to open database {}", config.store.db_path))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Document => {
            warn!("Document backend is in-memory; nothing survives this process");
            Ok(Arc::new(DocumentStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = MilesConfig::load_or_default(&args.config);
    if let Some(db) = &args.db {
        config.store.db_path = db.clone();
    }
    if let Some(backend) = &args.backend {
        config.store.backend = StoreBackend::parse_str(backend)
            .with_context(|| format!("Unknown backend: {}", backend))?;
    }

    let store = open_store(&config).await?;
    let coach = Arc::new(Coach::from_parts(
        create_client(&config.llm)?,
        config.llm.clone(),
    ));

    let profiles = ProfileService::new(store.clone());
    let session = AuthSession {
        user_id: args.user.clone(),
        email: args.email.clone(),
    };
    profiles.record_sign_in(&session, None).await?;

    let app = App {
        user_id: args.user,
        goals: GoalService::new(store.clone(), coach.clone())
            .with_stall_policy(config.coaching.stall_policy()),
        chat: ChatService::with_config(store.clone(), coach.clone(), config.coaching.clone()),
        rituals: RitualService::new(store),
        coach,
    };

    match args.command {
        Command::Goal(cmd) => run_goal(&app, cmd).await,
        Command::Chat => run_chat(&app).await,
        Command::Motivations => {
            let motivations = app.chat.list_motivations(&app.user_id).await?;
            if motivations.is_empty() {
                println!("No motivations yet. Chat with Miles and they'll show up here.");
            }
            for m in motivations {
                println!("- {}", m.text);
            }
            Ok(())
        }
        Command::Tip { mood } => {
            let goals = app.goals.list_goals(&app.user_id).await?;
            println!("{}", app.chat.coaching_tip(&goals, mood.as_deref()).await);
            Ok(())
        }
        Command::Ritual(cmd) => run_ritual(&app, cmd).await,
    }
}

async fn run_ritual(app: &App, cmd: RitualCommand) -> Result<()> {
    match cmd {
        RitualCommand::Status => {
            let day = app.rituals.today(&app.user_id).await?;
            for kind in RitualKind::ALL {
                println!("{}", render::ritual_line(kind, day.get(kind)));
            }
        }
        RitualCommand::Done { kind, note } => {
            let kind = RitualKind::parse_str(&kind)
                .with_context(|| format!("Unknown ritual: {} (expected morning or evening)", kind))?;
            let done = app
                .rituals
                .complete_ritual(&app.user_id, kind, note.as_deref())
                .await?;
            println!("{}", render::ritual_line(kind, Some(&done)));
        }
    }
    Ok(())
}

async fn run_goal(app: &App, cmd: GoalCommand) -> Result<()> {
    let goals = &app.goals;
    match cmd {
        GoalCommand::New {
            title,
            description,
            milestones,
        } => {
            let input = NewGoal {
                title,
                description,
                milestones: milestones.into_iter().map(NewMilestone::titled).collect(),
            };
            let goal = goals.create_goal(&app.user_id, input).await?;
            print!("{}", render::goal_detail(&goal));
        }
        GoalCommand::List => {
            let list = goals.list_goals(&app.user_id).await?;
            if list.is_empty() {
                println!("No goals yet. Create one with `miles goal new --title ...`.");
            }
            for goal in &list {
                println!("{}", render::goal_line(goal));
            }
        }
        GoalCommand::Show { id } => match goals.get_goal(&id).await? {
            Some(goal) => print!("{}", render::goal_detail(&goal)),
            None => println!("Goal {} not found", id),
        },
        GoalCommand::Rm { id } => {
            goals.delete_goal(&id).await?;
            println!("Deleted {}", id);
        }
        GoalCommand::MilestoneAdd { id, title } => {
            let goal = goals.add_milestone(&id, NewMilestone::titled(title)).await?;
            print!("{}", render::goal_detail(&goal));
        }
        GoalCommand::MilestoneSet {
            id,
            milestone_id,
            progress,
            completed,
            title,
        } => {
            let patch = MilestonePatch {
                title,
                completed,
                progress,
            };
            let goal = goals.update_milestone(&id, &milestone_id, patch).await?;
            print!("{}", render::goal_detail(&goal));
        }
        GoalCommand::MilestoneRm { id, milestone_id } => {
            let goal = goals.delete_milestone(&id, &milestone_id).await?;
            print!("{}", render::goal_detail(&goal));
        }
        GoalCommand::Adjust { id } => match goals.adjust_milestones(&id).await? {
            Some(goal) => print!("{}", render::goal_detail(&goal)),
            None => println!("Goal {} not found", id),
        },
        GoalCommand::Suggest { title, description } => {
            for suggestion in goals.suggest_milestones(&title, description.as_deref()).await {
                println!("- {}", suggestion);
            }
        }
        GoalCommand::Summary { timeframe } => {
            let timeframe = Timeframe::parse_str(&timeframe)
                .with_context(|| format!("Unknown timeframe: {} (expected week, month or all)", timeframe))?;
            let summary = goals.summary(&app.user_id, timeframe).await?;
            print!("{}", render::summary(&summary, timeframe));
        }
    }
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("miles").join("chat_history.txt"))
}

async fn run_chat(app: &App) -> Result<()> {
    if !app.coach.is_online() {
        println!("(Miles is offline, replies will use fallback texts.)");
    }
    let conversation = app.chat.open_conversation(&app.user_id).await?;
    for message in &conversation.messages {
        println!("{}", render::message(message));
    }

    let mut rl = DefaultEditor::new().context("Failed to create line editor")?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" || line == "exit" {
                    break;
                }
                let _ = rl.add_history_entry(line);

                // Fresh context each turn so edits made elsewhere show up.
                let goals = app.goals.list_goals(&app.user_id).await?;
                let motivations = app.chat.list_motivations(&app.user_id).await?;
                match app
                    .chat
                    .send_message(&conversation.id, line, &goals, &motivations)
                    .await
                {
                    Ok(outcome) => println!("\nMiles: {}\n", outcome.reply),
                    Err(e) => println!("\n[Error]: {}\n", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        }
    }

    app.chat.wait_for_insights().await;

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = rl.save_history(path) {
            warn!("Could not save chat history: {}", e);
        }
    }
    Ok(())
}
