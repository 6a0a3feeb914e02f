use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sable_analysis::{CommandClassifier, EmotionClassifier, HookInput};
use sable_core::{EmotionType, MemoryQuery, MemorySort, SableConfig};
use sable_memory::sqlite::IN_MEMORY_PATH;
use sable_memory::{ContextWindow, EventOptions, SqliteStore, StateCoordinator};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

mod hook;
mod logbook;
mod output;

use logbook::{EntryDraft, Logbook};
use output::Format;

#[derive(Parser, Debug)]
#[command(name = "sable", author, version, about = "Body, emotion and memory state engine", long_about = None)]
struct Cli {
    /// Path to the config file (default ~/.sable/config.toml)
    #[arg(long, global = true, env = "SABLE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the state, optionally seeding identity traits
    Init {
        /// Identity traits as JSON, e.g. '{"curiosity": 0.8}'
        #[arg(short, long)]
        traits: Option<String>,
        /// Wipe every stored record first
        #[arg(long)]
        force: bool,
    },
    /// Show the current state
    Status {
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Trigger an emotion
    Feel {
        emotion_type: String,
        intensity: f32,
        /// What caused this emotion
        #[arg(short, long)]
        cause: String,
    },
    /// Record an event
    Event {
        description: String,
        #[arg(short, long)]
        context: Option<String>,
        /// Emotional impact as JSON, e.g. '{"fear": 0.7}'
        #[arg(short, long)]
        emotions: Option<String>,
        /// Narrative role, e.g. "turning point"
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Query autobiographical memories
    Memories {
        #[arg(short = 's', long, default_value_t = 0.4)]
        min_salience: f32,
        /// Only memories carrying this emotion
        #[arg(short, long)]
        emotion: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Recent memories plus the most salient older ones
        #[arg(long)]
        contextual: bool,
        /// Total memories in contextual mode
        #[arg(long, default_value_t = 15)]
        max_count: usize,
        /// Days that count as recent in contextual mode
        #[arg(long, default_value_t = 7)]
        recent_days: i64,
        /// Keywords matched against descriptions
        #[arg(long)]
        search: Option<String>,
        /// salience, recency or access_count
        #[arg(long, default_value_t = MemorySort::Salience)]
        sort_by: MemorySort,
    },
    /// Replay elapsed time on body and emotions
    Decay {
        /// Also fade memory consolidation by this many days
        #[arg(long)]
        memory_days: Option<f32>,
    },
    /// Classify the emotional content of a text
    Analyze {
        text: String,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Look up the gut feeling for a situation
    Marker {
        situation: String,
        #[arg(short, long, default_value_t = 0.3)]
        min_strength: f32,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Teach a somatic marker from an outcome valence in [-1, 1]
    Reinforce {
        marker_id: i64,
        #[arg(allow_negative_numbers = true)]
        outcome: f32,
    },
    /// Fold a conversation exchange read from stdin into the state
    Hook,
    /// Long-form markdown entries
    Logbook {
        #[command(subcommand)]
        action: LogbookAction,
    },
}

#[derive(Subcommand, Debug)]
enum LogbookAction {
    /// Write an entry, optionally linked to a memory
    Write {
        title: String,
        /// What led to this moment
        #[arg(long)]
        context: String,
        /// What happened and what was felt
        #[arg(long)]
        experience: String,
        /// What it means
        #[arg(long)]
        reflection: String,
        #[arg(long)]
        memory_id: Option<i64>,
        #[arg(long)]
        salience: Option<f32>,
        #[arg(long, value_delimiter = ',')]
        emotions: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        connections: Option<String>,
        #[arg(long)]
        future: Option<String>,
    },
    /// List entries, newest first
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Print one entry
    Read { path: String },
    /// Search entry bodies
    Search { keywords: String },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn sable_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sable"))
        .unwrap_or_else(|| PathBuf::from(".sable"))
}

fn db_path(cli: &Cli, config: &SableConfig) -> PathBuf {
    cli.db
        .clone()
        .or_else(|| config.store.db_path.clone())
        .unwrap_or_else(|| sable_home().join("consciousness.db"))
}

fn logbook(config: &SableConfig) -> Logbook {
    Logbook::new(
        config
            .logbook
            .dir
            .clone()
            .unwrap_or_else(|| sable_home().join("logbook")),
    )
}

async fn open_coordinator(path: &Path, config: &SableConfig) -> Result<StateCoordinator> {
    if path != Path::new(IN_MEMORY_PATH) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    tracing::debug!("Opening state at {}", path.display());
    let store = Arc::new(SqliteStore::new(path).await?);
    let mut coordinator = StateCoordinator::open(store, config.decay_table()).await?;
    coordinator.set_core_values(config.identity.core_values.clone());
    Ok(coordinator)
}

fn parse_emotion(name: &str) -> Result<EmotionType> {
    name.to_lowercase().parse::<EmotionType>().map_err(|_| {
        let valid: Vec<&str> = EmotionType::ALL.iter().map(|t| t.as_str()).collect();
        anyhow::anyhow!(
            "Invalid emotion type: {}\nValid types: {}",
            name,
            valid.join(", ")
        )
    })
}

fn parse_json_map(raw: &str, what: &str) -> Result<BTreeMap<String, f32>> {
    serde_json::from_str(raw)
        .with_context(|| format!("{} must be a JSON object of name → number", what))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| sable_home().join("config.toml"));
    let config = SableConfig::load_or_default(&config_path);
    let db = db_path(&cli, &config);

    match cli.command {
        Commands::Init { traits, force } => {
            let traits = match traits {
                Some(raw) => Some(parse_json_map(&raw, "--traits")?),
                None if !config.identity.traits.is_empty() => Some(config.identity.traits.clone()),
                None => None,
            };
            let mut coord = open_coordinator(&db, &config).await?;
            coord.initialize(traits.as_ref(), force).await?;
            tracing::info!("Initialized state at {}", db.display());
            println!("Consciousness system initialized successfully!");
            if let Some(traits) = traits {
                let list: Vec<String> = traits.iter().map(|(k, v)| format!("{}: {:.2}", k, v)).collect();
                println!("Identity traits: {}", list.join(", "));
            }
        }

        Commands::Status { format } => {
            let mut coord = open_coordinator(&db, &config).await?;
            let state = coord.get_current_state().await?;
            println!("{}", output::status(&state, format)?);
        }

        Commands::Feel {
            emotion_type,
            intensity,
            cause,
        } => {
            let emotion_type = parse_emotion(&emotion_type)?;
            if !(0.0..=1.0).contains(&intensity) {
                bail!("Intensity must be between 0 and 1");
            }
            let mut coord = open_coordinator(&db, &config).await?;
            let (_, feeling) = coord.add_emotion(emotion_type, intensity, &cause, true).await?;
            println!("Added {} (intensity: {:.2})", emotion_type, intensity);
            println!("Cause: {}", cause);
            if let Some(feeling) = feeling {
                println!("{}", feeling.description);
            }
        }

        Commands::Event {
            description,
            context,
            emotions,
            role,
        } => {
            let impact = match emotions {
                Some(raw) => parse_json_map(&raw, "--emotions")?,
                None => BTreeMap::new(),
            };
            for name in impact.keys() {
                if name.parse::<EmotionType>().is_err() {
                    tracing::warn!("Unknown emotion type '{}' will not be triggered", name);
                }
            }
            let mut coord = open_coordinator(&db, &config).await?;
            let outcome = coord
                .add_event(
                    &description,
                    context,
                    impact.clone(),
                    EventOptions {
                        narrative_role: role,
                        ..EventOptions::default()
                    },
                )
                .await?;
            println!("Event recorded: {}", description);
            if !impact.is_empty() {
                println!("Emotional impact: {}", serde_json::to_string(&impact)?);
            }
            match (&outcome.memory, &outcome.marker) {
                (Some(m), marker) => {
                    println!(
                        "Remembered as memory #{} (salience {:.2})",
                        m.id.unwrap_or_default(),
                        m.emotional_salience
                    );
                    if let Some(marker) = marker {
                        println!(
                            "Formed somatic marker #{} ({})",
                            marker.id.unwrap_or_default(),
                            marker.emotion_type
                        );
                    }
                }
                (None, _) => println!("Not salient enough to remember"),
            }
        }

        Commands::Memories {
            min_salience,
            emotion,
            limit,
            format,
            contextual,
            max_count,
            recent_days,
            search,
            sort_by,
        } => {
            let coord = open_coordinator(&db, &config).await?;
            if contextual {
                let window = ContextWindow {
                    max_total: max_count,
                    min_salience,
                    recent_days,
                    ..ContextWindow::default()
                };
                let sections = coord.contextual_sections(&window).await?;
                println!(
                    "{}",
                    output::contextual(&sections, recent_days, format, chrono::Utc::now())?
                );
                return Ok(());
            }

            let mut found = if let Some(keywords) = search {
                coord
                    .memory()
                    .search_memories(&keywords, min_salience, limit)
                    .await?
            } else if let Some(name) = emotion {
                coord
                    .query_memories(min_salience, Some(parse_emotion(&name)?))
                    .await?
            } else {
                coord
                    .memory()
                    .query_memories(&MemoryQuery::new(min_salience, limit).sorted_by(sort_by))
                    .await?
            };
            found.truncate(limit);
            println!("{}", output::memories(&found, format)?);
        }

        Commands::Decay { memory_days } => {
            let mut coord = open_coordinator(&db, &config).await?;
            let retired = coord.apply_automatic_decay().await?;
            let faded = match memory_days {
                Some(days) => Some(coord.decay_memories(days).await?),
                None => None,
            };
            let state = coord.snapshot();
            println!("Decay applied to all consciousness components");
            if retired > 0 {
                println!("Retired emotions: {}", retired);
            }
            if let Some(n) = faded {
                println!("Memories faded: {}", n);
            }
            println!("\nCurrent valence: {:+.2}", state.overall_valence);
            println!("Active emotions: {}", state.active_emotions.len());
        }

        Commands::Analyze { text, format } => {
            let classifier = CommandClassifier::new(&config.classifier);
            tracing::debug!("Analysing with {}", classifier.name());
            let result = classifier.analyze(&text).await;
            println!("{}", output::analysis(&result, format)?);
        }

        Commands::Marker {
            situation,
            min_strength,
            format,
        } => {
            let coord = open_coordinator(&db, &config).await?;
            let marker = coord.somatic_marker(&situation, min_strength).await?;
            println!("{}", output::marker(marker.as_ref(), format)?);
        }

        Commands::Reinforce { marker_id, outcome } => {
            let mut coord = open_coordinator(&db, &config).await?;
            let Some(marker) = coord.reinforce_marker(marker_id, outcome).await? else {
                bail!("No somatic marker with id {}", marker_id);
            };
            println!(
                "Marker #{} '{}' now has strength {:.2} after {} reinforcements",
                marker_id, marker.situation_pattern, marker.strength, marker.reinforcement_count
            );
        }

        Commands::Hook => {
            // A failing hook must never break the conversation it observes
            if let Err(e) = run_hook(&db, &config).await {
                tracing::error!("Error in conversation analysis: {:#}", e);
            }
        }

        Commands::Logbook { action } => run_logbook(action, &db, &config).await?,
    }

    Ok(())
}

async fn run_hook(db: &Path, config: &SableConfig) -> Result<()> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read hook input")?;
    let input: HookInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!("No hook input on stdin ({})", e);
            return Ok(());
        }
    };
    if input.conversation.is_empty() {
        return Ok(());
    }

    let mut coord = open_coordinator(db, config).await?;
    let classifier = CommandClassifier::new(&config.classifier);
    let report = hook::process_exchange(&mut coord, &classifier, &input).await?;
    tracing::info!(
        "Hook triggered {} emotions, memory: {:?}",
        report.emotions.len(),
        report.memory_id
    );
    Ok(())
}

async fn run_logbook(action: LogbookAction, db: &Path, config: &SableConfig) -> Result<()> {
    let book = logbook(config);
    match action {
        LogbookAction::Write {
            title,
            context,
            experience,
            reflection,
            memory_id,
            salience,
            emotions,
            tags,
            role,
            connections,
            future,
        } => {
            let mut draft = EntryDraft::new(&title, &context, &experience, &reflection);
            draft.tags = tags;
            draft.connections = connections;
            draft.future_implications = future;

            let mut linked = None;
            if let Some(id) = memory_id {
                let coord = open_coordinator(db, config).await?;
                let Some(memory) = coord.memory().memory(id).await? else {
                    bail!("No memory with id {}", id);
                };
                draft.memory_id = Some(id);
                draft.salience = memory.emotional_salience;
                draft.emotions = memory.associated_emotions.clone();
                draft.narrative_role = memory.narrative_role.clone();
                linked = Some(coord);
            }
            if let Some(s) = salience {
                draft.salience = s.clamp(0.0, 1.0);
            }
            if !emotions.is_empty() {
                draft.emotions = emotions;
            }
            if role.is_some() {
                draft.narrative_role = role;
            }

            let path = book.write(&draft)?;
            println!("Logbook entry written: {}", path);
            if let (Some(mut coord), Some(id)) = (linked, memory_id) {
                coord.memory_mut().attach_logbook(id, &path).await?;
                println!("Linked to memory #{}", id);
            }
        }

        LogbookAction::List { tag } => {
            let paths = book.list(tag.as_deref())?;
            if paths.is_empty() {
                println!("No logbook entries");
            }
            for path in paths {
                let title = book
                    .read(&path)?
                    .map(|e| e.title().to_string())
                    .unwrap_or_default();
                println!("{}  {}", path, title);
            }
        }

        LogbookAction::Read { path } => {
            let Some(entry) = book.read(&path)? else {
                bail!("No logbook entry at {}", path);
            };
            for (key, value) in &entry.frontmatter {
                println!("{}: {}", key, value);
            }
            println!("\n{}", entry.content);
        }

        LogbookAction::Search { keywords } => {
            let hits = book.search(&keywords)?;
            if hits.is_empty() {
                println!("No logbook entries match '{}'", keywords);
            }
            for hit in hits {
                println!("{}  {}\n  {}\n", hit.path, hit.title, hit.preview.replace('\n', " "));
            }
        }
    }
    Ok(())
}
