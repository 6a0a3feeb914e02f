use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sable_core::decay::DEFAULT_DECAY_TABLE;
use sable_core::{
    BodyState, ConsciousnessStore, DecayConfig, DecayTable, Emotion, Event, Feeling, Memory,
    MemoryQuery, MemorySort, SomaticMarker,
};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// SQLite-backed system of record for the whole consciousness model.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `db_path` and run migrations.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let in_memory = path.as_os_str() == IN_MEMORY_PATH;

        let mut options = SqlitePoolOptions::new().after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                Ok(())
            })
        });
        let db_url = if in_memory {
            // Every connection to :memory: is a separate database, so pin a single one.
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path.display())
        };

        let pool = options
            .connect(&db_url)
            .await
            .with_context(|| format!("Failed to connect to SQLite database at {}", path.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new(IN_MEMORY_PATH).await
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS body_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                energy REAL NOT NULL CHECK (energy BETWEEN 0.0 AND 1.0),
                valence REAL NOT NULL CHECK (valence BETWEEN -1.0 AND 1.0),
                stress REAL NOT NULL CHECK (stress BETWEEN 0.0 AND 1.0),
                arousal REAL NOT NULL CHECK (arousal BETWEEN 0.0 AND 1.0),
                temperature REAL NOT NULL CHECK (temperature BETWEEN 0.0 AND 1.0),
                tension REAL NOT NULL CHECK (tension BETWEEN 0.0 AND 1.0),
                fatigue REAL NOT NULL CHECK (fatigue BETWEEN 0.0 AND 1.0),
                pain REAL NOT NULL CHECK (pain BETWEEN 0.0 AND 1.0),
                hunger REAL NOT NULL CHECK (hunger BETWEEN 0.0 AND 1.0),
                heart_rate REAL NOT NULL CHECK (heart_rate BETWEEN 0.0 AND 1.0)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create body_states table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                emotion_type TEXT NOT NULL,
                intensity REAL NOT NULL CHECK (intensity BETWEEN 0.0 AND 1.0),
                valence REAL NOT NULL CHECK (valence BETWEEN -1.0 AND 1.0),
                arousal REAL NOT NULL CHECK (arousal BETWEEN 0.0 AND 1.0),
                cause TEXT NOT NULL DEFAULT '',
                body_signature TEXT NOT NULL DEFAULT '{}',
                timestamp INTEGER NOT NULL,
                decayed INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create emotions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feelings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                emotion_id INTEGER REFERENCES emotions(id) ON DELETE SET NULL,
                emotion_type TEXT NOT NULL,
                awareness_level REAL NOT NULL CHECK (awareness_level BETWEEN 0.0 AND 1.0),
                verbalized INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create feelings table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL,
                context TEXT,
                timestamp INTEGER NOT NULL,
                emotional_impact TEXT NOT NULL DEFAULT '{}'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                emotional_salience REAL NOT NULL CHECK (emotional_salience BETWEEN 0.0 AND 1.0),
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed INTEGER,
                consolidation_level REAL NOT NULL CHECK (consolidation_level BETWEEN 0.0 AND 1.0),
                narrative_role TEXT,
                associated_emotions TEXT NOT NULL DEFAULT '[]',
                identity_relevance REAL NOT NULL CHECK (identity_relevance BETWEEN 0.0 AND 1.0),
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        // Logbook link arrived after the first schema
        if let Err(e) = sqlx::query("ALTER TABLE memories ADD COLUMN logbook_path TEXT")
            .execute(&self.pool)
            .await
        {
            tracing::debug!("logbook_path column migration: {}", e);
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS somatic_markers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                situation_pattern TEXT NOT NULL,
                emotion_type TEXT NOT NULL,
                valence REAL NOT NULL CHECK (valence BETWEEN -1.0 AND 1.0),
                strength REAL NOT NULL CHECK (strength BETWEEN 0.0 AND 1.0),
                reinforcement_count INTEGER NOT NULL DEFAULT 1,
                origin_memory_id INTEGER REFERENCES memories(id) ON DELETE SET NULL,
                last_activated INTEGER,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create somatic_markers table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decay_config (
                param_type TEXT PRIMARY KEY,
                half_life REAL NOT NULL CHECK (half_life > 0.0),
                baseline REAL NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create decay_config table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_traits (
                name TEXT PRIMARY KEY,
                value REAL NOT NULL CHECK (value BETWEEN 0.0 AND 1.0),
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create identity_traits table")?;

        for (name, sql) in [
            ("idx_body_states_timestamp", "CREATE INDEX IF NOT EXISTS idx_body_states_timestamp ON body_states(timestamp)"),
            ("idx_emotions_active", "CREATE INDEX IF NOT EXISTS idx_emotions_active ON emotions(decayed, timestamp)"),
            ("idx_memories_salience", "CREATE INDEX IF NOT EXISTS idx_memories_salience ON memories(emotional_salience)"),
            ("idx_memories_created", "CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at)"),
            ("idx_markers_strength", "CREATE INDEX IF NOT EXISTS idx_markers_strength ON somatic_markers(strength)"),
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create index {}", name))?;
        }

        self.seed_decay_defaults().await?;
        Ok(())
    }

    /// Insert the built-in decay table without touching rows already tuned.
    async fn seed_decay_defaults(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        for (name, config) in DEFAULT_DECAY_TABLE {
            sqlx::query(
                "INSERT OR IGNORE INTO decay_config (param_type, half_life, baseline, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(*name)
            .bind(config.half_life_secs as f64)
            .bind(config.baseline as f64)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to seed decay config for {}", name))?;
        }
        Ok(())
    }

    /// Row counts per table, for status output.
    pub async fn table_counts(&self) -> Result<BTreeMap<&'static str, i64>> {
        let mut counts = BTreeMap::new();
        for table in [
            "body_states",
            "emotions",
            "feelings",
            "events",
            "memories",
            "somatic_markers",
        ] {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("Failed to count {}", table))?;
            counts.insert(table, row.get::<i64, _>("n"));
        }
        Ok(counts)
    }
}

// === Row mapping ===

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn real(row: &SqliteRow, column: &str) -> f32 {
    row.get::<f64, _>(column) as f32
}

fn body_state_from_row(row: &SqliteRow) -> Result<BodyState> {
    let state = BodyState {
        id: Some(row.get("id")),
        timestamp: from_millis(row.get("timestamp")),
        energy: real(row, "energy"),
        valence: real(row, "valence"),
        stress: real(row, "stress"),
        arousal: real(row, "arousal"),
        temperature: real(row, "temperature"),
        tension: real(row, "tension"),
        fatigue: real(row, "fatigue"),
        pain: real(row, "pain"),
        hunger: real(row, "hunger"),
        heart_rate: real(row, "heart_rate"),
    };
    state.validate().context("Stored body state is invalid")?;
    Ok(state)
}

fn emotion_from_row(row: &SqliteRow) -> Result<Emotion> {
    let type_name: String = row.get("emotion_type");
    let signature: String = row.get("body_signature");
    let emotion = Emotion {
        id: Some(row.get("id")),
        emotion_type: type_name.parse()?,
        intensity: real(row, "intensity"),
        valence: real(row, "valence"),
        arousal: real(row, "arousal"),
        cause: row.get("cause"),
        body_signature: serde_json::from_str(&signature)
            .context("Failed to parse stored body signature")?,
        timestamp: from_millis(row.get("timestamp")),
        decayed: row.get("decayed"),
    };
    emotion.validate().context("Stored emotion is invalid")?;
    Ok(emotion)
}

fn event_from_row(row: &SqliteRow, id_column: &str, timestamp_column: &str) -> Result<Event> {
    let impact: String = row.get("emotional_impact");
    Ok(Event {
        id: Some(row.get(id_column)),
        description: row.get("description"),
        context: row.get("context"),
        timestamp: from_millis(row.get(timestamp_column)),
        emotional_impact: serde_json::from_str(&impact)
            .context("Failed to parse stored emotional impact")?,
    })
}

fn memory_from_row(row: &SqliteRow) -> Result<Memory> {
    let associated: String = row.get("associated_emotions");
    let access_count: i64 = row.get("access_count");
    let memory = Memory {
        id: Some(row.get("id")),
        event: event_from_row(row, "event_id", "event_timestamp")?,
        emotional_salience: real(row, "emotional_salience"),
        access_count: u32::try_from(access_count).unwrap_or(u32::MAX),
        last_accessed: row.get::<Option<i64>, _>("last_accessed").map(from_millis),
        consolidation_level: real(row, "consolidation_level"),
        narrative_role: row.get("narrative_role"),
        associated_emotions: serde_json::from_str(&associated)
            .context("Failed to parse associated emotions")?,
        identity_relevance: real(row, "identity_relevance"),
        created_at: from_millis(row.get("created_at")),
        logbook_path: row.get("logbook_path"),
    };
    memory.validate().context("Stored memory is invalid")?;
    Ok(memory)
}

fn marker_from_row(row: &SqliteRow) -> Result<SomaticMarker> {
    let type_name: String = row.get("emotion_type");
    let count: i64 = row.get("reinforcement_count");
    let marker = SomaticMarker {
        id: Some(row.get("id")),
        situation_pattern: row.get("situation_pattern"),
        emotion_type: type_name.parse()?,
        valence: real(row, "valence"),
        strength: real(row, "strength"),
        reinforcement_count: u32::try_from(count).unwrap_or(u32::MAX),
        origin_memory_id: row.get("origin_memory_id"),
        last_activated: row.get::<Option<i64>, _>("last_activated").map(from_millis),
        created_at: from_millis(row.get("created_at")),
    };
    marker.validate().context("Stored somatic marker is invalid")?;
    Ok(marker)
}

/// Escape LIKE wildcards so user text matches literally.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn require_id(id: Option<i64>, what: &str) -> Result<i64> {
    match id {
        Some(id) => Ok(id),
        None => bail!("Cannot update {} without an id", what),
    }
}

const MEMORY_SELECT: &str = r#"
    SELECT m.id, m.event_id, m.emotional_salience, m.access_count, m.last_accessed,
           m.consolidation_level, m.narrative_role, m.associated_emotions,
           m.identity_relevance, m.created_at, m.logbook_path,
           e.description, e.context, e.timestamp AS event_timestamp, e.emotional_impact
    FROM memories m
    JOIN events e ON e.id = m.event_id
"#;

#[async_trait]
impl ConsciousnessStore for SqliteStore {
    // === Body ===

    async fn save_body_state(&self, state: &BodyState) -> Result<i64> {
        state.validate().context("Refusing to store invalid body state")?;
        let result = sqlx::query(
            r#"
            INSERT INTO body_states
                (timestamp, energy, valence, stress, arousal, temperature, tension, fatigue, pain, hunger, heart_rate)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(state.timestamp.timestamp_millis())
        .bind(state.energy as f64)
        .bind(state.valence as f64)
        .bind(state.stress as f64)
        .bind(state.arousal as f64)
        .bind(state.temperature as f64)
        .bind(state.tension as f64)
        .bind(state.fatigue as f64)
        .bind(state.pain as f64)
        .bind(state.hunger as f64)
        .bind(state.heart_rate as f64)
        .execute(&self.pool)
        .await
        .context("Failed to save body state")?;
        Ok(result.last_insert_rowid())
    }

    async fn latest_body_state(&self) -> Result<Option<BodyState>> {
        let row = sqlx::query("SELECT * FROM body_states ORDER BY timestamp DESC, id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load latest body state")?;
        row.as_ref().map(body_state_from_row).transpose()
    }

    // === Emotions & feelings ===

    async fn save_emotion(&self, emotion: &Emotion) -> Result<i64> {
        emotion.validate().context("Refusing to store invalid emotion")?;
        let result = sqlx::query(
            r#"
            INSERT INTO emotions (emotion_type, intensity, valence, arousal, cause, body_signature, timestamp, decayed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(emotion.emotion_type.as_str())
        .bind(emotion.intensity as f64)
        .bind(emotion.valence as f64)
        .bind(emotion.arousal as f64)
        .bind(&emotion.cause)
        .bind(serde_json::to_string(&emotion.body_signature)?)
        .bind(emotion.timestamp.timestamp_millis())
        .bind(emotion.decayed)
        .execute(&self.pool)
        .await
        .context("Failed to save emotion")?;
        Ok(result.last_insert_rowid())
    }

    async fn update_emotion(&self, emotion: &Emotion) -> Result<()> {
        let id = require_id(emotion.id, "emotion")?;
        emotion.validate().context("Refusing to store invalid emotion")?;
        let result = sqlx::query(
            "UPDATE emotions SET intensity = ?, valence = ?, arousal = ?, timestamp = ?, decayed = ? WHERE id = ?",
        )
        .bind(emotion.intensity as f64)
        .bind(emotion.valence as f64)
        .bind(emotion.arousal as f64)
        .bind(emotion.timestamp.timestamp_millis())
        .bind(emotion.decayed)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update emotion")?;
        if result.rows_affected() == 0 {
            bail!("Emotion {} not found", id);
        }
        Ok(())
    }

    async fn active_emotions(&self) -> Result<Vec<Emotion>> {
        let rows = sqlx::query("SELECT * FROM emotions WHERE decayed = 0 ORDER BY timestamp DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load active emotions")?;
        rows.iter().map(emotion_from_row).collect()
    }

    async fn save_feeling(&self, feeling: &Feeling) -> Result<i64> {
        feeling.validate().context("Refusing to store invalid feeling")?;
        let result = sqlx::query(
            r#"
            INSERT INTO feelings (emotion_id, emotion_type, awareness_level, verbalized, description, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(feeling.emotion_id)
        .bind(feeling.emotion_type.as_str())
        .bind(feeling.awareness_level as f64)
        .bind(feeling.verbalized)
        .bind(&feeling.description)
        .bind(feeling.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save feeling")?;
        Ok(result.last_insert_rowid())
    }

    // === Events & memories ===

    async fn save_event(&self, event: &Event) -> Result<i64> {
        event.validate().context("Refusing to store invalid event")?;
        let result = sqlx::query(
            "INSERT INTO events (description, context, timestamp, emotional_impact) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.description)
        .bind(&event.context)
        .bind(event.timestamp.timestamp_millis())
        .bind(serde_json::to_string(&event.emotional_impact)?)
        .execute(&self.pool)
        .await
        .context("Failed to save event")?;
        Ok(result.last_insert_rowid())
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load event")?;
        row.as_ref()
            .map(|r| event_from_row(r, "id", "timestamp"))
            .transpose()
    }

    async fn save_memory(&self, memory: &Memory) -> Result<i64> {
        memory.validate().context("Refusing to store invalid memory")?;
        let event_id = match memory.event.id {
            Some(id) => id,
            None => self.save_event(&memory.event).await?,
        };
        let result = sqlx::query(
            r#"
            INSERT INTO memories
                (event_id, emotional_salience, access_count, last_accessed, consolidation_level,
                 narrative_role, associated_emotions, identity_relevance, created_at, logbook_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id)
        .bind(memory.emotional_salience as f64)
        .bind(memory.access_count as i64)
        .bind(memory.last_accessed.map(|t| t.timestamp_millis()))
        .bind(memory.consolidation_level as f64)
        .bind(&memory.narrative_role)
        .bind(serde_json::to_string(&memory.associated_emotions)?)
        .bind(memory.identity_relevance as f64)
        .bind(memory.created_at.timestamp_millis())
        .bind(&memory.logbook_path)
        .execute(&self.pool)
        .await
        .context("Failed to save memory")?;
        Ok(result.last_insert_rowid())
    }

    async fn update_memory(&self, memory: &Memory) -> Result<()> {
        let id = require_id(memory.id, "memory")?;
        memory.validate().context("Refusing to store invalid memory")?;
        let result = sqlx::query(
            r#"
            UPDATE memories
            SET access_count = ?, last_accessed = ?, consolidation_level = ?,
                narrative_role = ?, identity_relevance = ?, logbook_path = ?
            WHERE id = ?
            "#,
        )
        .bind(memory.access_count as i64)
        .bind(memory.last_accessed.map(|t| t.timestamp_millis()))
        .bind(memory.consolidation_level as f64)
        .bind(&memory.narrative_role)
        .bind(memory.identity_relevance as f64)
        .bind(&memory.logbook_path)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update memory")?;
        if result.rows_affected() == 0 {
            bail!("Memory {} not found", id);
        }
        Ok(())
    }

    async fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!("{} WHERE m.id = ?", MEMORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load memory")?;
        row.as_ref().map(memory_from_row).transpose()
    }

    async fn query_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let mut sql = format!(
            "{} WHERE m.emotional_salience >= ? AND m.identity_relevance >= ?",
            MEMORY_SELECT
        );
        if query.created_after.is_some() {
            sql.push_str(" AND m.created_at >= ?");
        }
        if !query.keywords.is_empty() {
            let clauses = vec!["e.description LIKE ? ESCAPE '\\'"; query.keywords.len()];
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
        sql.push_str(match query.sort_by {
            MemorySort::Salience => {
                " ORDER BY m.emotional_salience DESC, m.consolidation_level DESC, m.id ASC"
            }
            MemorySort::Recency => " ORDER BY m.created_at DESC, m.id DESC",
            MemorySort::AccessCount => {
                " ORDER BY m.access_count DESC, m.emotional_salience DESC, m.id ASC"
            }
        });
        sql.push_str(" LIMIT ?");

        let mut q = sqlx::query(&sql)
            .bind(query.min_salience as f64)
            .bind(query.min_identity_relevance as f64);
        if let Some(after) = query.created_after {
            q = q.bind(after.timestamp_millis());
        }
        for keyword in &query.keywords {
            q = q.bind(like_pattern(keyword));
        }
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = q
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query memories")?;
        rows.iter().map(memory_from_row).collect()
    }

    // === Somatic markers ===

    async fn save_somatic_marker(&self, marker: &SomaticMarker) -> Result<i64> {
        marker.validate().context("Refusing to store invalid somatic marker")?;
        let result = sqlx::query(
            r#"
            INSERT INTO somatic_markers
                (situation_pattern, emotion_type, valence, strength, reinforcement_count,
                 origin_memory_id, last_activated, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&marker.situation_pattern)
        .bind(marker.emotion_type.as_str())
        .bind(marker.valence as f64)
        .bind(marker.strength as f64)
        .bind(marker.reinforcement_count as i64)
        .bind(marker.origin_memory_id)
        .bind(marker.last_activated.map(|t| t.timestamp_millis()))
        .bind(marker.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save somatic marker")?;
        Ok(result.last_insert_rowid())
    }

    async fn update_somatic_marker(&self, marker: &SomaticMarker) -> Result<()> {
        let id = require_id(marker.id, "somatic marker")?;
        marker.validate().context("Refusing to store invalid somatic marker")?;
        let result = sqlx::query(
            "UPDATE somatic_markers SET strength = ?, reinforcement_count = ?, last_activated = ? WHERE id = ?",
        )
        .bind(marker.strength as f64)
        .bind(marker.reinforcement_count as i64)
        .bind(marker.last_activated.map(|t| t.timestamp_millis()))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update somatic marker")?;
        if result.rows_affected() == 0 {
            bail!("Somatic marker {} not found", id);
        }
        Ok(())
    }

    async fn somatic_markers(
        &self,
        pattern: Option<&str>,
        min_strength: f32,
    ) -> Result<Vec<SomaticMarker>> {
        let rows = match pattern {
            Some(p) => sqlx::query(
                r#"
                SELECT * FROM somatic_markers
                WHERE strength >= ? AND situation_pattern LIKE ? ESCAPE '\'
                ORDER BY strength DESC, id ASC
                "#,
            )
            .bind(min_strength as f64)
            .bind(like_pattern(p))
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT * FROM somatic_markers WHERE strength >= ? ORDER BY strength DESC, id ASC",
            )
            .bind(min_strength as f64)
            .fetch_all(&self.pool)
            .await,
        }
        .context("Failed to query somatic markers")?;
        rows.iter().map(marker_from_row).collect()
    }

    // === Tunables ===

    async fn decay_overrides(&self) -> Result<DecayTable> {
        let rows = sqlx::query("SELECT param_type, half_life, baseline FROM decay_config")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load decay config")?;
        let mut table = DecayTable::new();
        for row in rows {
            let name: String = row.get("param_type");
            table.set(
                name,
                DecayConfig::new(real(&row, "half_life"), real(&row, "baseline")),
            );
        }
        Ok(table)
    }

    async fn save_decay_config(&self, name: &str, config: DecayConfig) -> Result<()> {
        if !(config.half_life_secs.is_finite() && config.half_life_secs > 0.0)
            || !config.baseline.is_finite()
        {
            bail!("Invalid decay config for {}: {:?}", name, config);
        }
        sqlx::query(
            r#"
            INSERT INTO decay_config (param_type, half_life, baseline, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(param_type) DO UPDATE SET
                half_life = excluded.half_life,
                baseline = excluded.baseline,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(config.half_life_secs as f64)
        .bind(config.baseline as f64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save decay config")?;
        Ok(())
    }

    async fn identity_traits(&self) -> Result<BTreeMap<String, f32>> {
        let rows = sqlx::query("SELECT name, value FROM identity_traits")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load identity traits")?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("name"), real(row, "value")))
            .collect())
    }

    async fn save_identity_trait(&self, name: &str, value: f32) -> Result<()> {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.5 };
        sqlx::query(
            r#"
            INSERT INTO identity_traits (name, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(value as f64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save identity trait")?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin reset")?;
        // Children before parents
        for table in [
            "feelings",
            "somatic_markers",
            "memories",
            "events",
            "emotions",
            "body_states",
            "decay_config",
            "identity_traits",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {}", table))?;
        }
        tx.commit().await.context("Failed to commit reset")?;
        tracing::info!("Consciousness store reset");
        self.seed_decay_defaults().await
    }
}
