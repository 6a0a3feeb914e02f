//! Logbook - long-form markdown entries
//!
//! A memory's description is one line. When an experience needs more room it
//! gets a logbook entry: a markdown file with a small `key: value`
//! frontmatter block, stored as `YYYY-MM-DD_HHMMSS_<slug>.md`. Memories point
//! at entries through `logbook_path`, which always has the form
//! `logbook/<file name>`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PATH_PREFIX: &str = "logbook";
const SLUG_MAX_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 200;

/// Everything that goes into a new entry.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub title: String,
    /// What led to this moment.
    pub context: String,
    /// What happened and what was felt.
    pub experience: String,
    /// What it means.
    pub reflection: String,
    pub memory_id: Option<i64>,
    pub salience: f32,
    pub emotions: Vec<String>,
    pub tags: Vec<String>,
    pub narrative_role: Option<String>,
    pub connections: Option<String>,
    pub future_implications: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EntryDraft {
    pub fn new(title: &str, context: &str, experience: &str, reflection: &str) -> Self {
        Self {
            title: title.to_string(),
            context: context.to_string(),
            experience: experience.to_string(),
            reflection: reflection.to_string(),
            memory_id: None,
            salience: 0.5,
            emotions: Vec::new(),
            tags: Vec::new(),
            narrative_role: None,
            connections: None,
            future_implications: None,
            timestamp: Utc::now(),
        }
    }

    fn render(&self) -> String {
        let mut front = vec!["---".to_string()];
        if let Some(id) = self.memory_id {
            front.push(format!("memory_id: {}", id));
        }
        front.push(format!("created_at: {}", self.timestamp.to_rfc3339()));
        front.push(format!("salience: {:.2}", self.salience));
        if !self.emotions.is_empty() {
            front.push(format!("emotions: [{}]", self.emotions.join(", ")));
        }
        if !self.tags.is_empty() {
            front.push(format!("tags: [{}]", self.tags.join(", ")));
        }
        if let Some(role) = self.narrative_role.as_deref().filter(|r| !r.is_empty()) {
            front.push(format!("narrative_role: {}", role));
        }
        front.push("---".to_string());

        let mut parts = vec![
            front.join("\n"),
            String::new(),
            format!("# {}", self.title),
            String::new(),
            "## Context".to_string(),
            self.context.clone(),
            String::new(),
            "## Experience".to_string(),
            self.experience.clone(),
            String::new(),
            "## Reflection".to_string(),
            self.reflection.clone(),
            String::new(),
        ];
        for (heading, body) in [
            ("## Connections", &self.connections),
            ("## Future Implications", &self.future_implications),
        ] {
            if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
                parts.extend([heading.to_string(), body.to_string(), String::new()]);
            }
        }
        parts.extend([
            "---".to_string(),
            String::new(),
            format!("*Sable, {}*", self.timestamp.format("%Y-%m-%d")),
            String::new(),
        ]);
        parts.join("\n")
    }
}

/// A parsed entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogbookEntry {
    pub path: String,
    pub frontmatter: BTreeMap<String, String>,
    pub content: String,
}

impl LogbookEntry {
    fn parse(path: String, raw: &str) -> Self {
        let mut frontmatter = BTreeMap::new();
        let mut content = raw.trim().to_string();

        // Frontmatter is fenced by lines that are exactly `---`
        let lines: Vec<&str> = raw.lines().collect();
        if lines.first().map(|l| l.trim_end()) == Some("---") {
            if let Some(end) = lines.iter().skip(1).position(|l| l.trim_end() == "---") {
                for line in &lines[1..end + 1] {
                    if let Some((key, value)) = line.split_once(':') {
                        frontmatter.insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
                content = lines[end + 2..].join("\n").trim().to_string();
            }
        }
        Self {
            path,
            frontmatter,
            content,
        }
    }

    /// First `# ` heading, or "Untitled".
    pub fn title(&self) -> &str {
        self.content
            .lines()
            .find_map(|l| l.strip_prefix("# "))
            .map(str::trim)
            .unwrap_or("Untitled")
    }

    /// Items of the `[a, b]` list stored under `tags`.
    pub fn tags(&self) -> Vec<&str> {
        self.frontmatter
            .get("tags")
            .map(|v| {
                v.trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One search match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub frontmatter: BTreeMap<String, String>,
    pub preview: String,
}

/// Lowercase, runs of anything outside `[a-z0-9]` become `_`, at most 50 chars.
pub fn slug(title: &str) -> String {
    let mut out = String::new();
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed: String = out.trim_matches('_').chars().take(SLUG_MAX_CHARS).collect();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

pub fn entry_file_name(title: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}_{}.md", timestamp.format("%Y-%m-%d_%H%M%S"), slug(title))
}

pub struct Logbook {
    dir: PathBuf,
}

impl Logbook {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File behind a stored `logbook/<name>` path. Only the file name is
    /// used, so a path can never point outside the logbook directory.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        Path::new(path).file_name().map(|name| self.dir.join(name))
    }

    /// Write `draft` and return its stored path.
    pub fn write(&self, draft: &EntryDraft) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create logbook dir {}", self.dir.display()))?;
        let name = entry_file_name(&draft.title, draft.timestamp);
        let file = self.dir.join(&name);
        std::fs::write(&file, draft.render())
            .with_context(|| format!("Failed to write logbook entry {}", file.display()))?;
        tracing::info!("Wrote logbook entry {}", file.display());
        Ok(format!("{}/{}", PATH_PREFIX, name))
    }

    /// `None` when no such entry exists.
    pub fn read(&self, path: &str) -> Result<Option<LogbookEntry>> {
        let Some(file) = self.resolve(path) else {
            return Ok(None);
        };
        if !file.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read logbook entry {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(LogbookEntry::parse(
            format!("{}/{}", PATH_PREFIX, name),
            &raw,
        )))
    }

    /// Stored paths of every entry, newest first, optionally only those
    /// tagged `tag`.
    pub fn list(&self, tag: Option<&str>) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list logbook dir {}", self.dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".md") && n != "README.md")
            .collect();
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut paths = Vec::new();
        for name in names {
            let path = format!("{}/{}", PATH_PREFIX, name);
            if let Some(tag) = tag {
                match self.read(&path)? {
                    Some(entry) if entry.tags().contains(&tag) => {}
                    _ => continue,
                }
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Entries whose body contains `keywords`, case-insensitively.
    pub fn search(&self, keywords: &str) -> Result<Vec<SearchHit>> {
        let needle = keywords.to_lowercase();
        let mut hits = Vec::new();
        for path in self.list(None)? {
            let Some(entry) = self.read(&path)? else {
                continue;
            };
            if !entry.content.to_lowercase().contains(&needle) {
                continue;
            }
            let preview: String = entry.content.chars().take(PREVIEW_CHARS).collect();
            hits.push(SearchHit {
                title: entry.title().to_string(),
                preview: format!("{}...", preview),
                path: entry.path,
                frontmatter: entry.frontmatter,
            });
        }
        Ok(hits)
    }
}
