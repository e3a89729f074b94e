//! Detects which projects a chat message talks about
//!
//! Keywords come from two places: a curated override table (JSON) and
//! keywords generated from each project document's name and tags. An
//! identifier present in the override table never uses generated keywords.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::content::{ContentProvider, Language, MarkdownDocument};
use crate::metrics;
use crate::utils::{is_similar, TextUtils};

const EMBEDDED_OVERRIDES: &str = include_str!("../../data/keyword_overrides.json");

/// A keyword with its normalized and stemmed forms
#[derive(Debug, Clone, PartialEq)]
struct Keyword {
    normalized: String,
    stem: String,
}

impl Keyword {
    fn new(raw: &str) -> Option<Self> {
        let normalized = TextUtils::normalize(raw.trim());
        if normalized.is_empty() {
            return None;
        }
        let stem = TextUtils::stem(&normalized);
        Some(Self { normalized, stem })
    }

    fn matches(&self, normalized_message: &str, message_stems: &HashSet<String>) -> bool {
        normalized_message.contains(&self.normalized)
            || message_stems.contains(&self.stem)
            || is_similar(&self.stem, message_stems)
    }
}

fn compile(keywords: &[String]) -> Vec<Keyword> {
    let mut compiled: Vec<Keyword> = Vec::with_capacity(keywords.len());
    for keyword in keywords.iter().filter_map(|k| Keyword::new(k)) {
        if !compiled.contains(&keyword) {
            compiled.push(keyword);
        }
    }
    compiled
}

/// Curated keyword lists keyed by normalized project identifier
#[derive(Debug, Clone, Default)]
pub struct KeywordOverrides {
    entries: BTreeMap<String, Vec<Keyword>>,
}

impl KeywordOverrides {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, Vec<String>> =
            serde_json::from_str(raw).context("Invalid keyword override table")?;
        let entries = parsed
            .into_iter()
            .map(|(id, keywords)| (TextUtils::normalize(id.trim()), compile(&keywords)))
            .filter(|(id, _)| !id.is_empty())
            .collect();
        Ok(Self { entries })
    }

    /// Table shipped with the crate
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_json(EMBEDDED_OVERRIDES)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keyword overrides from {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// File at `path` when given, the embedded table otherwise
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keywords generated for a project named `name`
pub fn generate_keywords(name: &str, tags: &HashSet<String>) -> Vec<String> {
    let name = name.to_lowercase();
    let mut keywords = vec![
        name.clone(),
        name.replace('-', " "),
        name.replace('_', " "),
        name.replace(['-', '_'], ""),
    ];
    for part in name.split(|c| c == '-' || c == '_').filter(|p| p.len() > 2) {
        if !keywords.iter().any(|k| k == part) {
            keywords.push(part.to_string());
        }
    }
    let mut tags: Vec<&String> = tags.iter().collect();
    tags.sort();
    for tag in tags {
        if !keywords.contains(tag) {
            keywords.push(tag.clone());
        }
    }
    keywords
}

#[derive(Debug, Default)]
struct KeywordSnapshot {
    generated: BTreeMap<String, Vec<Keyword>>,
    loaded_at: Option<Instant>,
}

impl KeywordSnapshot {
    fn build(documents: &[MarkdownDocument]) -> Self {
        let generated = documents
            .iter()
            .filter(|doc| doc.is_project)
            .map(|doc| {
                let id = TextUtils::normalize(&doc.name);
                let keywords = generate_keywords(&id, &doc.tags);
                debug!("Project registered: {} -> {:?}", id, keywords);
                (id, compile(&keywords))
            })
            .collect();
        Self {
            generated,
            loaded_at: Some(Instant::now()),
        }
    }
}

pub struct ProjectKeywordDetector {
    provider: Arc<dyn ContentProvider>,
    language: Language,
    overrides: KeywordOverrides,
    reload_interval: Duration,
    snapshot: ArcSwap<KeywordSnapshot>,
    reload_lock: Mutex<()>,
}

impl ProjectKeywordDetector {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        language: Language,
        overrides: KeywordOverrides,
        reload_interval: Duration,
    ) -> Self {
        Self {
            provider,
            language,
            overrides,
            reload_interval,
            snapshot: ArcSwap::from_pointee(KeywordSnapshot::default()),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn since_reload(&self) -> Option<Duration> {
        self.snapshot.load().loaded_at.map(|t| t.elapsed())
    }

    fn is_stale(&self) -> bool {
        match self.snapshot.load().loaded_at {
            Some(loaded_at) => loaded_at.elapsed() >= self.reload_interval,
            None => true,
        }
    }

    /// Regenerates project keywords; the previous map survives a failed fetch
    pub async fn reload(&self) -> anyhow::Result<usize> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> anyhow::Result<usize> {
        let documents = match self
            .provider
            .list_documents(self.language)
            .await
            .context("Failed to load project documents for keyword detection")
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Project keyword reload failed, keeping previous map: {:#}", e);
                metrics::record_reload("keyword_detector", false);
                return Err(e);
            }
        };

        let snapshot = KeywordSnapshot::build(&documents);
        let count = snapshot.generated.len();
        self.snapshot.store(Arc::new(snapshot));
        metrics::record_reload("keyword_detector", true);
        info!("Project keywords reloaded: {} projects ({} overrides)", count, self.overrides.len());
        Ok(count)
    }

    async fn ensure_fresh(&self) {
        if !self.is_stale() {
            return;
        }
        let Ok(_guard) = self.reload_lock.try_lock() else {
            debug!("Project keyword reload already in progress");
            return;
        };
        if self.is_stale() {
            let _ = self.reload_locked().await;
        }
    }

    /// Identifiers of every project the message mentions
    pub async fn detect(&self, message: &str) -> BTreeSet<String> {
        if TextUtils::is_blank(message) {
            return BTreeSet::new();
        }
        self.ensure_fresh().await;

        let normalized = TextUtils::normalize(message.trim());
        let stems = TextUtils::extract_stems(&normalized);
        let snapshot = self.snapshot.load();

        let overridden = self.overrides.entries.iter();
        let generated = snapshot
            .generated
            .iter()
            .filter(|(id, _)| !self.overrides.entries.contains_key(*id));

        let detected: BTreeSet<String> = overridden
            .chain(generated)
            .filter(|(_, keywords)| keywords.iter().any(|k| k.matches(&normalized, &stems)))
            .map(|(id, _)| id.clone())
            .collect();

        if !detected.is_empty() {
            debug!("Projects mentioned: {:?}", detected);
        }
        detected
    }

    pub async fn has_project_mention(&self, message: &str) -> bool {
        !self.detect(message).await.is_empty()
    }

    /// Every known identifier, generated or curated
    pub async fn list_all(&self) -> BTreeSet<String> {
        self.ensure_fresh().await;
        let snapshot = self.snapshot.load();
        snapshot
            .generated
            .keys()
            .chain(self.overrides.entries.keys())
            .cloned()
            .collect()
    }

    /// Known identifiers without triggering a reload
    pub fn project_count(&self) -> usize {
        let snapshot = self.snapshot.load();
        let extra = self
            .overrides
            .entries
            .keys()
            .filter(|id| !snapshot.generated.contains_key(*id))
            .count();
        snapshot.generated.len() + extra
    }
}
