//! Stem-based relevance search over the portfolio documents
//!
//! The index holds one chunk per document. Readers load the current snapshot
//! without locking; a reload builds a complete new snapshot and swaps it in.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::content::{ContentProvider, Language, MarkdownDocument};
use crate::metrics;
use crate::utils::{is_similar, TextUtils};

/// One retrievable unit of context
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub stems: HashSet<String>,
    pub tag_stems: HashSet<String>,
    pub is_project: bool,
    pub is_preferred_fallback: bool,
}

impl DocumentChunk {
    pub fn from_document(document: &MarkdownDocument, ordinal: usize) -> Self {
        Self {
            id: format!("{}-{}", document.name, ordinal),
            content: document.content.clone(),
            stems: TextUtils::extract_stems(&document.content),
            tag_stems: TextUtils::stem_tags(&document.tags),
            is_project: document.is_project,
            is_preferred_fallback: document.is_preferred_fallback,
        }
    }

    /// Mean per-token score (2 exact, 1 fuzzy) plus the tag boost
    pub fn score(&self, tokens: &[String]) -> f64 {
        if tokens.is_empty() {
            return 0.0;
        }
        let total: u32 = tokens
            .iter()
            .map(|token| {
                if self.stems.contains(token) {
                    2
                } else if is_similar(token, &self.stems) {
                    1
                } else {
                    0
                }
            })
            .sum();
        total as f64 / tokens.len() as f64 + self.tag_boost(tokens)
    }

    fn tag_boost(&self, tokens: &[String]) -> f64 {
        let hits = tokens.iter().filter(|t| self.tag_stems.contains(*t)).count();
        if hits == 0 {
            0.0
        } else {
            1.0 + (hits - 1) as f64 * 0.25
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub reload_interval: Duration,
    pub min_score: f64,
    /// Preferred-fallback chunks admitted to the fallback set
    pub max_preferred_fallback: usize,
    /// Size of the fallback set after backfilling with general documents
    pub max_fallback: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            reload_interval: Duration::from_secs(30 * 60),
            min_score: 0.4,
            max_preferred_fallback: 2,
            max_fallback: 3,
        }
    }
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    chunks: Vec<DocumentChunk>,
    /// Indices into `chunks`
    fallback: Vec<usize>,
    loaded_at: Option<Instant>,
}

impl IndexSnapshot {
    fn build(documents: &[MarkdownDocument], config: &SearchConfig) -> Self {
        let chunks: Vec<DocumentChunk> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| DocumentChunk::from_document(doc, i))
            .collect();

        let mut fallback: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_preferred_fallback)
            .map(|(i, _)| i)
            .take(config.max_preferred_fallback.min(config.max_fallback))
            .collect();
        let backfill: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(i, c)| !c.is_project && !fallback.contains(i))
            .map(|(i, _)| i)
            .take(config.max_fallback.saturating_sub(fallback.len()))
            .collect();
        fallback.extend(backfill);

        Self {
            chunks,
            fallback,
            loaded_at: Some(Instant::now()),
        }
    }

    fn fallback_contents(&self, limit: usize, max_fallback: usize) -> Vec<String> {
        if self.fallback.is_empty() {
            return self
                .chunks
                .iter()
                .take(max_fallback.min(limit))
                .map(|c| c.content.clone())
                .collect();
        }
        self.fallback
            .iter()
            .take(limit)
            .map(|&i| self.chunks[i].content.clone())
            .collect()
    }
}

pub struct SearchIndex {
    provider: Arc<dyn ContentProvider>,
    language: Language,
    config: SearchConfig,
    snapshot: ArcSwap<IndexSnapshot>,
    reload_lock: Mutex<()>,
}

impl SearchIndex {
    /// Empty index; the first search (or an explicit `reload`) loads it
    pub fn new(provider: Arc<dyn ContentProvider>, language: Language, config: SearchConfig) -> Self {
        Self {
            provider,
            language,
            config,
            snapshot: ArcSwap::from_pointee(IndexSnapshot::default()),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn chunk_count(&self) -> usize {
        self.snapshot.load().chunks.len()
    }

    pub fn fallback_count(&self) -> usize {
        self.snapshot.load().fallback.len()
    }

    /// Time since the last successful reload, None before the first one
    pub fn since_reload(&self) -> Option<Duration> {
        self.snapshot.load().loaded_at.map(|t| t.elapsed())
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.snapshot.load().chunks.iter().map(|c| c.id.clone()).collect()
    }

    fn is_stale(&self) -> bool {
        match self.snapshot.load().loaded_at {
            Some(loaded_at) => loaded_at.elapsed() >= self.config.reload_interval,
            None => true,
        }
    }

    /// Rebuilds the index from the content provider. On failure the current
    /// snapshot stays in place.
    pub async fn reload(&self) -> anyhow::Result<usize> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> anyhow::Result<usize> {
        info!("Reloading context index ({})", self.language);
        let documents = match self
            .provider
            .list_documents(self.language)
            .await
            .with_context(|| format!("Failed to load documents for the {} index", self.language))
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Context index reload failed, keeping {} chunks: {:#}", self.chunk_count(), e);
                metrics::record_reload("search_index", false);
                return Err(e);
            }
        };

        let snapshot = IndexSnapshot::build(&documents, &self.config);
        let count = snapshot.chunks.len();
        let fallback = snapshot.fallback.len();
        self.snapshot.store(Arc::new(snapshot));
        metrics::record_reload("search_index", true);
        info!("Context index reloaded: {} chunks, {} fallback", count, fallback);
        Ok(count)
    }

    /// Reloads when the interval elapsed. If another reload is already running
    /// the current snapshot is served instead of waiting.
    async fn ensure_fresh(&self) {
        if !self.is_stale() {
            return;
        }
        let Ok(_guard) = self.reload_lock.try_lock() else {
            debug!("Context index reload already in progress");
            return;
        };
        if self.is_stale() {
            // failure already logged, previous snapshot remains
            let _ = self.reload_locked().await;
        }
    }

    /// Contents of the best matching chunks, or of the fallback chunks when the
    /// query is empty or nothing clears the minimum score
    pub async fn search(&self, query: &str, limit: usize) -> Vec<String> {
        self.ensure_fresh().await;
        let snapshot = self.snapshot.load();

        let tokens: Vec<String> = if TextUtils::is_blank(query) {
            Vec::new()
        } else {
            let mut tokens: Vec<String> = TextUtils::extract_stems(query).into_iter().collect();
            tokens.sort();
            tokens
        };
        if tokens.is_empty() {
            return snapshot.fallback_contents(limit, self.config.max_fallback);
        }

        let mut ranked: Vec<(f64, &DocumentChunk)> = snapshot
            .chunks
            .iter()
            .map(|chunk| (chunk.score(&tokens), chunk))
            .filter(|(score, _)| *score >= self.config.min_score)
            .collect();
        if ranked.is_empty() {
            debug!("No chunk cleared {:.2} for {:?}, using fallback", self.config.min_score, tokens);
            return snapshot.fallback_contents(limit, self.config.max_fallback);
        }

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        debug!(
            "Top matches: {:?}",
            ranked.iter().take(limit).map(|(s, c)| (c.id.as_str(), *s)).collect::<Vec<_>>()
        );
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, chunk)| chunk.content.clone())
            .collect()
    }
}
