//! Content provider backed by a local directory of markdown files
//!
//! Layout:
//! - `<root>/*.md` general documents (resume, stacks, profile readme, ...)
//! - `<root>/projects/*.md` one document per project
//! - `<root>/trabalhos/*.md` work experiences, handled like projects
//! - `<name>-english.md` English variant of `<name>.md`
//! - `<root>/metadata.json` optional per-document metadata

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ContentProvider, Language, MarkdownDocument};
use crate::utils::TextUtils;

const PROJECTS_DIR: &str = "projects";
const WORK_DIR: &str = "trabalhos";
const METADATA_FILE: &str = "metadata.json";
const ENGLISH_SUFFIX: &str = "-english";
const MAX_CHARS_PER_FILE: usize = 4000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub preferred_fallback: bool,
    #[serde(default)]
    pub tags: HashSet<String>,
}

pub struct FilesystemContentProvider {
    root: PathBuf,
}

impl FilesystemContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load_metadata(&self) -> HashMap<String, DocumentMetadata> {
        let path = self.root.join(METADATA_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No metadata file at {}, using generated tags", path.display());
                return HashMap::new();
            }
        };
        match serde_json::from_str::<HashMap<String, DocumentMetadata>>(&raw) {
            Ok(parsed) => parsed
                .into_iter()
                .map(|(name, meta)| (name.to_lowercase(), meta))
                .collect(),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    /// Markdown files in `dir`, one per base name, English variant chosen per language
    async fn select_files(&self, dir: &Path, language: Language) -> anyhow::Result<BTreeMap<String, PathBuf>> {
        // base name -> (plain variant, english variant)
        let mut variants: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let is_markdown = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            if !is_markdown {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let stem = stem.to_lowercase();
            let slot = match stem.strip_suffix(ENGLISH_SUFFIX) {
                Some(base) => &mut variants.entry(base.to_string()).or_default().1,
                None => &mut variants.entry(stem.clone()).or_default().0,
            };
            *slot = Some(path);
        }

        Ok(variants
            .into_iter()
            .filter_map(|(name, (plain, english))| {
                let path = match language {
                    Language::En => english.or(plain),
                    Language::Pt => plain.or(english),
                };
                path.map(|p| (name, p))
            })
            .collect())
    }

    async fn read_documents(
        &self,
        dir: &Path,
        is_project: bool,
        language: Language,
        metadata: &HashMap<String, DocumentMetadata>,
    ) -> anyhow::Result<Vec<MarkdownDocument>> {
        let files = self.select_files(dir, language).await?;
        let mut documents = Vec::with_capacity(files.len());

        for (name, path) in files {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping unreadable {}: {}", path.display(), e);
                    continue;
                }
            };
            if TextUtils::is_blank(&content) {
                continue;
            }
            let meta = metadata
                .get(&name)
                .cloned()
                .unwrap_or_else(|| DocumentMetadata {
                    preferred_fallback: false,
                    tags: generate_tags(&name, is_project),
                });
            documents.push(MarkdownDocument {
                path: path.to_string_lossy().to_string(),
                content: TextUtils::truncate_chars(&content, MAX_CHARS_PER_FILE).to_string(),
                is_project,
                is_preferred_fallback: meta.preferred_fallback,
                tags: meta.tags,
                name,
            });
        }

        Ok(documents)
    }
}

/// Tags derived from a document name, e.g. `lol-matchmaking-fazenda` yields
/// `projeto`, the name, `lol`, `matchmaking`, `fazenda`, `lolmatchmakingfazenda`
/// and `lol matchmaking fazenda`
pub fn generate_tags(name: &str, is_project: bool) -> HashSet<String> {
    let name = name.to_lowercase();
    let mut tags = HashSet::new();
    tags.insert(if is_project { "projeto" } else { "portfolio" }.to_string());
    tags.insert(name.clone());
    for part in name.split(|c| c == '-' || c == '_').filter(|p| p.len() > 2) {
        tags.insert(part.to_string());
    }
    tags.insert(name.replace(['-', '_'], ""));
    tags.insert(name.replace(['-', '_'], " "));
    tags
}

fn is_safe_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !id.contains("..")
}

#[async_trait]
impl ContentProvider for FilesystemContentProvider {
    async fn list_documents(&self, language: Language) -> anyhow::Result<Vec<MarkdownDocument>> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(anyhow::anyhow!("Content directory not found: {}", self.root.display()));
        }
        let metadata = self.load_metadata().await;
        let general = self
            .read_documents(&self.root, false, language, &metadata)
            .await?;
        let projects = self
            .read_documents(&self.root.join(PROJECTS_DIR), true, language, &metadata)
            .await?;
        let work = self
            .read_documents(&self.root.join(WORK_DIR), true, language, &metadata)
            .await?;

        info!(
            "Loaded {} general, {} project and {} work markdowns ({}) from {}",
            general.len(),
            projects.len(),
            work.len(),
            language,
            self.root.display()
        );

        let mut documents = general;
        documents.extend(projects);
        documents.extend(work);
        Ok(documents)
    }

    async fn load_project_markdown(
        &self,
        project_id: &str,
        language: Language,
    ) -> anyhow::Result<Option<String>> {
        let id = project_id.trim().to_lowercase();
        if !is_safe_identifier(&id) {
            warn!("Rejected project identifier {:?}", project_id);
            return Ok(None);
        }

        // English variants first, then the base files; Portuguese never reads a variant
        let base = format!("{}.md", id);
        let mut files = Vec::with_capacity(2);
        if language == Language::En {
            files.push(format!("{}{}.md", id, ENGLISH_SUFFIX));
        }
        files.push(base);

        let candidates = files
            .iter()
            .flat_map(|file| [PROJECTS_DIR, WORK_DIR].map(|dir| self.root.join(dir).join(file)));
        for path in candidates {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) if !TextUtils::is_blank(&content) => return Ok(Some(content)),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()))
                }
            }
        }
        Ok(None)
    }
}
