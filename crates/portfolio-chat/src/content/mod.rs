//! Content module - Sources of markdown documents that feed the context engine

pub mod filesystem;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use filesystem::FilesystemContentProvider;

/// Language of the documents and of the base prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Pt, Language::En];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::En => "en",
        }
    }

    /// Lenient parse for header values such as `en-US,en;q=0.9`; missing or unknown values map to `fallback`
    pub fn from_header(value: Option<&str>, fallback: Language) -> Self {
        value
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .trim()
            .split(|c| c == '-' || c == '_' || c == ';')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match primary.as_str() {
            "pt" => Ok(Language::Pt),
            "en" => Ok(Language::En),
            other => Err(anyhow::anyhow!("Unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A markdown document with the metadata the search index needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownDocument {
    pub name: String,
    pub path: String,
    pub content: String,
    pub is_project: bool,
    pub is_preferred_fallback: bool,
    pub tags: HashSet<String>,
}

/// Source of truth for the context engine reloads
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn list_documents(&self, language: Language) -> anyhow::Result<Vec<MarkdownDocument>>;

    /// Markdown for one project, by normalized identifier
    async fn load_project_markdown(
        &self,
        project_id: &str,
        language: Language,
    ) -> anyhow::Result<Option<String>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory provider for tests; can be switched to fail
    #[derive(Default)]
    pub struct StaticContentProvider {
        pub documents: Mutex<Vec<MarkdownDocument>>,
        pub fail: AtomicBool,
        pub list_calls: AtomicUsize,
    }

    impl StaticContentProvider {
        pub fn new(documents: Vec<MarkdownDocument>) -> Self {
            Self {
                documents: Mutex::new(documents),
                ..Default::default()
            }
        }

        pub fn set_documents(&self, documents: Vec<MarkdownDocument>) {
            *self.documents.lock().unwrap() = documents;
        }

        pub fn calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentProvider for StaticContentProvider {
        async fn list_documents(&self, _language: Language) -> anyhow::Result<Vec<MarkdownDocument>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("content source unreachable"));
            }
            Ok(self.documents.lock().unwrap().clone())
        }

        async fn load_project_markdown(
            &self,
            project_id: &str,
            _language: Language,
        ) -> anyhow::Result<Option<String>> {
            Ok(self
                .documents
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.is_project && d.name == project_id)
                .map(|d| d.content.clone()))
        }
    }

    pub fn doc(name: &str, content: &str, is_project: bool, preferred: bool, tags: &[&str]) -> MarkdownDocument {
        MarkdownDocument {
            name: name.to_string(),
            path: format!("{name}.md"),
            content: content.to_string(),
            is_project,
            is_preferred_fallback: preferred,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!("pt-BR".parse::<Language>().unwrap(), Language::Pt);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_from_header_defaults() {
        assert_eq!(Language::from_header(Some("en-US,en;q=0.9"), Language::Pt), Language::En);
        assert_eq!(Language::from_header(Some("de"), Language::Pt), Language::Pt);
        assert_eq!(Language::from_header(None, Language::En), Language::En);
    }
}
