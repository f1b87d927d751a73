mod tokenize;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tabi_core::{CollaboratorError, FaqAnswer, FaqLookup};
use tracing::{debug, info};
use walkdir::WalkDir;

pub use tokenize::tokenize;

#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    /// `None` means the entry applies to every company.
    #[serde(default)]
    pub company_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FaqFile {
    List(Vec<FaqEntry>),
    Wrapped { faqs: Vec<FaqEntry> },
    Single(FaqEntry),
}

#[derive(Debug, Clone)]
struct IndexedFaq {
    entry: FaqEntry,
    tokens: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaqStats {
    pub entries: usize,
    pub company_specific: usize,
    pub files_loaded: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FaqIndex {
    entries: Vec<IndexedFaq>,
    files_loaded: usize,
}

impl FaqIndex {
    pub fn from_entries(entries: Vec<FaqEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| !entry.question.trim().is_empty() && !entry.answer.trim().is_empty())
            .map(|entry| IndexedFaq {
                tokens: tokenize(&entry.question).into_iter().collect(),
                entry,
            })
            .collect();
        Self {
            entries,
            files_loaded: 0,
        }
    }

    /// Loads every `.json` file below `path`. A file holds a list of entries,
    /// `{"faqs": [...]}`, or a single entry.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        let mut entries = Vec::new();
        let mut files_loaded = 0;

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("json"))
        {
            let path = entry.path();
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading FAQ file: {}", path.display()))?;
            let parsed: FaqFile = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing FAQ file: {}", path.display()))?;
            match parsed {
                FaqFile::List(list) | FaqFile::Wrapped { faqs: list } => entries.extend(list),
                FaqFile::Single(single) => entries.push(single),
            }
            files_loaded += 1;
        }

        let mut index = Self::from_entries(entries);
        index.files_loaded = files_loaded;
        info!(
            path = %root.display(),
            files = files_loaded,
            entries = index.entries.len(),
            "faq index loaded"
        );
        Ok(index)
    }

    pub fn stats(&self) -> FaqStats {
        FaqStats {
            entries: self.entries.len(),
            company_specific: self
                .entries
                .iter()
                .filter(|faq| faq.entry.company_id.is_some())
                .count(),
            files_loaded: self.files_loaded,
        }
    }

    /// Best entry visible to `company_id` with its token-overlap score.
    /// Company entries win ties against global ones.
    pub fn best_match(&self, query: &str, company_id: &str) -> Option<(&FaqEntry, f32)> {
        let query_tokens = tokenize(query).into_iter().collect::<HashSet<_>>();
        if query_tokens.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .filter(|faq| {
                faq.entry
                    .company_id
                    .as_deref()
                    .map_or(true, |owner| owner == company_id)
            })
            .map(|faq| (faq, overlap_score(&query_tokens, &faq.tokens)))
            .filter(|(_, score)| *score > 0.0)
            .max_by(|(a, a_score), (b, b_score)| {
                a_score
                    .partial_cmp(b_score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.entry.company_id.is_some().cmp(&b.entry.company_id.is_some()))
            })
            .map(|(faq, score)| (&faq.entry, score))
    }
}

impl FaqLookup for FaqIndex {
    fn lookup(&self, text: &str, company_id: &str) -> Result<FaqAnswer, CollaboratorError> {
        match self.best_match(text, company_id) {
            Some((entry, score)) => {
                debug!(company_id, score, question = %entry.question, "faq match");
                Ok(FaqAnswer {
                    answer: entry.answer.clone(),
                    confidence_hint: score,
                })
            }
            None => Ok(FaqAnswer {
                answer: String::new(),
                confidence_hint: 0.0,
            }),
        }
    }
}

fn overlap_score(query_tokens: &HashSet<String>, doc_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() || doc_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens
        .iter()
        .filter(|token| doc_tokens.contains(*token))
        .count() as f32;

    overlap / query_tokens.len() as f32
}
