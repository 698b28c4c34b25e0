//! Top-term summaries and the append-only report artifact.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TopicError};

/// ctime style, e.g. `Thu Oct 15 19:39:02 2026`
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Which branch produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Nmf,
    Lda,
}

impl ModelKind {
    pub fn heading(&self) -> &'static str {
        match self {
            ModelKind::Nmf => "=== NMF ERGEBNISSE ===",
            ModelKind::Lda => "=== LDA ERGEBNISSE ===",
        }
    }
}

/// One ranked term of a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTerm {
    pub term: String,
    pub weight: f64,
}

impl TopicTerm {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self { term: term.into(), weight }
    }
}

/// Top terms of every topic of one model, topic 0 first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub kind: ModelKind,
    pub topics: Vec<Vec<TopicTerm>>,
    /// render as `0.052*term` instead of bare terms
    pub show_weights: bool,
}

impl TopicSummary {
    pub fn new(kind: ModelKind, topics: Vec<Vec<TopicTerm>>) -> Self {
        Self { kind, topics, show_weights: false }
    }

    pub fn with_weights(mut self, show_weights: bool) -> Self {
        self.show_weights = show_weights;
        self
    }

    /// `Thema i: a, b, c` lines, 1-indexed
    pub fn lines(&self) -> Vec<String> {
        self.topics
            .iter()
            .enumerate()
            .map(|(idx, terms)| {
                let joined = terms
                    .iter()
                    .map(|t| {
                        if self.show_weights {
                            format!("{:.3}*{}", t.weight, t.term)
                        } else {
                            t.term.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Thema {}: {}", idx + 1, joined)
            })
            .collect()
    }

    /// The block appended to the report
    pub fn render(&self) -> String {
        let mut out = format!("\n{}\n", self.kind.heading());
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for TopicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Append-only report file.
///
/// The file is truncated exactly once, by [`Reporter::reset`]; every later
/// write appends.
#[derive(Debug)]
pub struct Reporter {
    path: PathBuf,
}

impl Reporter {
    /// Truncate the artifact and write the run header
    pub fn reset(path: impl AsRef<Path>, sample_rate: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(TopicError::Report)?;
        }
        let mut file = File::create(&path).map_err(TopicError::Report)?;
        write!(
            file,
            "REPORT START: {}\nSample-Rate: {:?}\n\n",
            Local::now().format(TIMESTAMP_FORMAT),
            sample_rate
        )
        .map_err(TopicError::Report)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one model block
    pub fn append(&self, summary: &TopicSummary) -> Result<()> {
        for line in summary.lines() {
            info!("   {line}");
        }
        self.append_text(&summary.render())
    }

    /// Mark the report complete
    pub fn finish(&self, total_minutes: f64) -> Result<()> {
        self.append_text(&format!(
            "\nREPORT END: {} ({:.1} min)\n",
            Local::now().format(TIMESTAMP_FORMAT),
            total_minutes
        ))
    }

    /// Mark the report as belonging to a failed run
    pub fn abort(&self, err: &TopicError) -> Result<()> {
        self.append_text(&format!("\nREPORT ABORTED ({}): {}\n", err.stage(), err))
    }

    fn append_text(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(TopicError::Report)?;
        file.write_all(text.as_bytes()).map_err(TopicError::Report)
    }
}
