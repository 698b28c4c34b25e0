//! Corpus loading and reproducible down-sampling.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SamplingConfig;
use crate::error::{Result, TopicError};
use crate::utils::size::{format_bytes, HeapSize};

/// One record of the serialized corpus.
/// Fields other than `clean_text` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusRecord {
    #[serde(default)]
    pub clean_text: Option<String>,
}

/// Encoding of the corpus file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// one JSON record per line
    JsonLines,
    /// a single JSON array of records
    Json,
    /// a CBOR array of records
    Cbor,
}

impl CorpusFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => CorpusFormat::Json,
            Some("cbor") => CorpusFormat::Cbor,
            _ => CorpusFormat::JsonLines,
        }
    }
}

/// Ordered, non-empty cleaned documents.
/// Identity is the position after sampling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSet {
    docs: Vec<String>,
}

impl DocumentSet {
    /// Build from raw texts, dropping empty ones
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let docs = texts
            .into_iter()
            .map(Into::into)
            .filter(|text: &String| !text.is_empty())
            .collect();
        Self { docs }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.docs
    }

    /// Hand the texts over; the set is gone afterwards
    pub fn into_inner(self) -> Vec<String> {
        self.docs
    }

    /// Keep `round(fraction * len)` documents drawn without replacement.
    ///
    /// A fraction of 1.0 keeps every document in source order. Otherwise the
    /// order is the draw order of a `StdRng` seeded with `seed`. The unsampled
    /// superset is released before this returns.
    pub fn sample(self, fraction: f64, seed: u64) -> Result<Self> {
        if self.docs.is_empty() {
            return Err(TopicError::EmptyCorpus);
        }
        if fraction >= 1.0 {
            return Ok(self);
        }
        let total = self.docs.len();
        // ties to even, 2.5 -> 2
        let amount = (fraction * total as f64).round_ties_even() as usize;
        if amount == 0 {
            return Err(TopicError::EmptyCorpus);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let picked = rand::seq::index::sample(&mut rng, total, amount);
        let mut source = self.docs;
        let docs = picked
            .into_iter()
            .map(|idx| std::mem::take(&mut source[idx]))
            .collect();
        // 元の集合はここで解放
        drop(source);
        debug!(total, amount, "sampled documents");
        Ok(Self { docs })
    }
}

impl HeapSize for DocumentSet {
    fn heap_bytes(&self) -> usize {
        self.docs.heap_bytes()
    }
}

/// Read every non-empty `clean_text` from the corpus file
pub fn read_documents(path: &Path) -> Result<DocumentSet> {
    let file = File::open(path).map_err(|source| TopicError::DataUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let format = CorpusFormat::from_path(path);
    debug!(?format, path = %path.display(), "reading corpus");

    let texts = match format {
        CorpusFormat::JsonLines => read_json_lines(reader)?,
        CorpusFormat::Json => {
            let records: Vec<CorpusRecord> = serde_json::from_reader(reader)
                .map_err(|err| TopicError::Decode(err.to_string()))?;
            records.into_iter().filter_map(|r| r.clean_text).collect()
        }
        CorpusFormat::Cbor => {
            let records: Vec<CorpusRecord> = serde_cbor::from_reader(reader)
                .map_err(|err| TopicError::Decode(err.to_string()))?;
            records.into_iter().filter_map(|r| r.clean_text).collect()
        }
    };
    Ok(DocumentSet::from_texts(texts))
}

fn read_json_lines<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| TopicError::Decode(format!("line {}: {err}", line_no + 1)))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CorpusRecord = serde_json::from_str(&line)
            .map_err(|err| TopicError::Decode(format!("line {}: {err}", line_no + 1)))?;
        if let Some(text) = record.clean_text {
            texts.push(text);
        }
    }
    Ok(texts)
}

/// Load, filter and sample the corpus
pub fn load_documents(path: &Path, sampling: &SamplingConfig) -> Result<DocumentSet> {
    let all = read_documents(path)?;
    if all.is_empty() {
        return Err(TopicError::EmptyCorpus);
    }
    let filtered = all.len();
    let docs = all.sample(sampling.fraction, sampling.seed)?;
    info!(
        filtered,
        sampled = docs.len(),
        fraction = sampling.fraction,
        resident = %format_bytes(docs.heap_bytes()),
        "documents loaded"
    );
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_jsonl(texts: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        for text in texts {
            writeln!(file, "{}", serde_json::json!({ "clean_text": text, "id": 1 })).unwrap();
        }
        file
    }

    fn numbered(n: usize) -> DocumentSet {
        DocumentSet::from_texts((0..n).map(|i| format!("doc {i}")))
    }

    #[test]
    fn empty_texts_are_filtered() {
        let file = write_jsonl(&["a b", "", "c", ""]);
        let docs = read_documents(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs.iter().collect::<Vec<_>>(), vec!["a b", "c"]);
    }

    #[test]
    fn missing_source_is_data_unavailable() {
        let err = read_documents(Path::new("/definitely/not/here.jsonl")).unwrap_err();
        assert!(matches!(err, TopicError::DataUnavailable { .. }));
    }

    #[test]
    fn only_empty_documents_is_empty_corpus() {
        let file = write_jsonl(&["", ""]);
        let sampling = SamplingConfig { fraction: 1.0, seed: 42 };
        let err = load_documents(file.path(), &sampling).unwrap_err();
        assert!(matches!(err, TopicError::EmptyCorpus));
    }

    #[test]
    fn sampling_is_deterministic_for_a_seed() {
        let a = numbered(100).sample(0.3, 42).unwrap();
        let b = numbered(100).sample(0.3, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 30);
        let c = numbered(100).sample(0.3, 7).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn sampling_draws_without_replacement() {
        let docs = numbered(50).sample(0.5, 1).unwrap();
        let mut seen: Vec<&str> = docs.iter().collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn full_fraction_keeps_every_document_in_order() {
        let docs = numbered(17).sample(1.0, 42).unwrap();
        assert_eq!(docs, numbered(17));
    }

    #[test]
    fn sampling_rounds_half_to_even() {
        assert_eq!(numbered(10).sample(0.25, 3).unwrap().len(), 2);
        assert_eq!(numbered(6).sample(0.25, 3).unwrap().len(), 2);
        assert_eq!(numbered(10).sample(0.3, 3).unwrap().len(), 3);
        assert!(matches!(numbered(1).sample(0.3, 3), Err(TopicError::EmptyCorpus)));
    }

    #[test]
    fn json_array_and_cbor_sources_are_read() {
        let records = vec![
            CorpusRecord { clean_text: Some("rust speed".into()) },
            CorpusRecord { clean_text: None },
            CorpusRecord { clean_text: Some("safe rust".into()) },
        ];

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(serde_json::to_string(&records).unwrap().as_bytes()).unwrap();
        assert_eq!(read_documents(json.path()).unwrap().len(), 2);

        let mut cbor = tempfile::Builder::new().suffix(".cbor").tempfile().unwrap();
        cbor.write_all(&serde_cbor::to_vec(&records).unwrap()).unwrap();
        assert_eq!(read_documents(cbor.path()).unwrap().len(), 2);
    }

    #[test]
    fn malformed_line_is_decode_error() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(file, "{{\"clean_text\": \"ok\"}}").unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_documents(file.path()).unwrap_err();
        assert!(matches!(err, TopicError::Decode(msg) if msg.starts_with("line 2")));
    }
}
