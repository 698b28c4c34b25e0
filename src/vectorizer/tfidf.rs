/// TF-IDF weighting strategy plugged into [`super::TfidfVectorizer`]
pub trait TfidfEngine {
    /// IDFを計算する
    /// # Arguments
    /// * `doc_num` - documents in the fitted corpus
    /// * `doc_count` - documents containing the term
    fn idf(doc_num: u64, doc_count: u64) -> f64;

    /// Turn raw counts (already multiplied by idf) into the final row weights
    fn normalize(row: &mut [(usize, f64)]);
}

/// デフォルトのTF-IDFエンジン
/// smoothed idf `ln((1 + n) / (1 + df)) + 1`, L2 normalized rows
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTfidfEngine;

impl TfidfEngine for DefaultTfidfEngine {
    #[inline]
    fn idf(doc_num: u64, doc_count: u64) -> f64 {
        ((1.0 + doc_num as f64) / (1.0 + doc_count as f64)).ln() + 1.0
    }

    fn normalize(row: &mut [(usize, f64)]) {
        let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|(_, w)| *w /= norm);
        }
    }
}
