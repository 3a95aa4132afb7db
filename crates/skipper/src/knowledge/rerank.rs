use std::collections::{BTreeSet, HashMap};

use super::store::Chunk;

/// Reciprocal Rank Fusion constant
const RRF_K: f64 = 60.0;
const MIN_TERM_LEN: usize = 3;

/// Lexical fallback ranking used when no cross-encoder is available.
///
/// Fuses the vector-similarity rank with a keyword-overlap rank:
/// `score = 1/(k + vector_rank) + 1/(k + keyword_rank)`. The fused score
/// replaces each chunk's similarity. A query without usable terms leaves the
/// order untouched.
pub fn rrf_rerank(query: &str, chunks: Vec<Chunk>) -> Vec<Chunk> {
    let terms = unique_lower_terms(query);
    if chunks.is_empty() || terms.is_empty() {
        return chunks;
    }

    let keyword_scores: Vec<f64> = chunks
        .iter()
        .map(|chunk| keyword_overlap(&terms, &chunk.text))
        .collect();
    let vector_rank = ranks_by(&chunks.iter().map(|c| c.similarity).collect::<Vec<_>>());
    let keyword_rank = ranks_by(&keyword_scores);

    let mut scored: Vec<(f64, Chunk)> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let score =
                1.0 / (RRF_K + vector_rank[i] as f64) + 1.0 / (RRF_K + keyword_rank[i] as f64);
            (score, chunk)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .map(|(score, mut chunk)| {
            chunk.similarity = score;
            chunk
        })
        .collect()
}

/// 1-based rank of each position when sorted by descending score, ties kept in input order
fn ranks_by(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    let mut ranks = vec![0; scores.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = rank + 1;
    }
    ranks
}

fn unique_lower_terms(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_TERM_LEN)
        .map(String::from)
        .collect()
}

/// Fraction of query terms found in the text
fn keyword_overlap(terms: &BTreeSet<String>, text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let found = terms.iter().filter(|term| lower.contains(term.as_str())).count();
    found as f64 / terms.len() as f64
}

/// Keep at most `max_per_source` chunks per source URL and `limit` overall,
/// preserving rank order
pub fn deduplicate_by_source(chunks: Vec<Chunk>, limit: usize, max_per_source: usize) -> Vec<Chunk> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(limit.min(chunks.len()));
    for chunk in chunks {
        if result.len() >= limit {
            break;
        }
        let count = per_source.entry(chunk.source_url.clone()).or_default();
        if *count >= max_per_source {
            continue;
        }
        *count += 1;
        result.push(chunk);
    }
    result
}
