//! Query-side helpers: the N-gram fallback and result projection.

use chrono::DateTime;
use docdex_core::{RetrievedChunk, StoreError};
use docdex_store::{ChunkHit, MetadataStore};
use tracing::debug;

/// Punctuation stripped from queries before word-splitting.
const QUERY_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '(', ')', '-'];

/// Build every length-`n` contiguous word window of `input` as an FTS5
/// `NEAR(...)` term.
///
/// Punctuation is removed first; `n` is clamped to the word count. The
/// NEAR proximity is the window's joined character length: the trigram
/// tokenizer assigns one position per character, so adjacent words sit a
/// word-length apart and a word-count proximity would never match.
pub fn generate_grams(input: &str, n: usize) -> Vec<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !QUERY_PUNCTUATION.contains(c))
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let n = n.min(words.len());
    if n == 0 {
        return Vec::new();
    }

    words
        .windows(n)
        .map(|window| {
            let quoted: Vec<String> = window.iter().map(|w| format!("\"{w}\"")).collect();
            let span: usize =
                window.iter().map(|w| w.len()).sum::<usize>() + window.len() - 1;
            format!("NEAR({}, {span})", quoted.join(" "))
        })
        .collect()
}

/// Trigram fallback search (§4.5): try the widest word window first and
/// degrade to shorter ones, stopping at the first `n` that matches anything.
/// Windows below three words are never tried.
pub fn search_trigram(
    store: &MetadataStore,
    collections: &[String],
    query: &str,
    limit: usize,
) -> Result<Vec<ChunkHit>, StoreError> {
    let word_count = query.split_whitespace().count();
    for n in (3..=word_count).rev() {
        let grams = generate_grams(query, n);
        if grams.is_empty() {
            continue;
        }
        let expr = grams.join(" OR ");
        let hits = store.search_fts(&expr, collections, limit)?;
        if !hits.is_empty() {
            debug!(n, hits = hits.len(), "ngram query matched");
            return Ok(hits);
        }
    }
    Ok(Vec::new())
}

/// Project a store row into the retrieval result shape.
pub fn to_retrieved(hit: ChunkHit) -> RetrievedChunk {
    RetrievedChunk {
        file: hit.file,
        title: hit.title,
        author: hit.author,
        date: format_date(hit.document_time),
        text: hit.text,
        page: hit.page,
        line_from: hit.line_from,
        line_to: hit.line_to,
    }
}

/// Render a document mtime as `yyyy, MMMM dd`.
fn format_date(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y, %B %d").to_string())
        .unwrap_or_default()
}
