//! Hybrid retrieval: dense ranking + BM25 ranking merged with reciprocal
//! rank fusion.
//!
//! # Algorithm
//!
//! 1. Dense score per entry: dot product of the query embedding with the
//!    entry embedding. Both are L2-normalized upstream, so this is cosine
//!    similarity.
//! 2. Lexical score per entry: Okapi BM25 (the `bm25` crate) over
//!    lower-cased, whitespace-tokenized text.
//! 3. Each score vector is turned into a full descending ranking. Equal scores
//!    keep corpus order.
//! 4. Fusion: an entry at 1-based rank `r` in a ranking gains `1 / (k_rrf + r)`;
//!    gains are summed over both rankings.
//! 5. Entries are ordered by fused score (desc), ties again by corpus order,
//!    and truncated to `top_k`.
//!
//! All three scores are returned per hit. Score vectors whose length differs
//! from the corpus size are rejected with [`FusionError`].

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::FusionError;

/// Conventional RRF constant (Cormack, Clarke & Buettcher, SIGIR 2009).
pub const DEFAULT_K_RRF: usize = 60;

/// One retrievable passage.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    pub top_k: usize,
    pub k_rrf: usize,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            top_k: 8,
            k_rrf: DEFAULT_K_RRF,
        }
    }
}

/// Fused scores for one corpus position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusedScore {
    /// Position in the input corpus.
    pub index: usize,
    pub dense_score: f64,
    pub lexical_score: f64,
    pub fused_score: f64,
}

/// A ranked passage with all three scores.
#[derive(Debug, Clone, Serialize)]
pub struct FusedHit {
    pub index: usize,
    pub id: String,
    pub text: String,
    pub dense_score: f64,
    pub lexical_score: f64,
    pub fused_score: f64,
}

/// Lower-case and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// [`tokenize`] as a `bm25` tokenizer: no stemming, no stop words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl bm25::Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// BM25 index over an in-memory corpus, backed by the `bm25` crate.
pub struct Bm25Index {
    /// `None` when the corpus has no tokens at all; every score is then 0.
    embedder: Option<bm25::Embedder<u32, WhitespaceTokenizer>>,
    scorer: bm25::Scorer<usize>,
    len: usize,
}

impl Bm25Index {
    pub fn new<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::with_params(texts, Bm25Params::default())
    }

    pub fn with_params<S: AsRef<str>>(texts: &[S], params: Bm25Params) -> Self {
        let corpus: Vec<&str> = texts.iter().map(|t| t.as_ref()).collect();
        let mut scorer = bm25::Scorer::<usize>::new();

        let has_tokens = corpus.iter().any(|t| !t.trim().is_empty());
        let embedder = has_tokens.then(|| {
            bm25::EmbedderBuilder::<u32, WhitespaceTokenizer>::with_tokenizer_and_fit_to_corpus(
                WhitespaceTokenizer,
                &corpus,
            )
            .k1(params.k1)
            .b(params.b)
            .build()
        });

        if let Some(embedder) = &embedder {
            for (index, text) in corpus.iter().enumerate() {
                scorer.upsert(&index, embedder.embed(text));
            }
        }

        Self {
            embedder,
            scorer,
            len: corpus.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// BM25 score of `query` against every entry, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let Some(embedder) = &self.embedder else {
            return vec![0.0; self.len];
        };
        let query_embedding = embedder.embed(query);
        (0..self.len)
            .map(|index| {
                self.scorer
                    .score(&index, &query_embedding)
                    .map(f64::from)
                    .unwrap_or(0.0)
            })
            .collect()
    }
}

/// Dot product of `query` with every entry vector.
pub fn dense_scores<'a, I>(query: &[f32], vectors: I) -> Result<Vec<f64>, FusionError>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    vectors
        .into_iter()
        .enumerate()
        .map(|(index, v)| {
            if v.len() != query.len() {
                return Err(FusionError::DimensionMismatch {
                    index,
                    expected: query.len(),
                    actual: v.len(),
                });
            }
            Ok(query
                .iter()
                .zip(v)
                .map(|(a, b)| f64::from(*a) * f64::from(*b))
                .sum::<f64>())
        })
        .collect()
}

/// Order indices by descending score; equal scores keep index order.
/// NaN sorts last.
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&i, &j| {
        descending(sortable(scores[i]), sortable(scores[j])).then(i.cmp(&j))
    });
    order
}

/// Sum `1 / (k_rrf + rank)` over every ranking, per item.
pub fn reciprocal_rank_fusion(
    rankings: &[Vec<usize>],
    len: usize,
    k_rrf: usize,
) -> Result<Vec<f64>, FusionError> {
    let mut fused = vec![0.0f64; len];
    let k = k_rrf as f64;
    for ranking in rankings {
        for (pos, &index) in ranking.iter().enumerate() {
            let slot = fused
                .get_mut(index)
                .ok_or(FusionError::RankOutOfRange { index, len })?;
            *slot += 1.0 / (k + (pos + 1) as f64);
        }
    }
    Ok(fused)
}

/// Fuse precomputed dense and lexical score vectors for a corpus of
/// `corpus_len` entries.
pub fn fuse(
    corpus_len: usize,
    dense: &[f64],
    lexical: &[f64],
    params: FusionParams,
) -> Result<Vec<FusedScore>, FusionError> {
    if dense.len() != corpus_len {
        return Err(FusionError::LengthMismatch {
            ranking: "dense",
            expected: corpus_len,
            actual: dense.len(),
        });
    }
    if lexical.len() != corpus_len {
        return Err(FusionError::LengthMismatch {
            ranking: "lexical",
            expected: corpus_len,
            actual: lexical.len(),
        });
    }

    let rankings = vec![rank_descending(dense), rank_descending(lexical)];
    let fused = reciprocal_rank_fusion(&rankings, corpus_len, params.k_rrf)?;

    let mut scored: Vec<FusedScore> = (0..corpus_len)
        .map(|index| FusedScore {
            index,
            dense_score: dense[index],
            lexical_score: lexical[index],
            fused_score: fused[index],
        })
        .collect();

    scored.sort_by(|a, b| descending(a.fused_score, b.fused_score).then(a.index.cmp(&b.index)));
    scored.truncate(params.top_k);
    Ok(scored)
}

/// Rank `corpus` against `query` / `query_vec` and return the top hits.
pub fn hybrid_search(
    query: &str,
    query_vec: &[f32],
    corpus: &[CorpusEntry],
    params: FusionParams,
) -> Result<Vec<FusedHit>, FusionError> {
    if corpus.is_empty() {
        return Ok(Vec::new());
    }

    let dense = dense_scores(query_vec, corpus.iter().map(|e| e.vector.as_slice()))?;
    let texts: Vec<&str> = corpus.iter().map(|e| e.text.as_str()).collect();
    let lexical = Bm25Index::new(texts.as_slice()).scores(query);

    let fused = fuse(corpus.len(), &dense, &lexical, params)?;

    Ok(fused
        .into_iter()
        .map(|s| {
            let entry = &corpus[s.index];
            FusedHit {
                index: s.index,
                id: entry.id.clone(),
                text: entry.text.clone(),
                dense_score: s.dense_score,
                lexical_score: s.lexical_score,
                fused_score: s.fused_score,
            }
        })
        .collect())
}

fn sortable(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
