#![allow(clippy::missing_docs_in_private_items)]
//! Tokenizer/Chunker (spec §4.2): decides whether an artifact is stored as
//! a single piece or split into overlapping, token-aware chunks, and
//! assigns each chunk a stable id. Grounded in
//! `ingestion-pipeline/src/pipeline/services.rs`'s `prepare_chunks`/
//! `get_tokenizer`, generalized to also track byte offsets so `Evidence`
//! spans can reference a chunk's source range.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use text_splitter::{ChunkCapacity, ChunkConfig, TextSplitter};

use crate::error::AppError;

/// A single chunk of an artifact's content, ready to be embedded and
/// written into the `chunks` vector namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub index: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// `chunk_id := "{artifact_id}::chunk::{index:03}::{sha256(content)[..8]}"`
/// (spec §4.2): stable across re-chunking runs as long as the chunk's text
/// doesn't change, so re-ingesting unchanged content is a no-op for the
/// vector store.
pub fn chunk_id(artifact_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{artifact_id}::chunk::{index:03}::{}", &digest[..8])
}

fn tokenizer() -> Result<&'static tokenizers::Tokenizer, AppError> {
    static TOKENIZER: OnceLock<Result<tokenizers::Tokenizer, String>> = OnceLock::new();
    match TOKENIZER.get_or_init(|| {
        tokenizers::Tokenizer::from_pretrained("bert-base-cased", None)
            .map_err(|e| format!("failed to initialize tokenizer: {e}"))
    }) {
        Ok(t) => Ok(t),
        Err(err) => Err(AppError::InternalError(err.clone())),
    }
}

/// Counts tokens the same way the chunker's sizer does, so callers can
/// decide whether a piece of content needs chunking at all (spec §4.2
/// "single-piece threshold").
pub fn count_tokens(text: &str) -> Result<usize, AppError> {
    let tokenizer = tokenizer()?;
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| AppError::InternalError(format!("tokenizer encode failed: {e}")))?;
    Ok(encoding.len())
}

/// Splits `text` into overlapping, token-bounded chunks. `target_tokens` is
/// the sizer's preferred chunk size; `overlap_tokens` chunks are repeated
/// at each boundary so evidence spans near a cut don't lose context
/// (spec §4.2). The final chunk is allowed to run up to
/// `target_tokens + 2 * target_tokens / 9` tokens (1100 for a 900 target,
/// the spec's ceiling) rather than spawn a near-empty trailing chunk.
pub fn chunk_text(
    artifact_id: &str,
    text: &str,
    target_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>, AppError> {
    if target_tokens == 0 {
        return Err(AppError::Validation(
            "chunk_target_tokens must be greater than zero".into(),
        ));
    }
    if overlap_tokens >= target_tokens {
        return Err(AppError::Validation(format!(
            "chunk_overlap_tokens ({overlap_tokens}) must be less than chunk_target_tokens ({target_tokens})"
        )));
    }

    let tokenizer = tokenizer()?;
    let capacity = ChunkCapacity::new(target_tokens)
        .with_max(target_tokens + 2 * target_tokens / 9)
        .map_err(|e| AppError::Validation(format!("invalid chunk token bounds: {e}")))?;
    let config = ChunkConfig::new(capacity)
        .with_overlap(overlap_tokens)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?
        .with_sizer(tokenizer);
    let splitter = TextSplitter::new(config);

    let mut chunks = Vec::new();
    for (index, (offset, piece)) in splitter.chunk_indices(text).enumerate() {
        chunks.push(Chunk {
            id: chunk_id(artifact_id, index, piece),
            index,
            text: piece.to_owned(),
            start_char: offset,
            end_char: offset + piece.len(),
        });
    }

    if chunks.is_empty() {
        chunks.push(Chunk {
            id: chunk_id(artifact_id, 0, text),
            index: 0,
            text: text.to_owned(),
            start_char: 0,
            end_char: text.len(),
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable_for_identical_text() {
        let a = chunk_id("art_abc", 0, "hello world");
        let b = chunk_id("art_abc", 0, "hello world");
        assert_eq!(a, b);
        let c = chunk_id("art_abc", 1, "hello world");
        assert_ne!(a, c, "index participates in the id");
    }

    #[test]
    fn chunk_text_rejects_overlap_not_smaller_than_target() {
        let err = chunk_text("art_1", "hello", 100, 100).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn chunk_text_produces_contiguous_offsets_into_source() {
        let text = "Alpha sentence one. Beta sentence two. Gamma sentence three. Delta sentence four.";
        let chunks = chunk_text("art_1", text, 6, 2).expect("chunk");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(&text[chunk.start_char..chunk.end_char], chunk.text);
        }
    }

    #[test]
    fn short_text_yields_a_single_chunk() {
        let chunks = chunk_text("art_1", "just a few words", 900, 100).expect("chunk");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a few words");
    }
}
