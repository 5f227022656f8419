//! Document parsing (§3): markdown source → ordered `Sentence` sequence.
//! Two stages, each independently testable: block extraction
//! ([`markdown`]) and boundary detection ([`boundary`]).

pub mod boundary;
pub mod markdown;

use crate::model::{DocumentId, Sentence};

pub use markdown::CodeBlockMode;

/// Sentences shorter than this (after trimming) are dropped — stray
/// punctuation or a lone list bullet left over after markdown stripping,
/// not something worth synthesizing.
const MIN_SENTENCE_LEN: usize = 3;

/// Sentences longer than this are truncated before becoming a `Sentence`.
const MAX_SENTENCE_LEN: usize = 1000;

pub fn parse_document(source: &str, code_block_mode: CodeBlockMode) -> Vec<Sentence> {
    let blocks = markdown::markdown_to_blocks(source, code_block_mode);
    let mut sentences = Vec::new();
    let mut position = 0usize;
    let mut next_id = 0u64;

    for block in blocks {
        for range in boundary::split_sentences(&block.text) {
            let mut text = block.text[range.clone()].to_string();
            if text.trim().len() < MIN_SENTENCE_LEN {
                continue;
            }
            let mut source_end = block.source_range.start + range.end;
            if text.len() > MAX_SENTENCE_LEN {
                let cut = floor_char_boundary(&text, MAX_SENTENCE_LEN);
                source_end = block.source_range.start + range.start + cut;
                text.truncate(cut);
            }
            let source_start = block.source_range.start + range.start;
            sentences.push(Sentence::new(next_id, text, position, source_start..source_end));
            next_id += 1;
            position += 1;
        }
    }

    sentences
}

/// Identifies `source` by the hash of its raw bytes, so a controller can
/// tell a reloaded document apart from a genuinely new one without
/// re-parsing twice.
pub fn document_id(source: &str) -> DocumentId {
    DocumentId::from_source(source)
}

/// The largest byte index `<= len` that lands on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, len: usize) -> usize {
    let mut idx = len.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
