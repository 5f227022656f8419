//! Markdown → plain-text block extraction (§3 source parsing). Walks the
//! `pulldown-cmark` event stream rather than regexing markdown syntax out
//! of raw text, so nested constructs (a link inside a list item inside a
//! blockquote) are handled by the same rules as the top level.
//!
//! Source ranges are best-effort: `pulldown-cmark`'s offset iterator gives
//! byte ranges per event, but block text is built by concatenating several
//! events' text, so a block's final range is the span from its first to
//! its last contributing event. Callers must not treat these as exact.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// One block-level chunk of plain text (a paragraph, heading, list item,
/// or blockquote line) with its best-effort source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
    pub source_range: Range<usize>,
}

/// How fenced/indented code blocks are handled. Skipping is the default;
/// `Include` emits a placeholder marker in their place instead of the
/// literal code, so a listener still hears that one was there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeBlockMode {
    #[default]
    Skip,
    Include,
}

pub fn markdown_to_blocks(markdown: &str, code_block_mode: CodeBlockMode) -> Vec<TextBlock> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(markdown, options).into_offset_iter();

    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_start: Option<usize> = None;
    let mut current_end = 0usize;
    let mut in_code_block = false;
    let mut blockquote_depth = 0usize;

    // Images don't contribute running text directly; their alt text (or,
    // failing that, title) is captured into its own buffer and emitted as
    // a single "[Image: ...]" marker once the tag closes.
    let mut image_depth = 0usize;
    let mut image_alt = String::new();
    let mut image_title = String::new();

    for (event, range) in parser {
        if current_start.is_none() && !matches!(event, Event::End(_)) {
            current_start = Some(range.start);
        }
        current_end = range.end;

        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph | Tag::Heading { .. } | Tag::Item | Tag::TableCell => {
                    push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
                    current_start = Some(range.start);
                }
                Tag::BlockQuote(_) => {
                    push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
                    blockquote_depth += 1;
                    current_start = Some(range.start);
                }
                Tag::CodeBlock(CodeBlockKind::Fenced(_)) | Tag::CodeBlock(CodeBlockKind::Indented) => {
                    in_code_block = true;
                }
                Tag::Image { title, .. } => {
                    image_depth += 1;
                    if image_depth == 1 {
                        image_alt.clear();
                        image_title = title.to_string();
                    }
                }
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableCell => {
                    push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
                }
                TagEnd::BlockQuote(_) => {
                    push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
                    blockquote_depth = blockquote_depth.saturating_sub(1);
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    if code_block_mode == CodeBlockMode::Include {
                        current.push_str("[Code block omitted] ");
                    }
                }
                TagEnd::Image => {
                    image_depth = image_depth.saturating_sub(1);
                    if image_depth == 0 {
                        let label = if !image_alt.trim().is_empty() { image_alt.trim() } else { image_title.trim() };
                        current.push_str("[Image: ");
                        current.push_str(label);
                        current.push_str("] ");
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if image_depth > 0 {
                    image_alt.push_str(&text);
                } else if !in_code_block {
                    current.push_str(&text);
                }
            }
            Event::Code(code) => {
                if image_depth == 0 {
                    current.push_str(&format!("`{code}`"));
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if image_depth > 0 {
                    image_alt.push(' ');
                } else if !in_code_block {
                    current.push(' ');
                }
            }
            Event::Rule => {
                push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
            }
            _ => {}
        }
    }

    push_current(&mut blocks, &mut current, &mut current_start, current_end, blockquote_depth);
    blocks
}

fn push_current(blocks: &mut Vec<TextBlock>, current: &mut String, start: &mut Option<usize>, end: usize, blockquote_depth: usize) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        let text = if blockquote_depth > 0 {
            format!("Quote: {}", collapse_whitespace(trimmed))
        } else {
            collapse_whitespace(trimmed)
        };
        blocks.push(TextBlock { text, source_range: start.unwrap_or(0)..end });
    }
    current.clear();
    *start = None;
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
