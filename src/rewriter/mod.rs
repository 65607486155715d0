//! Stable id injection
//!
//! Rewriting walks the segment list of a parse. Literal segments and the
//! delimiters of untouched blocks are copied from the source as they are;
//! only the opening delimiter of each targeted block is re-rendered. The
//! result is re-parsed and checked before it is handed back, so a rewrite
//! either returns content that differs only in the targeted openers or
//! fails.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::block::{
    encode_attributes, encode_stable_id, parse, BlockInstance, BlockSpan, ParseError,
    ParsedContent, Segment, StableId, STABLE_ID_ATTR,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// No block starts at the given span
    #[error("No block at byte offset {offset}")]
    UnknownTarget { offset: usize },

    /// The block already has a well-formed stable id
    #[error("Block {position} already has stable id {id}")]
    AlreadyIdentified { position: usize, id: String },

    /// Rewritten content is not valid block markup
    #[error("Rewritten content does not parse: {0}")]
    Reparse(ParseError),

    /// Rewritten content differs from the source outside the targets
    #[error("Rewrite verification failed: {0}")]
    Verification(String),
}

/// Inject `assignments` into `content`.
///
/// `parsed` must be the parse of `content`. Each key of `assignments` is
/// the span of a block without a well-formed stable id.
pub fn rewrite(
    content: &str,
    parsed: &ParsedContent,
    assignments: &BTreeMap<BlockSpan, StableId>,
) -> Result<String, RewriteError> {
    let targets = resolve_targets(parsed, assignments)?;

    let mut out = String::with_capacity(content.len() + targets.len() * 32);
    for segment in &parsed.segments {
        match segment {
            Segment::Literal { span } => out.push_str(span.slice(content)),
            Segment::Block { index } => match targets.get(index) {
                Some(id) => out.push_str(&render_opener(content, &parsed.blocks[*index], id)),
                None => out.push_str(parsed.blocks[*index].opener.slice(content)),
            },
        }
    }

    verify(content, parsed, &out, &targets)?;
    Ok(out)
}

/// Map block index -> assigned id, rejecting bad targets.
fn resolve_targets<'a>(
    parsed: &ParsedContent,
    assignments: &'a BTreeMap<BlockSpan, StableId>,
) -> Result<BTreeMap<usize, &'a StableId>, RewriteError> {
    let mut targets = BTreeMap::new();
    for (span, id) in assignments {
        let block = parsed
            .find_by_span(*span)
            .ok_or(RewriteError::UnknownTarget { offset: span.start })?;
        if let Some(existing) = &block.stable_id {
            return Err(RewriteError::AlreadyIdentified {
                position: block.position,
                id: existing.to_string(),
            });
        }
        targets.insert(block.position, id);
    }
    Ok(targets)
}

/// Render the opening delimiter of `block` carrying `id`.
fn render_opener(content: &str, block: &BlockInstance, id: &StableId) -> String {
    let opener = block.opener;
    let injected = format!("\"{}\":{}", STABLE_ID_ATTR, encode_stable_id(id));

    match block.attrs_span {
        // A malformed stableId is replaced in place; the map is re-encoded.
        Some(attrs_span) if block.has_stable_id_key() => {
            let mut attrs = block.attrs.clone();
            attrs.insert(STABLE_ID_ATTR.to_string(), id.as_str().into());
            splice(content, opener, attrs_span, &encode_attributes(&attrs))
        }
        Some(attrs_span) if block.attrs.is_empty() => {
            splice(content, opener, attrs_span, &format!("{{{}}}", injected))
        }
        Some(attrs_span) => {
            // Append before the closing brace, keeping the original text.
            let brace = attrs_span.end - 1;
            let mut out = String::with_capacity(opener.len() + injected.len() + 1);
            out.push_str(&content[opener.start..brace]);
            out.push(',');
            out.push_str(&injected);
            out.push_str(&content[brace..opener.end]);
            out
        }
        None => {
            let bytes = content.as_bytes();
            let mut at = block.name_end;
            while at < opener.end && bytes[at].is_ascii_whitespace() {
                at += 1;
            }
            let mut out = String::with_capacity(opener.len() + injected.len() + 3);
            out.push_str(&content[opener.start..at]);
            out.push('{');
            out.push_str(&injected);
            out.push_str("} ");
            out.push_str(&content[at..opener.end]);
            out
        }
    }
}

fn splice(content: &str, opener: BlockSpan, replace: BlockSpan, with: &str) -> String {
    let mut out = String::with_capacity(opener.len() + with.len());
    out.push_str(&content[opener.start..replace.start]);
    out.push_str(with);
    out.push_str(&content[replace.end..opener.end]);
    out
}

/// Check the rewritten content against the original parse.
fn verify(
    original: &str,
    before: &ParsedContent,
    rewritten: &str,
    targets: &BTreeMap<usize, &StableId>,
) -> Result<(), RewriteError> {
    let after = parse(rewritten).map_err(RewriteError::Reparse)?;

    if after.block_count() != before.block_count() {
        return Err(RewriteError::Verification(format!(
            "block count changed from {} to {}",
            before.block_count(),
            after.block_count()
        )));
    }
    if after.segments.len() != before.segments.len() {
        return Err(RewriteError::Verification(
            "segment structure changed".to_string(),
        ));
    }

    for (old, new) in before.segments.iter().zip(&after.segments) {
        match (old, new) {
            (Segment::Literal { span: a }, Segment::Literal { span: b }) => {
                if a.slice(original) != b.slice(rewritten) {
                    return Err(RewriteError::Verification(format!(
                        "literal text at byte {} changed",
                        a.start
                    )));
                }
            }
            (Segment::Block { index: a }, Segment::Block { index: b }) if a == b => {
                let old_block = &before.blocks[*a];
                let new_block = &after.blocks[*b];
                if new_block.name != old_block.name {
                    return Err(RewriteError::Verification(format!(
                        "block {} changed type",
                        old_block.position
                    )));
                }
                match targets.get(a) {
                    Some(id) => {
                        if new_block.stable_id.as_ref() != Some(*id) {
                            return Err(RewriteError::Verification(format!(
                                "block {} does not carry {}",
                                old_block.position, id
                            )));
                        }
                    }
                    None => {
                        if old_block.opener.slice(original) != new_block.opener.slice(rewritten) {
                            return Err(RewriteError::Verification(format!(
                                "untargeted block {} changed",
                                old_block.position
                            )));
                        }
                    }
                }
            }
            _ => {
                return Err(RewriteError::Verification(
                    "segment structure changed".to_string(),
                ))
            }
        }
    }

    Ok(())
}
