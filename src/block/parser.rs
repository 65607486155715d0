//! Block delimiter tokenizer and structural parser
//!
//! Grammar:
//!
//! ```text
//! opener  = "<!--" WS "wp:" NAME WS [ ATTRS WS ] "-->"
//! void    = "<!--" WS "wp:" NAME WS [ ATTRS WS ] "/-->"
//! closer  = "<!--" WS "/wp:" NAME WS "-->"
//! NAME    = [ ns "/" ] name          ; bare names live in "core/"
//! ATTRS   = JSON object, ends at the first "}" followed by WS "/"? "-->"
//! ```
//!
//! Every other byte, closers included, belongs to a literal segment.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::attrs::{stable_id_of, StableId, STABLE_ID_ATTR};
use super::errors::{ParseError, ParseErrorKind, ParseResult};

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

static BLOCK_PREFIX: OnceLock<Regex> = OnceLock::new();
static DELIMITER_HEAD: OnceLock<Regex> = OnceLock::new();

/// Cheap test: does this comment claim to be a block delimiter?
fn block_prefix() -> &'static Regex {
    BLOCK_PREFIX.get_or_init(|| Regex::new(r"^<!--\s+/?wp:").expect("block prefix pattern is valid"))
}

fn delimiter_head() -> &'static Regex {
    DELIMITER_HEAD.get_or_init(|| {
        Regex::new(r"^<!--\s+(/)?wp:((?:[a-z][a-z0-9_-]*/)?[a-z][a-z0-9_-]*)")
            .expect("delimiter head pattern is valid")
    })
}

/// Half-open byte range `[start, end)` within a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockSpan {
    pub start: usize,
    pub end: usize,
}

impl BlockSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Borrow the covered bytes of `source`.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// One parsed block instance.
///
/// Ephemeral: recomputed on every parse, never stored on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInstance {
    /// Qualified type tag, e.g. `core/paragraph`
    pub name: String,
    /// Type tag exactly as written in the delimiter
    pub raw_name: String,
    /// Attribute object, in source order
    pub attrs: Map<String, Value>,
    /// Where the attribute JSON sits in the source, if written
    pub attrs_span: Option<BlockSpan>,
    /// Well-formed stable id, if any
    pub stable_id: Option<StableId>,
    /// Whole block: opener through matching closer
    pub span: BlockSpan,
    /// Opening (or void) delimiter only
    pub opener: BlockSpan,
    /// Byte offset right after the raw name inside the opener
    pub name_end: usize,
    /// Nesting depth, 0 for top level
    pub depth: usize,
    /// Pre-order index among all blocks of the document
    pub position: usize,
    pub is_void: bool,
}

impl BlockInstance {
    pub fn has_stable_id(&self) -> bool {
        self.stable_id.is_some()
    }

    /// True if a `stableId` key exists, well formed or not.
    pub fn has_stable_id_key(&self) -> bool {
        self.attrs.contains_key(STABLE_ID_ATTR)
    }
}

/// One entry of the structural representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Bytes copied verbatim: text, HTML, ordinary comments, closers
    Literal { span: BlockSpan },
    /// Opening or void delimiter of `blocks[index]`
    Block { index: usize },
}

/// Structural representation of a document's content.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    pub segments: Vec<Segment>,
    pub blocks: Vec<BlockInstance>,
    pub source_len: usize,
}

impl ParsedContent {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks_with_stable_id(&self) -> usize {
        self.blocks.iter().filter(|b| b.has_stable_id()).count()
    }

    pub fn blocks_without_stable_id(&self) -> usize {
        self.block_count() - self.blocks_with_stable_id()
    }

    /// Blocks still lacking a well-formed stable id, in document order.
    pub fn id_less_blocks(&self) -> impl Iterator<Item = &BlockInstance> {
        self.blocks.iter().filter(|b| !b.has_stable_id())
    }

    pub fn find_by_span(&self, span: BlockSpan) -> Option<&BlockInstance> {
        self.blocks.iter().find(|b| b.span == span)
    }

    /// Source span covered by a segment.
    pub fn segment_span(&self, segment: &Segment) -> BlockSpan {
        match segment {
            Segment::Literal { span } => *span,
            Segment::Block { index } => self.blocks[*index].opener,
        }
    }
}

/// Delimiter as read from the source.
#[derive(Debug)]
enum Delimiter {
    Open {
        raw_name: String,
        name_end: usize,
        attrs: Option<(BlockSpan, Map<String, Value>)>,
        span: BlockSpan,
        is_void: bool,
    },
    Close {
        raw_name: String,
        span: BlockSpan,
    },
}

/// Qualify a bare block name with the implicit `core/` namespace.
pub fn qualify_name(raw_name: &str) -> String {
    if raw_name.contains('/') {
        raw_name.to_string()
    } else {
        format!("core/{}", raw_name)
    }
}

fn skip_whitespace(bytes: &[u8], mut at: usize) -> usize {
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

/// If `at` starts `WS* "/"? "-->"`, return (end offset, is_void).
fn comment_tail(content: &str, at: usize) -> Option<(usize, bool)> {
    let rest = &content[at..];
    if rest.starts_with(COMMENT_CLOSE) {
        return Some((at + COMMENT_CLOSE.len(), false));
    }
    if rest.starts_with('/') && rest[1..].starts_with(COMMENT_CLOSE) {
        return Some((at + 1 + COMMENT_CLOSE.len(), true));
    }
    None
}

/// Find the end of an attribute object starting at `open` (a `{`).
///
/// The object ends at the first `}` followed by whitespace and `/?-->`.
fn find_attrs_end(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut at = open + 1;
    while at < bytes.len() {
        if bytes[at] == b'}' {
            let after = skip_whitespace(bytes, at + 1);
            if after > at + 1 && comment_tail(content, after).is_some() {
                return Some(at + 1);
            }
        }
        at += 1;
    }
    None
}

/// Try to read a block delimiter at `at` (which starts with `<!--`).
///
/// Returns Ok(None) for comments that are not block delimiters.
fn read_delimiter(content: &str, at: usize) -> ParseResult<Option<Delimiter>> {
    let rest = &content[at..];
    if !block_prefix().is_match(rest) {
        return Ok(None);
    }

    let caps = delimiter_head()
        .captures(rest)
        .ok_or_else(|| ParseError::malformed(at))?;
    let is_closer = caps.get(1).is_some();
    let name_match = caps.get(2).ok_or_else(|| ParseError::malformed(at))?;
    let raw_name = name_match.as_str().to_string();
    let name_end = at + name_match.end();

    let bytes = content.as_bytes();
    let mut cursor = skip_whitespace(bytes, name_end);
    if cursor == name_end {
        // A name must be followed by whitespace.
        return Err(ParseError::malformed(at));
    }

    if is_closer {
        return match comment_tail(content, cursor) {
            Some((end, false)) => Ok(Some(Delimiter::Close {
                raw_name,
                span: BlockSpan::new(at, end),
            })),
            _ => Err(ParseError::malformed(at)),
        };
    }

    let mut attrs = None;
    if bytes.get(cursor) == Some(&b'{') {
        let attrs_end = find_attrs_end(content, cursor)
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnterminatedAttributes, at))?;
        let attrs_span = BlockSpan::new(cursor, attrs_end);
        let parsed: Value = serde_json::from_str(attrs_span.slice(content)).map_err(|e| {
            ParseError::new(ParseErrorKind::InvalidAttributes(e.to_string()), at)
        })?;
        let map = match parsed {
            Value::Object(map) => map,
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidAttributes(format!("found {}", other)),
                    at,
                ))
            }
        };
        attrs = Some((attrs_span, map));
        cursor = skip_whitespace(bytes, attrs_end);
    }

    let (end, is_void) = comment_tail(content, cursor).ok_or_else(|| ParseError::malformed(at))?;

    Ok(Some(Delimiter::Open {
        raw_name,
        name_end,
        attrs,
        span: BlockSpan::new(at, end),
        is_void,
    }))
}

/// Parse block markup into its structural representation.
///
/// Fails on malformed delimiters, attributes that are not a JSON object,
/// unbalanced or mismatched closers, and blocks left open.
pub fn parse(content: &str) -> ParseResult<ParsedContent> {
    let mut segments = Vec::new();
    let mut blocks: Vec<BlockInstance> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(rel) = content[pos..].find(COMMENT_OPEN) {
        let at = pos + rel;
        let delimiter = match read_delimiter(content, at)? {
            Some(d) => d,
            None => {
                pos = at + COMMENT_OPEN.len();
                continue;
            }
        };

        match delimiter {
            Delimiter::Open {
                raw_name,
                name_end,
                attrs,
                span,
                is_void,
            } => {
                if literal_start < at {
                    segments.push(Segment::Literal {
                        span: BlockSpan::new(literal_start, at),
                    });
                }

                let (attrs_span, attrs) = match attrs {
                    Some((s, m)) => (Some(s), m),
                    None => (None, Map::new()),
                };
                let index = blocks.len();
                blocks.push(BlockInstance {
                    name: qualify_name(&raw_name),
                    raw_name,
                    stable_id: stable_id_of(&attrs),
                    attrs,
                    attrs_span,
                    span,
                    opener: span,
                    name_end,
                    depth: open.len(),
                    position: index,
                    is_void,
                });
                segments.push(Segment::Block { index });
                if !is_void {
                    open.push(index);
                }
                literal_start = span.end;
                pos = span.end;
            }
            Delimiter::Close { raw_name, span } => {
                let name = qualify_name(&raw_name);
                let index = open.pop().ok_or_else(|| {
                    ParseError::new(ParseErrorKind::UnexpectedCloser(name.clone()), at)
                })?;
                if blocks[index].name != name {
                    return Err(ParseError::new(
                        ParseErrorKind::MismatchedCloser {
                            expected: blocks[index].name.clone(),
                            found: name,
                        },
                        at,
                    ));
                }
                blocks[index].span.end = span.end;
                // Closers stay inside the surrounding literal run.
                pos = span.end;
            }
        }
    }

    if let Some(&index) = open.last() {
        return Err(ParseError::new(
            ParseErrorKind::UnclosedBlock(blocks[index].name.clone()),
            blocks[index].opener.start,
        ));
    }

    if literal_start < content.len() {
        segments.push(Segment::Literal {
            span: BlockSpan::new(literal_start, content.len()),
        });
    }

    Ok(ParsedContent {
        segments,
        blocks,
        source_len: content.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(content: &str, parsed: &ParsedContent) -> String {
        parsed
            .segments
            .iter()
            .map(|s| parsed.segment_span(s).slice(content))
            .collect()
    }

    #[test]
    fn test_plain_content_has_no_blocks() {
        let content = "<p>hello</p><!-- just a comment -->";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.block_count(), 0);
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(rebuild(content, &parsed), content);
    }

    #[test]
    fn test_empty_content() {
        let parsed = parse("").unwrap();
        assert_eq!(parsed.block_count(), 0);
        assert!(parsed.segments.is_empty());
    }

    #[test]
    fn test_paragraph_block() {
        let content = "<!-- wp:paragraph -->\n<p>Hi</p>\n<!-- /wp:paragraph -->";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.block_count(), 1);
        let block = &parsed.blocks[0];
        assert_eq!(block.name, "core/paragraph");
        assert_eq!(block.raw_name, "paragraph");
        assert!(block.attrs.is_empty());
        assert!(block.attrs_span.is_none());
        assert_eq!(block.span, BlockSpan::new(0, content.len()));
        assert_eq!(block.opener.slice(content), "<!-- wp:paragraph -->");
        assert_eq!(&content[..block.name_end], "<!-- wp:paragraph");
        assert!(!block.is_void);
        assert_eq!(rebuild(content, &parsed), content);
    }

    #[test]
    fn test_attributes_and_stable_id() {
        let content = r#"<!-- wp:acme/task {"points":3,"stableId":"abc123"} --><div></div><!-- /wp:acme/task -->"#;
        let parsed = parse(content).unwrap();
        let block = &parsed.blocks[0];
        assert_eq!(block.name, "acme/task");
        assert_eq!(block.attrs["points"], 3);
        assert_eq!(block.stable_id.as_ref().map(|s| s.as_str()), Some("abc123"));
        assert_eq!(
            block.attrs_span.unwrap().slice(content),
            r#"{"points":3,"stableId":"abc123"}"#
        );
    }

    #[test]
    fn test_void_block() {
        let content = r#"before<!-- wp:acme/divider {"w":1} /-->after"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.block_count(), 1);
        assert!(parsed.blocks[0].is_void);
        assert_eq!(parsed.blocks[0].span, parsed.blocks[0].opener);
        assert_eq!(parsed.segments.len(), 3);
        assert_eq!(rebuild(content, &parsed), content);
    }

    #[test]
    fn test_nested_blocks_preorder() {
        let content = concat!(
            "<!-- wp:group -->",
            "<!-- wp:paragraph --><p>a</p><!-- /wp:paragraph -->",
            "<!-- wp:acme/task {\"n\":1} /-->",
            "<!-- /wp:group -->",
            "<!-- wp:paragraph --><p>b</p><!-- /wp:paragraph -->"
        );
        let parsed = parse(content).unwrap();
        let names: Vec<_> = parsed.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["core/group", "core/paragraph", "acme/task", "core/paragraph"]
        );
        let depths: Vec<_> = parsed.blocks.iter().map(|b| b.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0]);
        let positions: Vec<_> = parsed.blocks.iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert!(parsed.blocks[0].span.end > parsed.blocks[2].span.end);
        assert_eq!(rebuild(content, &parsed), content);
    }

    #[test]
    fn test_attrs_with_braces_inside_strings() {
        let content = r#"<!-- wp:acme/code {"src":"fn x() {}"} /-->"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.blocks[0].attrs["src"], "fn x() {}");
    }

    #[test]
    fn test_malformed_attributes_fail() {
        let content = r#"<!-- wp:acme/task {"points":} --><!-- /wp:acme/task -->"#;
        let err = parse(content).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidAttributes(_)));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_non_object_attributes_fail() {
        let content = r#"<!-- wp:acme/task {"a":1}x} /-->"#;
        assert!(parse(content).is_err());
    }

    #[test]
    fn test_missing_whitespace_is_malformed() {
        let err = parse("<!-- wp:paragraph--><!-- /wp:paragraph -->").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedDelimiter);
    }

    #[test]
    fn test_uppercase_name_is_malformed() {
        let err = parse("<!-- wp:Paragraph -->x<!-- /wp:Paragraph -->").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedDelimiter);
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("x<!-- wp:group --><p></p>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnclosedBlock("core/group".into()));
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn test_unexpected_closer() {
        let err = parse("<p></p><!-- /wp:group -->").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedCloser(_)));
    }

    #[test]
    fn test_mismatched_closer() {
        let err = parse("<!-- wp:group --><!-- /wp:columns -->").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MismatchedCloser { .. }));
    }

    #[test]
    fn test_closer_qualifies_bare_name() {
        let content = "<!-- wp:core/paragraph -->x<!-- /wp:paragraph -->";
        assert_eq!(parse(content).unwrap().block_count(), 1);
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        let content = "héllo ✓ <!-- wp:paragraph --><p>ünï</p><!-- /wp:paragraph --> fin";
        let parsed = parse(content).unwrap();
        assert_eq!(rebuild(content, &parsed), content);
    }

    #[test]
    fn test_counts() {
        let content = r#"<!-- wp:a {"stableId":"abc123"} /--><!-- wp:b /--><!-- wp:c {"stableId":""} /-->"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.block_count(), 3);
        assert_eq!(parsed.blocks_with_stable_id(), 1);
        assert_eq!(parsed.blocks_without_stable_id(), 2);
        assert!(parsed.blocks[2].has_stable_id_key());
        assert!(!parsed.blocks[2].has_stable_id());
    }
}
