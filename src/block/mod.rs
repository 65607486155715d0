//! Block markup subsystem
//!
//! Documents embed blocks as HTML comment delimiters:
//!
//! ```text
//! <!-- wp:acme/task {"points":3} --><div>...</div><!-- /wp:acme/task -->
//! <!-- wp:acme/divider /-->
//! ```
//!
//! Parsing produces a structural segment list (literal runs and opening
//! delimiters). Concatenating the segments reproduces the source byte for
//! byte, which is what lets the rewriter touch one delimiter without
//! disturbing anything else.

mod attrs;
mod errors;
mod parser;

pub use attrs::{
    encode_attributes, is_well_formed_stable_id, stable_id_of, StableId, STABLE_ID_ATTR,
};
pub(crate) use attrs::encode_stable_id;
pub use errors::{ParseError, ParseErrorKind, ParseResult};
pub use parser::{parse, qualify_name, BlockInstance, BlockSpan, ParsedContent, Segment};
