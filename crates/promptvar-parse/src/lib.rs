//! Placeholder parser for promptvar templates.
//!
//! Templates reference variables with `{{name}}`, `{{name:default}}` or
//! `{{name:default:description}}`. Parsing is pure and synchronous; results
//! can be memoized by exact template text with [`CachedParser`].
//!
//! # Example
//!
//! ```rust
//! use promptvar_parse::TemplateParser;
//!
//! let result = TemplateParser::new().parse("Hello {{name:World}}");
//! assert_eq!(result.variables[0].name, "name");
//! assert!(!result.variables[0].is_required);
//! ```

mod memo;
mod parser;

pub use memo::{CachedParser, DEFAULT_MEMO_CAPACITY};
pub use parser::{placeholders, ParserOptions, Placeholder, TemplateParser};

// Re-export core types for convenience
pub use promptvar_core::{ParseError, SourcePosition, TemplateParseResult, TemplateVariable};
