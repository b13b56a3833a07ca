//! `{{name:default:description}}` placeholder parsing.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;
use serde::{Deserialize, Serialize};

use promptvar_core::{ParseError, SourcePosition, TemplateParseResult, TemplateVariable};

/// `{{ name (":" default)? (":" description)? }}`; name and default exclude
/// `{`, `}` and `:`, the description excludes only braces.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}:]*)(?::([^{}:]*))?(?::([^{}]*))?\}\}")
        .expect("placeholder pattern is a valid regex")
});

/// Parser behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Report `{{` sequences that never form a placeholder.
    ///
    /// Off by default: unterminated openers pass through as literal text.
    #[serde(default)]
    pub strict: bool,
}

impl ParserOptions {
    /// Lenient parsing (the default).
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Strict parsing.
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// A single placeholder occurrence in template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'t> {
    /// Trimmed name; empty names are reported as parse errors.
    pub name: &'t str,
    /// Trimmed default, `None` when absent or empty.
    pub default_value: Option<&'t str>,
    /// Trimmed description, `None` when absent or empty.
    pub description: Option<&'t str>,
    /// Byte range of the whole `{{...}}` match.
    pub span: Range<usize>,
    /// Character range of the whole match.
    pub position: SourcePosition,
}

impl Placeholder<'_> {
    /// Check if the placeholder names a variable.
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Find every placeholder in `text`, left to right.
pub fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut chars = CharCounter::default();

    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let start = chars.offset_of(text, whole.start());
        let end = chars.offset_of(text, whole.end());

        found.push(Placeholder {
            name: caps.get(1).map_or("", |m| m.as_str().trim()),
            default_value: non_empty(caps.get(2).map(|m| m.as_str())),
            description: non_empty(caps.get(3).map(|m| m.as_str())),
            span: whole.range(),
            position: SourcePosition::new(start, end),
        });
    }

    found
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Incremental byte-offset to char-offset conversion for increasing offsets.
#[derive(Debug, Default)]
struct CharCounter {
    byte: usize,
    chars: usize,
}

impl CharCounter {
    fn offset_of(&mut self, text: &str, byte: usize) -> usize {
        if byte < self.byte {
            return text[..byte].chars().count();
        }
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// Template placeholder parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateParser {
    options: ParserOptions,
}

impl TemplateParser {
    /// Create a lenient parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with explicit options.
    pub fn with_options(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Options this parser was built with.
    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Parse template text into variable descriptors.
    ///
    /// The first occurrence of a name determines its default, description and
    /// required flag; later occurrences are ignored without error.
    pub fn parse(&self, text: &str) -> TemplateParseResult {
        let found = placeholders(text);
        let mut seen = HashSet::new();
        let mut result = TemplateParseResult::default();

        for placeholder in &found {
            if !placeholder.has_name() {
                result.errors.push(ParseError::new(
                    "Empty variable name",
                    placeholder.position.start,
                ));
                continue;
            }
            if !seen.insert(placeholder.name) {
                continue;
            }

            result.variables.push(TemplateVariable {
                name: CompactString::from(placeholder.name),
                default_value: placeholder.default_value.map(str::to_string),
                description: placeholder.description.map(str::to_string),
                is_required: placeholder.default_value.is_none(),
                source_position: placeholder.position,
            });
        }

        if self.options.strict {
            result.errors.extend(stray_openers(text, &found));
            result.errors.sort_by_key(|e| e.position);
        }

        if !result.errors.is_empty() {
            tracing::debug!(errors = result.errors.len(), "template parsed with errors");
        }

        result
    }
}

/// `{{` openers outside every matched placeholder.
fn stray_openers(text: &str, found: &[Placeholder<'_>]) -> Vec<ParseError> {
    let mut chars = CharCounter::default();

    text.match_indices("{{")
        .filter(|(idx, _)| !found.iter().any(|p| p.span.contains(idx)))
        .map(|(idx, _)| {
            let message = if text[idx + 2..].contains("}}") {
                "Malformed placeholder"
            } else {
                "Unterminated placeholder"
            };
            ParseError::new(message, chars.offset_of(text, idx))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_syntax() {
        let result = TemplateParser::new().parse("{{ topic : Rust : What to write about }}");
        assert_eq!(result.variables.len(), 1);

        let var = &result.variables[0];
        assert_eq!(var.name, "topic");
        assert_eq!(var.default_value.as_deref(), Some("Rust"));
        assert_eq!(var.description.as_deref(), Some("What to write about"));
        assert!(!var.is_required);
    }

    #[test]
    fn test_description_may_contain_colons() {
        let result = TemplateParser::new().parse("{{a:b:c:d}}");
        assert_eq!(result.variables[0].description.as_deref(), Some("c:d"));
    }

    #[test]
    fn test_empty_default_is_no_default() {
        let result = TemplateParser::new().parse("{{x:}}");
        assert!(result.variables[0].is_required);
        assert!(result.variables[0].default_value.is_none());
    }

    #[test]
    fn test_positions_are_char_offsets() {
        let result = TemplateParser::new().parse("héllo {{x}}");
        assert_eq!(result.variables[0].source_position, SourcePosition::new(6, 11));
    }

    #[test]
    fn test_empty_name_reports_error() {
        let result = TemplateParser::new().parse("a {{ }} b {{:d}}");
        assert!(result.variables.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].position, 2);
        assert_eq!(result.errors[1].position, 10);
    }

    #[test]
    fn test_unterminated_is_lenient_by_default() {
        let result = TemplateParser::new().parse("Hello {{name");
        assert!(result.variables.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_strict_reports_stray_openers() {
        let parser = TemplateParser::with_options(ParserOptions::strict());
        let result = parser.parse("{{ok}} {{bad{x}} {{open");
        assert_eq!(result.variables.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].message, "Malformed placeholder");
        assert_eq!(result.errors[0].position, 7);
        assert_eq!(result.errors[1].message, "Unterminated placeholder");
    }

    #[test]
    fn test_placeholder_spans() {
        let text = "a{{x}}b{{y:1}}";
        let found = placeholders(text);
        assert_eq!(found.len(), 2);
        assert_eq!(&text[found[0].span.clone()], "{{x}}");
        assert_eq!(&text[found[1].span.clone()], "{{y:1}}");
        assert_eq!(found[1].default_value, Some("1"));
    }
}
