//! Single-pass placeholder substitution.

use std::collections::HashMap;

use indexmap::IndexSet;

use promptvar_core::TemplateParseResult;
use promptvar_parse::placeholders;

/// Replace every placeholder in `template` with its value.
///
/// Per placeholder the first non-empty source wins: `values`, then
/// `globals`, then the default written on the name's first occurrence, then
/// the empty string. Replacement text is never re-scanned, and placeholders
/// with an empty name are left as written.
pub fn substitute(
    template: &str,
    values: &HashMap<String, String>,
    globals: &HashMap<String, String>,
) -> String {
    fn non_empty<'m>(map: &'m HashMap<String, String>, name: &str) -> Option<&'m str> {
        map.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    let found: Vec<_> = placeholders(template)
        .into_iter()
        .filter(|placeholder| placeholder.has_name())
        .collect();
    let mut defaults: HashMap<&str, Option<&str>> = HashMap::new();
    for placeholder in &found {
        defaults
            .entry(placeholder.name)
            .or_insert(placeholder.default_value);
    }

    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;

    for placeholder in &found {
        out.push_str(&template[cursor..placeholder.span.start]);

        let value = non_empty(values, placeholder.name)
            .or_else(|| non_empty(globals, placeholder.name))
            .or_else(|| defaults.get(placeholder.name).copied().flatten())
            .unwrap_or_default();
        out.push_str(value);

        cursor = placeholder.span.end;
    }

    out.push_str(&template[cursor..]);
    out
}

/// Names referenced by a parse result, in order of first appearance.
pub fn used_variables(parsed: &TemplateParseResult) -> IndexSet<String> {
    parsed.names().map(str::to_string).collect()
}
