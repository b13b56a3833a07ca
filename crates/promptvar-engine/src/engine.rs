//! The variable resolution engine.
//!
//! Holds one loaded template with per-variable editing state, and resolves
//! it against local values, a global store and the file resolver.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use promptvar_core::{TemplateParseResult, TemplateRecord, VariableEntry, VariableValue};
use promptvar_fs::{EntryDiagnosis, FileResolver, ResolveOptions};
use promptvar_parse::CachedParser;

use crate::error::{EngineError, EngineResult};
use crate::sink::{ClipboardSink, NotificationSink, ResolutionOutcome};
use crate::state::{TemplateVariableState, ValidationRules};
use crate::store::GlobalVariableStore;
use crate::substitute::{substitute, used_variables};

/// Resolved text plus diagnostics for entries that could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// Template text with every placeholder replaced.
    pub text: String,
    /// Problems with file and directory entries; empty on full success.
    pub diagnostics: Vec<EntryDiagnosis>,
}

impl Resolution {
    /// Check if every referenced entry resolved.
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Result of a resolve-and-copy request.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    /// The text written to the clipboard.
    pub text: String,
    /// Success or partial success.
    pub outcome: ResolutionOutcome,
}

/// Resolves one template's variables.
#[derive(Debug)]
pub struct VariableEngine {
    parser: CachedParser,
    resolver: Arc<FileResolver>,
    rules: HashMap<String, ValidationRules>,
    template: String,
    parsed: Arc<TemplateParseResult>,
    initial: HashMap<String, String>,
    attachments: HashMap<String, VariableValue>,
    states: IndexMap<String, TemplateVariableState>,
}

impl VariableEngine {
    /// Create an engine with an empty template.
    pub fn new(resolver: Arc<FileResolver>) -> Self {
        Self::with_parser(resolver, CachedParser::new())
    }

    /// Create an engine with a specific parser.
    pub fn with_parser(resolver: Arc<FileResolver>, parser: CachedParser) -> Self {
        Self {
            parser,
            resolver,
            rules: HashMap::new(),
            template: String::new(),
            parsed: Arc::default(),
            initial: HashMap::new(),
            attachments: HashMap::new(),
            states: IndexMap::new(),
        }
    }

    /// Parse template text (memoized).
    pub fn parse(&self, template: &str) -> Arc<TemplateParseResult> {
        self.parser.parse(template)
    }

    /// The file resolver.
    pub fn resolver(&self) -> &Arc<FileResolver> {
        &self.resolver
    }

    /// Load a template, seeding variables from `initial` where given.
    pub fn load_template(&mut self, template: impl Into<String>, initial: HashMap<String, String>) {
        self.template = template.into();
        self.parsed = self.parser.parse(&self.template);
        self.initial = initial;
        self.reset();
        tracing::debug!(
            variables = self.parsed.variables.len(),
            errors = self.parsed.errors.len(),
            "loaded template"
        );
    }

    /// Load the content and saved variables of a stored template.
    pub fn load_record(&mut self, record: &TemplateRecord) {
        let initial = record
            .variables
            .as_ref()
            .map(|vars| vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        self.load_template(record.content.clone(), initial);
    }

    /// The loaded template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parse result of the loaded template.
    pub fn parse_result(&self) -> &TemplateParseResult {
        &self.parsed
    }

    /// Set validation rules for a variable and revalidate it if edited.
    pub fn set_rules(&mut self, name: impl Into<String>, rules: ValidationRules) {
        let name = name.into();
        self.rules.insert(name.clone(), rules);
        let edited = self.states.get(&name).is_some_and(|s| s.is_dirty);
        if edited && !self.attachments.contains_key(&name) {
            let value = self.states[&name].value.clone();
            self.validate_into(&name, value);
        }
    }

    /// Edit a variable: marks it dirty and revalidates.
    ///
    /// Typed text replaces any entries attached to the variable.
    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> EngineResult<&TemplateVariableState> {
        if !self.states.contains_key(name) {
            return Err(EngineError::UnknownVariable {
                name: name.to_string(),
            });
        }
        self.attachments.remove(name);
        Ok(self.validate_into(name, value.into()))
    }

    /// Bind a variable to file, directory or text entries.
    ///
    /// Attached entries act as the variable's local value and are resolved
    /// with the rest of the template.
    pub fn attach(&mut self, name: &str, value: VariableValue) -> EngineResult<()> {
        if !self.states.contains_key(name) {
            return Err(EngineError::UnknownVariable {
                name: name.to_string(),
            });
        }
        if let Some(state) = self.states.get_mut(name) {
            state.value.clear();
            state.is_dirty = true;
            state.is_valid = true;
            state.errors.clear();
        }
        self.attachments.insert(name.to_string(), value);
        Ok(())
    }

    fn validate_into(&mut self, name: &str, value: String) -> &TemplateVariableState {
        let errors = match self.parsed.variable(name) {
            Some(variable) => self
                .rules
                .get(name)
                .cloned()
                .unwrap_or_default()
                .validate(variable, &value),
            None => Vec::new(),
        };
        let state = self
            .states
            .entry(name.to_string())
            .or_insert_with(|| TemplateVariableState {
                value: String::new(),
                is_dirty: false,
                is_valid: true,
                errors: Vec::new(),
            });
        state.value = value;
        state.is_dirty = true;
        state.is_valid = errors.is_empty();
        state.errors = errors;
        state
    }

    /// Restore every variable to its clean default or initial value and drop
    /// attached entries.
    pub fn reset(&mut self) {
        self.attachments.clear();
        self.states = self
            .parsed
            .variables
            .iter()
            .map(|variable| {
                let initial = self.initial.get(variable.name.as_str()).map(String::as_str);
                (
                    variable.name.to_string(),
                    TemplateVariableState::clean(variable, initial),
                )
            })
            .collect();
    }

    /// State of one variable.
    pub fn state(&self, name: &str) -> Option<&TemplateVariableState> {
        self.states.get(name)
    }

    /// States of all variables in template order.
    pub fn states(&self) -> &IndexMap<String, TemplateVariableState> {
        &self.states
    }

    /// Check if every variable currently validates.
    pub fn is_valid(&self) -> bool {
        self.states.values().all(|s| s.is_valid)
    }

    /// Variable names referenced by the loaded template.
    pub fn used_variables(&self) -> IndexSet<String> {
        used_variables(&self.parsed)
    }

    /// Explicit local values: edited values and values supplied at load.
    ///
    /// Untouched variables fall through to globals and defaults. Variables
    /// with attached entries are left out; their text comes from resolution.
    pub fn local_values(&self) -> HashMap<String, String> {
        self.states
            .iter()
            .filter(|(name, _)| !self.attachments.contains_key(name.as_str()))
            .filter_map(|(name, state)| {
                let explicit = state.is_dirty || self.initial.contains_key(name);
                explicit.then(|| (name.clone(), state.value.clone()))
            })
            .collect()
    }

    /// Substitute placeholders in `template` (see [`substitute`]).
    pub fn substitute(
        &self,
        template: &str,
        values: &HashMap<String, String>,
        globals: &HashMap<String, String>,
    ) -> String {
        substitute(template, values, globals)
    }

    /// Resolve the loaded template against `globals`.
    ///
    /// Only variables the template references are looked up; file and
    /// directory entries of every other global stay untouched. Entry
    /// failures are reported in [`Resolution::diagnostics`].
    pub async fn resolve(
        &self,
        globals: &dyn GlobalVariableStore,
        options: &ResolveOptions,
    ) -> Resolution {
        let mut locals = self.local_values();
        let mut pending: Vec<(String, bool, VariableValue)> = Vec::new();

        for name in self.used_variables() {
            if locals.get(&name).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            if let Some(value) = self.attachments.get(&name) {
                pending.push((name, true, value.clone()));
            } else if let Some(global) = globals.get(&name) {
                pending.push((name, false, global.value));
            }
        }

        let mut entries: Vec<VariableEntry> = Vec::new();
        let mut spans = Vec::with_capacity(pending.len());
        for (_, _, value) in &mut pending {
            let start = entries.len();
            entries.append(&mut value.0);
            spans.push(start..entries.len());
        }

        let mut diagnostics = Vec::new();
        let has_handles = entries.iter().any(|e| e.handle_kind().is_some());
        if has_handles && !self.resolver.resolve_all(&mut entries, options).await {
            diagnostics = self
                .resolver
                .diagnose(&entries)
                .await
                .into_iter()
                .filter(|d| !d.is_healthy())
                .collect();
        }

        let mut global_text = HashMap::new();
        for ((name, local, _), span) in pending.into_iter().zip(spans) {
            let text = VariableValue::new(entries[span].to_vec()).materialize();
            if local {
                locals.insert(name, text);
            } else {
                global_text.insert(name, text);
            }
        }

        Resolution {
            text: substitute(&self.template, &locals, &global_text),
            diagnostics,
        }
    }

    /// Resolve the loaded template, copy it and report the outcome.
    ///
    /// A clipboard failure is reported as a failure outcome and returned as
    /// an error; missing entries still copy and report a partial outcome.
    pub async fn copy_to_clipboard(
        &self,
        globals: &dyn GlobalVariableStore,
        clipboard: &dyn ClipboardSink,
        notifier: &dyn NotificationSink,
        options: &ResolveOptions,
    ) -> EngineResult<CopyReport> {
        let resolution = self.resolve(globals, options).await;

        if let Err(err) = clipboard.write_text(resolution.text.clone()).await {
            notifier.notify(&ResolutionOutcome::Failure {
                message: err.to_string(),
            });
            return Err(err);
        }

        let outcome = if resolution.is_complete() {
            ResolutionOutcome::Success
        } else {
            ResolutionOutcome::Partial {
                diagnostics: resolution.diagnostics,
            }
        };
        notifier.notify(&outcome);
        Ok(CopyReport {
            text: resolution.text,
            outcome,
        })
    }

    /// Store explicit local text values into `record`.
    pub fn snapshot_into(&self, record: &mut TemplateRecord) {
        let locals = self.local_values();
        let variables: IndexMap<String, String> = self
            .states
            .keys()
            .filter_map(|name| locals.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        record.content = self.template.clone();
        record.variables = (!variables.is_empty()).then_some(variables);
    }
}
