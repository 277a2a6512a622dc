//! # Template Resolution
//!
//! This module resolves placeholder references inside workflow templates (commands,
//! prompts, stdin, env values, working directories) against a layered [`RunContext`].
//!
//! ## Template Syntax
//!
//! - `${name}` / `${name.path.to.field}` - braced reference, resolved against every scope layer
//! - `${items[0].id}` / `${items.0.id}` - array indices in bracket or dot form
//! - `$name.path` - bare reference, only recognised when `name` is a completed step, an arg,
//!   or the `steps` / `args` namespace
//!
//! A braced reference whose path cannot be fully resolved renders as the empty string.
//! Bare references rooted anywhere else (including environment variable names) are
//! left untouched so shell syntax such as `$HOME.bak` or `$1.txt` reaches the shell
//! intact. Path segments after the root stop at any character outside `[A-Za-z0-9_]`,
//! so `$build.stdout-copy` renders the step output followed by `-copy`.
//!
//! ## Scope Layers
//!
//! Lookups of the first path segment consult, from highest to lowest precedence:
//!
//! 1. completed step outputs (`steps`)
//! 2. declared env values after template resolution (`environment_variables`)
//! 3. args (`args`)
//! 4. the parent environment snapshot (`parent_environment`)
//!
//! When the first segment is not found, the namespaces `steps.<id>`, `env.<NAME>`
//! (effective composed environment) and `args.<name>` are tried.
//!
//! ## Usage
//!
//! ```rust
//! use stepwise_engine::resolve::{RunContext, interpolate};
//! use serde_json::json;
//!
//! let mut context = RunContext::default();
//! context.args.insert("topic".into(), json!("rust"));
//! context.steps.insert("fetch".into(), json!({"stdout": "notes", "json": {"count": 3}}));
//!
//! assert_eq!(interpolate("about ${topic}: $fetch.json.count", &context), "about rust: 3");
//! assert_eq!(interpolate("${missing.field}|$HOME", &context), "|$HOME");
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

/// Execution scope for resolving workflow templates.
///
/// The context is rebuilt from scratch on every invocation: args and the parent
/// environment come from the caller, declared env values are composed by
/// [`crate::environment`], and step outputs are replayed from the accumulated results.
#[derive(Debug, Default, Clone)]
pub struct RunContext {
    /// Immutable snapshot of the caller's environment.
    pub parent_environment: HashMap<String, String>,

    /// Arg values: declared defaults overlaid with caller overrides.
    pub args: serde_json::Map<String, Value>,

    /// Declared env values after template resolution.
    ///
    /// Holds the workflow-level env, plus the current step's env while that step is
    /// being prepared. Authoring order is preserved.
    pub environment_variables: IndexMap<String, String>,

    /// Output values of completed steps, keyed by step id.
    ///
    /// Only steps that completed before the one being rendered appear here.
    pub steps: HashMap<String, Value>,
}

impl RunContext {
    /// The environment a spawned process receives: parent snapshot overlaid with declared env.
    pub fn effective_environment(&self) -> HashMap<String, String> {
        let mut environment = self.parent_environment.clone();
        for (name, value) in &self.environment_variables {
            environment.insert(name.clone(), value.clone());
        }
        environment
    }

    /// Resolves a reference expression (without delimiters) to a JSON value.
    ///
    /// Returns `None` when any segment of the path is missing.
    pub fn resolve_reference(&self, expression: &str) -> Option<Value> {
        let segments = path_segments(expression);
        let (root, rest) = segments.split_first()?;
        if let Some(value) = self.lookup_root(root) {
            return navigate(value, rest);
        }
        let (namespace_key, rest) = rest.split_first()?;
        let value = match root.as_str() {
            "steps" => self.steps.get(namespace_key).cloned(),
            "env" => self
                .environment_variables
                .get(namespace_key)
                .or_else(|| self.parent_environment.get(namespace_key))
                .map(|value| Value::String(value.clone())),
            "args" => self.args.get(namespace_key).cloned(),
            _ => None,
        }?;
        navigate(value, rest)
    }

    /// Whether a bare `$root.path` reference binds to this scope.
    ///
    /// Only completed steps, args, and the `steps` / `args` namespaces qualify; env names
    /// are left to the shell.
    fn binds_bare_root(&self, root: &str) -> bool {
        matches!(root, "steps" | "args") || self.steps.contains_key(root) || self.args.contains_key(root)
    }

    fn lookup_root(&self, root: &str) -> Option<Value> {
        if let Some(value) = self.steps.get(root) {
            return Some(value.clone());
        }
        if let Some(value) = self.environment_variables.get(root) {
            return Some(Value::String(value.clone()));
        }
        if let Some(value) = self.args.get(root) {
            return Some(value.clone());
        }
        self.parent_environment.get(root).map(|value| Value::String(value.clone()))
    }
}

/// Interpolates every template reference in `template` using `context`.
///
/// The function processes the string left to right. Braced references always render
/// (empty when unresolved); bare references render only for completed steps and args. An
/// unterminated `${` is preserved along with the remainder of the string.
pub fn interpolate(template: &str, context: &RunContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(dollar_index) = remaining.find('$') {
        output.push_str(&remaining[..dollar_index]);
        let after_dollar = &remaining[dollar_index + 1..];

        if let Some(braced) = after_dollar.strip_prefix('{') {
            let Some(close_index) = braced.find('}') else {
                // No closing marker, preserve the rest of the string and stop processing
                output.push_str(&remaining[dollar_index..]);
                return output;
            };
            let expression = braced[..close_index].trim();
            output.push_str(&render_reference(expression, context));
            remaining = &braced[close_index + 1..];
            continue;
        }

        let bare_length = bare_reference_length(after_dollar);
        if bare_length > 0 {
            let expression = &after_dollar[..bare_length];
            let segments = path_segments(expression);
            if segments.first().is_some_and(|root| context.binds_bare_root(root)) {
                output.push_str(&render_reference(expression, context));
                remaining = &after_dollar[bare_length..];
                continue;
            }
        }

        output.push('$');
        remaining = after_dollar;
    }

    output.push_str(remaining);
    output
}

/// Lists the reference expressions a template contains, in order of appearance.
///
/// Bare references are reported syntactically, whether or not they would resolve.
pub fn extract_references(template: &str) -> Vec<String> {
    let mut references = Vec::new();
    let mut remaining = template;

    while let Some(dollar_index) = remaining.find('$') {
        let after_dollar = &remaining[dollar_index + 1..];
        if let Some(braced) = after_dollar.strip_prefix('{') {
            let Some(close_index) = braced.find('}') else {
                break;
            };
            let expression = braced[..close_index].trim();
            if !expression.is_empty() {
                references.push(expression.to_string());
            }
            remaining = &braced[close_index + 1..];
            continue;
        }
        let bare_length = bare_reference_length(after_dollar);
        if bare_length > 0 {
            references.push(after_dollar[..bare_length].to_string());
        }
        remaining = &after_dollar[bare_length..];
    }

    references
}

/// Splits a reference into segments, accepting `a.b`, `a[0]`, and `a.0` forms.
pub fn path_segments(expression: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = expression.trim().chars();

    while let Some(character) = chars.next() {
        match character {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let inner: String = chars.by_ref().take_while(|next| *next != ']').collect();
                segments.push(inner.trim().to_string());
            }
            _ => current.push(character),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn render_reference(expression: &str, context: &RunContext) -> String {
    context
        .resolve_reference(expression)
        .map(|value| format_json_value(&value))
        .unwrap_or_default()
}

/// Length of a bare `name.path` reference at the start of `text`, or 0 when there is none.
///
/// The root must start with a letter or underscore and be followed by at least one
/// `.segment` or `[index]` accessor. Step ids may contain `-`, so the root accepts it;
/// later segments do not, leaving shell suffixes such as `-copy` outside the reference.
fn bare_reference_length(text: &str) -> usize {
    let bytes = text.as_bytes();
    let is_root_character = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-';
    let is_identifier = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_';

    match bytes.first() {
        Some(first) if first.is_ascii_alphabetic() || *first == b'_' => {}
        _ => return 0,
    }
    let mut index = 1;
    while index < bytes.len() && is_root_character(bytes[index]) {
        index += 1;
    }

    let mut accessor_end = 0;
    loop {
        match bytes.get(index) {
            Some(b'.') if bytes.get(index + 1).is_some_and(|next| is_identifier(*next)) => {
                index += 1;
                while index < bytes.len() && is_identifier(bytes[index]) {
                    index += 1;
                }
                accessor_end = index;
            }
            Some(b'[') => {
                let digits = bytes[index + 1..].iter().take_while(|byte| byte.is_ascii_digit()).count();
                if digits == 0 || bytes.get(index + 1 + digits) != Some(&b']') {
                    break;
                }
                index += digits + 2;
                accessor_end = index;
            }
            _ => break,
        }
    }

    accessor_end
}

/// Walks `root_value` along `path_parts`; `None` when a segment is missing or
/// applied to a scalar.
fn navigate(root_value: Value, path_parts: &[String]) -> Option<Value> {
    let mut current_value = root_value;

    for path_part in path_parts {
        current_value = match current_value {
            Value::Object(mut object_map) => object_map.remove(path_part.as_str())?,
            Value::Array(mut array_values) => {
                let array_index = path_part.parse::<usize>().ok()?;
                if array_index >= array_values.len() {
                    return None;
                }
                array_values.swap_remove(array_index)
            }
            _ => return None,
        };
    }

    Some(current_value)
}

/// Formats a JSON value as template text.
///
/// - **Strings**: Returned as-is
/// - **Numbers / Booleans**: Display form
/// - **Null**: Empty string
/// - **Objects/Arrays**: Compact JSON
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}
