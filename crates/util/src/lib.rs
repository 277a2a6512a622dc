//! Utility helpers shared by the Stepwise engine and CLI.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod async_runtime;

pub use async_runtime::block_on_future;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
        r"(?i)(DATABASE_URL=)([^\s]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

/// Renders an environment map as `KEY=value` pairs with secrets redacted, for debug logs.
pub fn redact_environment<'a>(environment: impl IntoIterator<Item = (&'a String, &'a String)>) -> Vec<String> {
    let mut lines: Vec<String> = environment
        .into_iter()
        .map(|(key, value)| redact_sensitive(&format!("{key}={value}")))
        .collect();
    lines.sort();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn redacts_secret_assignments() {
        assert_eq!(redact_sensitive("API_KEY=abc123 other"), "API_KEY=<redacted> other");
        assert_eq!(redact_sensitive("Authorization: Bearer"), "Authorization: <redacted>");
        assert_eq!(redact_sensitive("PATH=/usr/bin"), "PATH=/usr/bin");
    }

    #[test]
    fn redact_environment_sorts_and_masks() {
        let mut environment = HashMap::new();
        environment.insert("GITHUB_TOKEN".to_string(), "ghp_secret".to_string());
        environment.insert("HOME".to_string(), "/home/dev".to_string());

        let lines = redact_environment(&environment);
        assert_eq!(lines, vec!["GITHUB_TOKEN=<redacted>", "HOME=/home/dev"]);
    }
}
