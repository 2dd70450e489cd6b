// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment reports problems as a flat error chain. Here each one becomes a
//! [`ConfigError`] that miette can render against the TOML file it came from,
//! pointing at the offending key and offering the closest valid key name.

#![allow(unused_assignments)] // emitted by the miette derive

use std::path::Path;

use figment::error::{Error as FigmentError, Kind};
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One problem with the loaded configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(palaver::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted in the same table.
        valid_keys: String,
        #[label("not a palaver setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(palaver::config::invalid_type), help("use a {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("`{key}` has an unsupported value: {detail}")]
    #[diagnostic(code(palaver::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    /// A value that parsed but makes no sense, found after loading.
    #[error("{message}")]
    #[diagnostic(code(palaver::config::validation))]
    Validation { message: String },

    #[error("could not load configuration: {0}")]
    #[diagnostic(code(palaver::config::load))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    let valid = format!("expected one of: {valid_keys}");
    match suggestion {
        Some(key) => format!("did you mean `{key}`? {valid}"),
        None => valid,
    }
}

/// A TOML file that took part in loading, kept for span lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    /// Reads `path`; `None` if it does not exist or is unreadable.
    pub fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        // figment reports relative files by their absolute path
        let name = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Some(Self {
            name: name.display().to_string(),
            content,
        })
    }

    /// A configuration given as a string rather than a file.
    pub fn inline(content: &str) -> Self {
        Self {
            name: "<inline>".to_string(),
            content: content.to_string(),
        }
    }
}

/// Splits a figment error chain into one [`ConfigError`] per problem.
pub fn from_figment(err: FigmentError, sources: &[SourceFile]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(key, expected) => {
                let (span, src) = locate(&error, key, sources).unzip();
                ConfigError::UnknownKey {
                    key: key.clone(),
                    suggestion: suggest_key(key, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: dotted(&error),
                detail: format!("got {actual}"),
                expected: expected.clone(),
            },
            Kind::UnknownVariant(actual, expected) => ConfigError::InvalidValue {
                key: dotted(&error),
                detail: format!("`{actual}`, expected one of {}", expected.join(", ")),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted(error: &FigmentError) -> String {
    error.path.join(".")
}

/// Span of `key` in the file the error came from, or in the only source.
fn locate(
    error: &FigmentError,
    key: &str,
    sources: &[SourceFile],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let origin = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => Some(path.display().to_string()),
        _ => None,
    };
    let source = match (origin, sources) {
        (Some(origin), _) => sources.iter().find(|s| s.name == origin)?,
        (None, [only]) => only,
        (None, _) => return None,
    };

    let offset = find_key_offset(&source.content, &error.path, key)?;
    Some((
        SourceSpan::new(offset.into(), key.len()),
        NamedSource::new(&source.name, source.content.clone()),
    ))
}

/// Byte offset of `key` inside the table named by `table` (`[]` for the root).
///
/// Only `[a.b]` style headers are recognised; keys before any header belong
/// to the root table.
pub fn find_key_offset(content: &str, table: &[String], key: &str) -> Option<usize> {
    let wanted = table.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            current = header.trim().to_string();
            continue;
        }
        if current != wanted {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let matches = line[indent..]
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='));
        if matches {
            return Some(start + indent);
        }
    }
    None
}

/// Closest valid key to `unknown`, if any is close enough.
pub fn suggest_key<S: AsRef<str>>(unknown: &str, valid_keys: &[S]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key.as_ref()), key.as_ref()))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints every error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("config error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> Vec<String> {
        name.split('.').map(str::to_string).collect()
    }

    #[test]
    fn suggests_nearest_key() {
        let valid = ["host", "port", "admin_token", "log_level"];
        assert_eq!(suggest_key("prot", &valid).as_deref(), Some("port"));
        assert_eq!(suggest_key("admin_tokn", &valid).as_deref(), Some("admin_token"));
        assert_eq!(suggest_key("zzzzzz", &valid), None);
    }

    #[test]
    fn key_offset_is_scoped_to_its_table() {
        let content = "port = 1\n[server]\nhost = \"x\"\n[relay]\n  freshnes_poll_ms = 10\n";
        let o = find_key_offset(content, &table("relay"), "freshnes_poll_ms").unwrap();
        assert_eq!(&content[o..o + 16], "freshnes_poll_ms");

        assert_eq!(find_key_offset(content, &[], "port"), Some(0));
        assert_eq!(find_key_offset(content, &table("server"), "port"), None);
    }

    #[test]
    fn key_prefix_does_not_match_longer_key() {
        let content = "[client]\nreconnect_base_ms = 1\nreconnect = 2\n";
        let o = find_key_offset(content, &table("client"), "reconnect").unwrap();
        assert!(content[o..].starts_with("reconnect = 2"));
    }

    #[test]
    fn unknown_key_help_lists_valid_keys() {
        let help = unknown_key_help(None, "host, port");
        assert_eq!(help, "expected one of: host, port");
    }
}
