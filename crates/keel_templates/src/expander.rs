//! Flat placeholder expansion.
//!
//! Substitutes `${NAME}` and `${PREFIX(ARG)}` tokens in plain text, for
//! artifacts that are not JSON trees (compose files, container definitions).

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{TemplateError, TemplateResult};
use crate::registry::ResolverRegistry;

/// Expander for `${...}` placeholders.
pub struct FlatExpander {
    token_pattern: Regex,
}

impl Default for FlatExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatExpander {
    pub fn new() -> Self {
        Self {
            // Match ${TOKEN}, the token itself may not contain braces
            token_pattern: Regex::new(r"\$\{[^{}]*\}").expect("valid placeholder pattern"),
        }
    }

    /// Expand every placeholder of `text`.
    ///
    /// The first placeholder that fails to resolve aborts the expansion.
    pub fn expand(&self, text: &str, registry: &ResolverRegistry) -> TemplateResult<String> {
        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        let mut count = 0;

        for token_match in self.token_pattern.find_iter(text) {
            let literal = &text[last..token_match.start()];
            check_unterminated(literal, last)?;
            output.push_str(literal);

            let raw = token_match.as_str();
            let token = &raw[2..raw.len() - 1];
            if token.is_empty() {
                return Err(TemplateError::MalformedPlaceholder {
                    offset: token_match.start(),
                    message: "empty placeholder".to_string(),
                });
            }

            let value = registry
                .resolve_token(token)
                .map_err(|source| TemplateError::Expansion {
                    token: token.to_string(),
                    source: Box::new(source),
                })?;
            debug!("Expanded ${{{}}}", token);
            output.push_str(&value);

            last = token_match.end();
            count += 1;
        }

        let tail = &text[last..];
        check_unterminated(tail, last)?;
        output.push_str(tail);

        debug!("Expanded {} placeholders", count);
        Ok(output)
    }

    /// Read and expand a file.
    pub fn expand_file(&self, path: &Path, registry: &ResolverRegistry) -> TemplateResult<String> {
        if !path.exists() {
            return Err(TemplateError::NotFound(path.to_path_buf()));
        }
        info!("Expanding placeholders in {:?}", path);
        let content = fs::read_to_string(path)?;
        self.expand(&content, registry)
    }

    /// Tokens referenced by `text`, in order of appearance.
    pub fn placeholders<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.token_pattern
            .find_iter(text)
            .map(|m| {
                let raw = m.as_str();
                &raw[2..raw.len() - 1]
            })
            .collect()
    }
}

fn check_unterminated(literal: &str, offset: usize) -> TemplateResult<()> {
    match literal.find("${") {
        Some(pos) => Err(TemplateError::MalformedPlaceholder {
            offset: offset + pos,
            message: "unterminated placeholder".to_string(),
        }),
        None => Ok(()),
    }
}
