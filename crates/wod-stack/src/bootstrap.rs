//! Bootstrap payload template
//!
//! The instance startup script is a printf-style template with a single
//! `%s` where the server's rendered tunnel config is inserted verbatim.
//! `%%` stands for a literal `%`; any other `%` is copied through.

use std::path::Path;

const PLACEHOLDER: char = 's';

/// A parsed startup script template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapTemplate {
    before: String,
    after: String,
}

impl BootstrapTemplate {
    /// Parse template text
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut before = String::with_capacity(text.len());
        let mut after = String::new();
        let mut found = 0usize;

        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let target = if found == 0 { &mut before } else { &mut after };
            if c != '%' {
                target.push(c);
                continue;
            }
            match chars.peek() {
                Some('%') => {
                    chars.next();
                    target.push('%');
                }
                Some(&PLACEHOLDER) => {
                    chars.next();
                    found += 1;
                }
                _ => target.push('%'),
            }
        }

        match found {
            1 => Ok(Self { before, after }),
            0 => Err(TemplateError::MissingPlaceholder),
            n => Err(TemplateError::MultiplePlaceholders(n)),
        }
    }

    /// Read and parse a template file
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Insert the server configuration text
    pub fn render(&self, server_config: &str) -> String {
        let mut out =
            String::with_capacity(self.before.len() + server_config.len() + self.after.len());
        out.push_str(&self.before);
        out.push_str(server_config);
        out.push_str(&self.after);
        out
    }
}

/// Template errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {message}")]
    Io { path: String, message: String },

    #[error("Template has no %s substitution point")]
    MissingPlaceholder,

    #[error("Template has {0} %s substitution points, expected exactly one")]
    MultiplePlaceholders(usize),
}
