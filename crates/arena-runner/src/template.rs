//! Placeholder templates for simulator arguments and bot launch commands

use std::path::{Path, PathBuf};

use crate::error::TemplateError;

/// Reject names that could escape the bot root or split a command line.
pub fn validate_bot_name(name: &str) -> Result<(), TemplateError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.chars().any(char::is_whitespace);
    if invalid {
        return Err(TemplateError::InvalidBotName(name.to_string()));
    }
    Ok(())
}

/// Replace every `{key}` in `template` with its value.
///
/// A placeholder with no matching key is an error rather than being passed
/// through, so typos in configuration surface at the first match.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let key = &after[..close];
        let value = values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                template: template.to_string(),
                placeholder: key.to_string(),
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Names of the placeholders used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                found.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    found
}

/// How a bot directory turns into the command the simulator runs.
///
/// Placeholders: `{dir}` (required), `{name}`, and `{stderr}`, a per-slot
/// capture file the command may redirect its standard error to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplate {
    template: String,
}

impl LaunchTemplate {
    pub const KEYS: [&'static str; 3] = ["dir", "name", "stderr"];

    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        let keys = placeholders(&template);
        let has_dir = keys.contains(&"dir");
        let unknown = keys
            .iter()
            .find(|k| !Self::KEYS.contains(k))
            .map(|k| k.to_string());

        if !has_dir {
            return Err(TemplateError::MissingDirPlaceholder(template));
        }
        if let Some(placeholder) = unknown {
            return Err(TemplateError::UnknownPlaceholder {
                template,
                placeholder,
            });
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Directory holding a bot's entry point
    pub fn bot_dir(bot_root: &Path, name: &str) -> Result<PathBuf, TemplateError> {
        validate_bot_name(name)?;
        Ok(bot_root.join(name))
    }

    pub fn resolve(&self, bot_root: &Path, name: &str, stderr: &Path) -> Result<String, TemplateError> {
        let dir = Self::bot_dir(bot_root, name)?;
        let dir = dir.to_string_lossy();
        let stderr = stderr.to_string_lossy();
        substitute(
            &self.template,
            &[("dir", dir.as_ref()), ("name", name), ("stderr", stderr.as_ref())],
        )
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod template_tests;
