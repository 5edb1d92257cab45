use crate::config::Config;
use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};

/// Assigns a task type from checkbox text using ordered rules
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    rules: Vec<(Regex, String)>,
    default_type: String,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_type: "generic".to_string(),
        }
    }
}

impl TaskClassifier {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(config.task_types.len());
        for rule in &config.task_types {
            let re = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    source: e,
                })?;
            rules.push((re, rule.task_type.clone()));
        }

        Ok(Self {
            rules,
            default_type: config.default_task_type.clone(),
        })
    }

    pub fn classify(&self, text: &str) -> &str {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, t)| t.as_str())
            .unwrap_or(&self.default_type)
    }
}
