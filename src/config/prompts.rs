//! Prompt templates for Pensum.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub grounding: GroundingPrompts,
    /// Custom variables from config, available in all prompts as {{variable_name}}.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}


/// Prompts that ground completions in retrieved course material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingPrompts {
    /// System instruction given to the completion provider; `{{context}}`
    /// is replaced with the retrieved passages.
    pub system: String,
}

impl Default for GroundingPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a helpful AI assistant for a course. Answer questions based on the provided course materials.

Context from course materials:
{{context}}

Use the context above to answer questions. If the answer is not in the context, say so. Be concise and helpful."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        // Store custom variables
        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            // Load grounding prompts if file exists
            let grounding_path = custom_path.join("grounding.toml");
            if grounding_path.exists() {
                let content = std::fs::read_to_string(&grounding_path)?;
                prompts.grounding = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        // Start with custom variables, then override with provided vars
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// Render the grounding system prompt around the retrieved context.
    pub fn grounding_system(&self, context: &str) -> String {
        let mut vars = std::collections::HashMap::new();
        vars.insert("context".to_string(), context.to_string());
        self.render_with_custom(&self.grounding.system, &vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.grounding.system.is_empty());
        assert!(prompts.grounding.system.contains("{{context}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = std::collections::HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_grounding_system_embeds_context() {
        let prompts = Prompts::default();
        let rendered = prompts.grounding_system("Lecture 3 covers recursion.");
        assert!(rendered.contains("Lecture 3 covers recursion."));
        assert!(!rendered.contains("{{context}}"));
    }
}
