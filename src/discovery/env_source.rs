//! Environment-variable secret source.

use async_trait::async_trait;

use super::{DiscoveredSecret, SecretSource};

const LABEL: &str = "Environment Variable";

/// Variable names checked per provider, in order. The first set variable
/// wins for a provider.
const ENV_TABLE: &[(&[&str], &str)] = &[
    (&["OPENAI_API_KEY"], "openai"),
    (&["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"], "claude-code"),
    (&["GEMINI_API_KEY", "GOOGLE_API_KEY"], "gemini-cli"),
    (&["DEEPSEEK_API_KEY"], "deepseek"),
    (&["OPENROUTER_API_KEY"], "openrouter"),
    (&["KIMI_API_KEY", "MOONSHOT_API_KEY"], "kimi"),
    (&["XIAOMI_API_KEY", "MIMO_API_KEY"], "xiaomi"),
    (&["MINIMAX_API_KEY"], "minimax"),
    (&["ZAI_API_KEY", "Z_AI_API_KEY"], "zai"),
    (&["ANTIGRAVITY_API_KEY", "GOOGLE_ANTIGRAVITY_API_KEY"], "antigravity"),
    (&["OPENCODE_API_KEY"], "opencode-zen"),
    (&["CODEX_API_KEY"], "codex"),
];

/// Reads provider credentials from the process environment.
pub struct EnvSource;

impl EnvSource {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn discover_with(lookup: impl Fn(&str) -> Option<String>) -> Vec<DiscoveredSecret> {
        let mut found = Vec::new();
        for (names, provider_id) in ENV_TABLE {
            for name in *names {
                if let Some(value) = lookup(name) {
                    let value = value.trim().to_string();
                    if !value.is_empty() {
                        found.push(DiscoveredSecret::new(*provider_id, value, LABEL));
                        break;
                    }
                }
            }
        }
        found
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretSource for EnvSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        Self::discover_with(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn discover(env: &HashMap<String, String>) -> Vec<DiscoveredSecret> {
        EnvSource::discover_with(|name| env.get(name).cloned())
    }

    #[test]
    fn maps_variables_to_provider_ids() {
        let env = env_of(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("DEEPSEEK_API_KEY", "sk-deep"),
        ]);
        let found = discover(&env);
        assert_eq!(found.len(), 2);
        assert!(
            found
                .iter()
                .any(|s| s.provider_id == "openai" && s.secret == "sk-openai")
        );
        assert!(found.iter().any(|s| s.provider_id == "deepseek"));
    }

    #[test]
    fn alias_variables_map_to_one_provider() {
        let env = env_of(&[("CLAUDE_API_KEY", "sk-claude")]);
        let found = discover(&env);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider_id, "claude-code");

        // Primary name takes precedence when both are set.
        let env = env_of(&[
            ("ANTHROPIC_API_KEY", "sk-primary"),
            ("CLAUDE_API_KEY", "sk-alias"),
        ]);
        let found = discover(&env);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].secret, "sk-primary");
    }

    #[test]
    fn blank_values_are_ignored() {
        let env = env_of(&[("OPENAI_API_KEY", "   ")]);
        assert!(discover(&env).is_empty());
    }

    #[test]
    fn empty_environment_finds_nothing() {
        assert!(discover(&HashMap::new()).is_empty());
    }
}
