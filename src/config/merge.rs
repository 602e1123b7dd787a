use super::schema::{AppConfig, PartialConfig};
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For agent_args and extra_env: REPLACE semantics (if self has Some, use it entirely).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            home: self.home.or(fallback.home),
            recipes_dir: self.recipes_dir.or(fallback.recipes_dir),
            agent_command: self.agent_command.or(fallback.agent_command),
            agent_args: self.agent_args.or(fallback.agent_args),
            param_flag: self.param_flag.or(fallback.param_flag),
            recipe_extension: self.recipe_extension.or(fallback.recipe_extension),
            max_turns: self.max_turns.or(fallback.max_turns),
            extra_env: self.extra_env.or(fallback.extra_env),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
            auto_cleanup_hours: self.auto_cleanup_hours.or(fallback.auto_cleanup_hours),
            summarizer_enabled: self.summarizer_enabled.or(fallback.summarizer_enabled),
            summarizer_model: self.summarizer_model.or(fallback.summarizer_model),
            summarizer_timeout_secs: self
                .summarizer_timeout_secs
                .or(fallback.summarizer_timeout_secs),
            max_log_chars: self.max_log_chars.or(fallback.max_log_chars),
            inference_health_url: self.inference_health_url.or(fallback.inference_health_url),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let home = self.home.unwrap_or_else(|| PathBuf::from("./.agentctl"));
        let recipes_dir = match self.recipes_dir {
            Some(dir) if dir.is_relative() => home.join(dir),
            Some(dir) => dir,
            None => home.join("recipes"),
        };

        AppConfig {
            recipes_dir,
            agent_command: self.agent_command.unwrap_or_else(|| "goose".to_string()),
            agent_args: self.agent_args.unwrap_or_else(|| {
                vec!["run".into(), "--no-session".into(), "--recipe".into()]
            }),
            param_flag: self.param_flag.unwrap_or_else(|| "--params".to_string()),
            recipe_extension: self.recipe_extension.unwrap_or_else(|| "yaml".to_string()),
            max_turns: self.max_turns.unwrap_or(50),
            extra_env: self.extra_env.unwrap_or_default(),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(1000).max(1),
            auto_cleanup_hours: self.auto_cleanup_hours.unwrap_or(24),
            summarizer_enabled: self.summarizer_enabled.unwrap_or(true),
            summarizer_model: self
                .summarizer_model
                .unwrap_or_else(|| "llama3.2".to_string()),
            summarizer_timeout_secs: self.summarizer_timeout_secs.unwrap_or(20),
            max_log_chars: self.max_log_chars.unwrap_or(8000),
            inference_health_url: self
                .inference_health_url
                .or_else(|| Some("http://localhost:11434/".to_string()))
                .filter(|url| !url.is_empty()),
            home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_layer_wins_and_gaps_fall_through() {
        let cli = PartialConfig {
            home: Some(PathBuf::from("/tmp/cli-home")),
            ..Default::default()
        };
        let file = PartialConfig {
            home: Some(PathBuf::from("/tmp/file-home")),
            agent_command: Some("sh".into()),
            max_turns: Some(7),
            ..Default::default()
        };

        let config = cli.with_fallback(file).finalize();
        assert_eq!(config.home, PathBuf::from("/tmp/cli-home"));
        assert_eq!(config.agent_command, "sh");
        assert_eq!(config.max_turns, 7);
        assert_eq!(config.param_flag, "--params");
    }

    #[test]
    fn defaults_anchor_paths_under_home() {
        let config = PartialConfig {
            home: Some(PathBuf::from("/srv/agents")),
            recipes_dir: Some(PathBuf::from("book")),
            ..Default::default()
        }
        .finalize();

        assert_eq!(config.recipes_dir, PathBuf::from("/srv/agents/book"));
        assert_eq!(config.registry_path(), PathBuf::from("/srv/agents/agent-registry.json"));
        assert_eq!(config.log_dir(), PathBuf::from("/srv/agents/logs"));
        assert_eq!(config.auto_cleanup_hours, 24);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = PartialConfig {
            poll_interval_ms: Some(0),
            ..Default::default()
        }
        .finalize();
        assert_eq!(config.poll_interval_ms, 1);
    }

    #[test]
    fn empty_health_url_disables_probe() {
        let config = PartialConfig {
            inference_health_url: Some(String::new()),
            ..Default::default()
        }
        .finalize();
        assert!(config.inference_health_url.is_none());
    }

    #[test]
    fn agent_env_carries_fixed_overrides_then_extras() {
        let config = PartialConfig {
            max_turns: Some(12),
            extra_env: Some(vec![("GOOSE_PROVIDER".into(), "ollama".into())]),
            ..Default::default()
        }
        .finalize();

        let env = config.agent_env();
        assert!(env.contains(&("NO_COLOR".into(), "true".into())));
        assert!(env.contains(&("GOOSE_MODE".into(), "auto".into())));
        assert!(env.contains(&("GOOSE_MAX_TURNS".into(), "12".into())));
        assert_eq!(env.last(), Some(&("GOOSE_PROVIDER".into(), "ollama".into())));
    }
}
