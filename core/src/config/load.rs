use std::path::{Path, PathBuf};

use super::types::AppConfig;

pub const PBENCH_HOME_ENV: &str = "PBENCH_HOME";
pub const MAX_PARALLEL_ENV: &str = "PBENCH_MAX_PARALLEL";
pub const LOG_LEVEL_ENV: &str = "PBENCH_LOG_LEVEL";

/// `$PBENCH_HOME`, falling back to `~/.pbench`.
pub fn get_pbench_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var(PBENCH_HOME_ENV) {
        if !home.trim().is_empty() {
            return Ok(crate::util::paths::expand_home(&home));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".pbench"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: $PBENCH_HOME/config.toml or ~/.pbench/config.toml
    let home_config = get_pbench_data_dir()?.join("config.toml");

    // Priority 2: ./pbench.toml
    let local_config = Path::new("pbench.toml");

    let mut cfg = if home_config.exists() {
        tracing::debug!(path = %home_config.display(), "loading config");
        load_from_path(&home_config)?
    } else if local_config.exists() {
        tracing::debug!(path = %local_config.display(), "loading config");
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Environment overrides (highest priority). `lookup` is injected so the
/// overrides can be exercised without touching the process environment.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(MAX_PARALLEL_ENV).filter(|v| !v.trim().is_empty()) {
        let n: usize = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{MAX_PARALLEL_ENV} must be a non-negative integer, got {v:?}"))?;
        cfg.executor.max_parallel = if n == 0 { None } else { Some(n) };
    }
    if let Some(v) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
        cfg.logging.level = v.trim().to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_when_file_sections_missing() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.executor.max_parallel, None);
        assert_eq!(cfg.executor.stage_file_ext, "pbstage");
        assert!(cfg.recorders.file);
        assert!(cfg.recorders.mysql_config.is_empty());
        assert_eq!(cfg.recorders.call_timeout_ms, 30_000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pbench.toml");
        std::fs::write(
            &path,
            r#"
output_path = "/tmp/results"

[executor]
max_parallel = 4

[recorders]
file = false
influx_config = "~/influx.toml"
call_timeout_ms = 5000
"#,
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.executor.max_parallel, Some(4));
        assert!(!cfg.recorders.file);
        assert_eq!(cfg.recorders.influx_config, "~/influx.toml");
        assert_eq!(cfg.recorders.call_timeout_ms, 5000);
        assert_eq!(cfg.output_path, "/tmp/results");
    }

    #[test]
    fn test_load_from_path_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pbench.toml");
        std::fs::write(&path, "[executor\nmax_parallel = ").unwrap();
        let err = load_from_path(&path).unwrap_err().to_string();
        assert!(err.contains("parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[(MAX_PARALLEL_ENV, "3"), (LOG_LEVEL_ENV, "debug")]),
        )
        .unwrap();
        assert_eq!(cfg.executor.max_parallel, Some(3));
        assert_eq!(cfg.logging.level, "debug");

        apply_env_overrides(&mut cfg, env(&[(MAX_PARALLEL_ENV, "0")])).unwrap();
        assert_eq!(cfg.executor.max_parallel, None);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut cfg = AppConfig::default();
        assert!(apply_env_overrides(&mut cfg, env(&[(MAX_PARALLEL_ENV, "many")])).is_err());
    }
}
