//! Rule Store Implementation

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

use crate::config::RulesConfig;
use crate::error::RuleConfigError;
use crate::rule::Rule;
use crate::watcher::ConfigWatcher;

/// Summary of the active configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConfigInfo {
    pub loaded: bool,
    pub version: Option<String>,
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub config_path: String,
}

/// Authoritative holder of the active rules configuration
///
/// The active config is an `Arc` swapped under a write lock, so readers
/// always see one complete config. Toggles clone-on-write when a reader
/// still holds the previous snapshot.
pub struct RuleStore {
    /// Path of the persisted rules document
    config_path: PathBuf,
    /// Active config, `None` until the first successful load
    active: RwLock<Option<Arc<RulesConfig>>>,
    /// Config replaced by the most recent successful load
    previous: RwLock<Option<Arc<RulesConfig>>>,
    /// File watcher, present while watching
    watcher: tokio::sync::Mutex<Option<ConfigWatcher>>,
}

impl RuleStore {
    /// Create a store for the given config path (nothing is loaded yet)
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        info!("Creating rule store for {}", config_path.display());
        Self {
            config_path,
            active: RwLock::new(None),
            previous: RwLock::new(None),
            watcher: tokio::sync::Mutex::new(None),
        }
    }

    /// Path of the persisted rules document
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read_active(&self) -> RwLockReadGuard<'_, Option<Arc<RulesConfig>>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, Option<Arc<RulesConfig>>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_previous(&self) -> RwLockWriteGuard<'_, Option<Arc<RulesConfig>>> {
        self.previous.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_config_file(&self) -> Result<RulesConfig, RuleConfigError> {
        let contents = std::fs::read_to_string(&self.config_path).map_err(|source| RuleConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        RulesConfig::from_json(&contents)
    }

    /// Load, validate and activate the persisted config
    ///
    /// On failure the active config is left untouched.
    pub fn load_config(&self) -> Result<Arc<RulesConfig>, RuleConfigError> {
        let config = match self.read_config_file() {
            Ok(config) => Arc::new(config),
            Err(e) => {
                error!(path = %self.config_path.display(), error = %e, "Failed to load rules config");
                metrics::counter!("rules_config_loads_total", "outcome" => "failure").increment(1);
                return Err(e);
            }
        };

        // Lock order: active, then previous
        {
            let mut active = self.write_active();
            if let Some(old) = active.replace(Arc::clone(&config)) {
                *self.write_previous() = Some(old);
            }
        }

        metrics::counter!("rules_config_loads_total", "outcome" => "success").increment(1);
        info!(
            version = %config.version,
            rules = config.rules.len(),
            "Loaded rules config from {}",
            self.config_path.display()
        );
        Ok(config)
    }

    /// Reload the persisted config, returning whether it succeeded
    pub fn reload_config(&self) -> bool {
        info!("Reloading rules config");
        match self.load_config() {
            Ok(_) => {
                info!("Rules config reloaded");
                true
            }
            Err(_) => {
                warn!("Rules config reload failed, keeping the current config");
                let mut active = self.write_active();
                if active.is_none() {
                    let previous = self.previous.read().unwrap_or_else(PoisonError::into_inner).clone();
                    if let Some(previous) = previous {
                        warn!(version = %previous.version, "Restoring last known-good rules config");
                        *active = Some(previous);
                    }
                }
                false
            }
        }
    }

    /// Swap the previously active config back in
    ///
    /// The config being replaced becomes the new rollback target.
    pub fn rollback_config(&self) -> bool {
        let mut active = self.write_active();
        let mut previous = self.write_previous();
        match previous.take() {
            Some(target) => {
                info!(version = %target.version, "Rolling back rules config");
                *previous = active.replace(target);
                true
            }
            None => {
                warn!("No previous rules config to roll back to");
                false
            }
        }
    }

    /// Dry-run validation of a candidate document
    pub fn validate_config(&self, json: &str) -> Result<(), RuleConfigError> {
        RulesConfig::from_json(json).map(|_| ())
    }

    /// Current config snapshot
    pub fn snapshot(&self) -> Option<Arc<RulesConfig>> {
        self.read_active().clone()
    }

    /// Enabled rules in execution order (priority descending, stable)
    pub fn get_enabled_rules(&self) -> Vec<Rule> {
        self.snapshot().map(|c| c.enabled_rules()).unwrap_or_default()
    }

    /// All rules of the active config in file order
    pub fn list_rules(&self) -> Vec<Rule> {
        self.snapshot().map(|c| c.rules.clone()).unwrap_or_default()
    }

    /// Look up a rule by id
    pub fn get_rule_by_id(&self, id: &str) -> Option<Rule> {
        self.snapshot().and_then(|c| c.rule(id).cloned())
    }

    /// Rule templates of the active config
    pub fn get_rule_templates(&self) -> Vec<Value> {
        self.snapshot().map(|c| c.templates.clone()).unwrap_or_default()
    }

    /// Enable or disable a rule in the active config
    ///
    /// Not persisted; the next successful reload replaces it. Returns
    /// false without side effects for an unknown id.
    pub fn toggle_rule(&self, id: &str, enabled: bool) -> bool {
        let mut active = self.write_active();
        let Some(config) = active.as_mut() else {
            warn!(rule_id = id, "Cannot toggle rule, no rules config loaded");
            return false;
        };
        if config.rule(id).is_none() {
            warn!(rule_id = id, "Rule not found");
            return false;
        }

        if let Some(rule) = Arc::make_mut(config).rule_mut(id) {
            rule.enabled = enabled;
        }
        info!(rule_id = id, enabled, "Rule toggled");
        true
    }

    /// Describe the active config
    pub fn get_config_info(&self) -> ConfigInfo {
        let config_path = self.config_path.display().to_string();
        match self.snapshot() {
            Some(config) => ConfigInfo {
                loaded: true,
                version: Some(config.version.clone()),
                total_rules: config.rules.len(),
                enabled_rules: config.enabled_count(),
                config_path,
            },
            None => ConfigInfo {
                loaded: false,
                version: None,
                total_rules: 0,
                enabled_rules: 0,
                config_path,
            },
        }
    }

    /// Watch the config directory and reload on changes
    pub async fn start_watching(self: &Arc<Self>) -> Result<(), RuleConfigError> {
        let mut slot = self.watcher.lock().await;
        if slot.is_some() {
            warn!("Config watcher already running");
            return Ok(());
        }
        *slot = Some(ConfigWatcher::spawn(Arc::downgrade(self), self.config_path.clone())?);
        Ok(())
    }

    /// Stop watching and wait for the reload loop to exit
    pub async fn stop_watching(&self) {
        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
            info!("Stopped watching {}", self.config_path.display());
        }
    }

    /// Whether a watcher is running
    pub async fn is_watching(&self) -> bool {
        self.watcher.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_config(version: &str) -> Value {
        json!({
            "version": version,
            "rules": [
                {
                    "id": "issuer",
                    "name": "Issuer present",
                    "category": "compliance",
                    "priority": 90,
                    "critical": true,
                    "rule_type": "pattern",
                    "parameters": {"pattern": "签发"},
                    "error_type": "compliance_error",
                    "error_level": "error",
                    "description": "Issuer mark is missing"
                },
                {
                    "id": "min-length",
                    "name": "Minimum length",
                    "category": "content",
                    "priority": 50,
                    "rule_type": "length",
                    "parameters": {"min_length": 10},
                    "error_type": "content_error",
                    "error_level": "warning",
                    "description": "Document is too short"
                },
                {
                    "id": "sections",
                    "name": "Sections",
                    "category": "format",
                    "priority": 50,
                    "enabled": false,
                    "rule_type": "structure",
                    "parameters": {"required_sections": ["Facts"]},
                    "error_type": "format_error",
                    "error_level": "info",
                    "description": "Missing section"
                }
            ],
            "templates": [{"name": "blank"}]
        })
    }

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("validation_rules.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn loaded_store(dir: &TempDir) -> RuleStore {
        let path = write(dir, &sample_config("1.0").to_string());
        let store = RuleStore::new(path);
        store.load_config().unwrap();
        store
    }

    #[test]
    fn test_load_config() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        let info = store.get_config_info();
        assert!(info.loaded);
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.total_rules, 3);
        assert_eq!(info.enabled_rules, 2);
        assert_eq!(store.get_rule_templates().len(), 1);
    }

    #[test]
    fn test_missing_file_leaves_store_unloaded() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::new(dir.path().join("absent.json"));

        assert!(matches!(store.load_config(), Err(RuleConfigError::Io { .. })));
        assert!(!store.get_config_info().loaded);
        assert!(store.get_enabled_rules().is_empty());
        assert!(!store.reload_config());
    }

    #[test]
    fn test_enabled_rules_in_priority_order() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        let ids: Vec<_> = store.get_enabled_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["issuer", "min-length"]);
        assert_eq!(store.list_rules().len(), 3);
    }

    #[test]
    fn test_reload_with_malformed_json_keeps_active_config() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let before = serde_json::to_string(&*store.snapshot().unwrap()).unwrap();

        write(&dir, "{\"version\": \"2.0\", \"rules\": [");
        assert!(!store.reload_config());

        let after = serde_json::to_string(&*store.snapshot().unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reload_with_invariant_violation_keeps_active_config() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let before = store.snapshot().unwrap();

        let mut duplicate = sample_config("2.0");
        duplicate["rules"][1]["id"] = json!("issuer");
        write(&dir, &duplicate.to_string());
        assert!(!store.reload_config());
        assert_eq!(*store.snapshot().unwrap(), *before);

        let mut missing = sample_config("3.0");
        missing["rules"][0]["parameters"] = json!({});
        write(&dir, &missing.to_string());
        assert!(!store.reload_config());
        assert_eq!(*store.snapshot().unwrap(), *before);
    }

    #[test]
    fn test_successful_reload_replaces_config_and_allows_rollback() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        write(&dir, &sample_config("2.0").to_string());
        assert!(store.reload_config());
        assert_eq!(store.get_config_info().version.as_deref(), Some("2.0"));

        assert!(store.rollback_config());
        assert_eq!(store.get_config_info().version.as_deref(), Some("1.0"));

        // Rolling back again returns to the newer config
        assert!(store.rollback_config());
        assert_eq!(store.get_config_info().version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_rollback_without_previous_config() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        assert!(!store.rollback_config());
        assert_eq!(store.get_config_info().version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_toggle_rule() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        assert!(store.toggle_rule("issuer", false));
        assert!(!store.get_rule_by_id("issuer").unwrap().enabled);
        let ids: Vec<_> = store.get_enabled_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["min-length"]);
    }

    #[test]
    fn test_toggle_unknown_rule_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let before = store.snapshot().unwrap();

        assert!(!store.toggle_rule("nope", false));
        assert_eq!(*store.snapshot().unwrap(), *before);
    }

    #[test]
    fn test_toggle_off_then_on_restores_rule() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let before = store.snapshot().unwrap();

        assert!(store.toggle_rule("min-length", false));
        assert!(store.toggle_rule("min-length", true));

        assert_eq!(*store.snapshot().unwrap(), *before);
    }

    #[test]
    fn test_toggle_does_not_mutate_held_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let held = store.snapshot().unwrap();

        assert!(store.toggle_rule("issuer", false));
        assert!(held.rule("issuer").unwrap().enabled);
        assert!(!store.get_rule_by_id("issuer").unwrap().enabled);
    }

    #[test]
    fn test_reload_discards_toggles() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        store.toggle_rule("issuer", false);
        assert!(store.reload_config());
        assert!(store.get_rule_by_id("issuer").unwrap().enabled);
    }

    #[test]
    fn test_validate_config_is_dry_run() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);

        assert!(store.validate_config(&sample_config("9.9").to_string()).is_ok());
        assert!(store.validate_config("not json").is_err());
        assert_eq!(store.get_config_info().version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_readers_see_whole_configs_during_reloads() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(&dir);
        let path = store.config_path().to_path_buf();

        let old = sample_config("1.0").to_string();
        let mut new = sample_config("2.0");
        new["rules"][2]["enabled"] = json!(true);
        let new = new.to_string();

        std::thread::scope(|s| {
            s.spawn(|| {
                let staged = dir.path().join("staged.tmp");
                for i in 0..100 {
                    std::fs::write(&staged, if i % 2 == 0 { &new } else { &old }).unwrap();
                    std::fs::rename(&staged, &path).unwrap();
                    assert!(store.reload_config());
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let ids: Vec<_> = store.get_enabled_rules().into_iter().map(|r| r.id).collect();
                        assert!(
                            ids == ["issuer", "min-length"] || ids == ["issuer", "min-length", "sections"],
                            "{ids:?}"
                        );

                        let config = store.snapshot().unwrap();
                        let expected = if config.version == "2.0" { 3 } else { 2 };
                        assert_eq!(config.enabled_count(), expected);
                    }
                });
            }
        });
    }

    #[tokio::test]
    async fn test_watcher_reloads_on_file_change() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(loaded_store(&dir));

        store.start_watching().await.unwrap();
        assert!(store.is_watching().await);
        // Give the OS watcher a moment to register
        tokio::time::sleep(Duration::from_millis(200)).await;

        let staged = dir.path().join("staged.tmp");
        std::fs::write(&staged, sample_config("2.0").to_string()).unwrap();
        std::fs::rename(&staged, store.config_path()).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while store.get_config_info().version.as_deref() != Some("2.0") {
            assert!(tokio::time::Instant::now() < deadline, "config was not reloaded");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        store.stop_watching().await;
        assert!(!store.is_watching().await);
    }
}
