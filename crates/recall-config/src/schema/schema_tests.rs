use super::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.search.top_k, 5);
    assert!(config.cache.enabled);
    assert_eq!(config.indexer.extensions, vec!["md"]);
    assert!(!config.embedding.is_enabled());
    assert_eq!(config.guard.protected_files.len(), 6);
}

#[test]
fn test_search_config_default() {
    let search = SearchConfig::default();
    assert!((search.lexical_weight - 0.3).abs() < f32::EPSILON);
    assert!((search.vector_weight - 0.7).abs() < f32::EPSILON);
    assert_eq!(search.vector_timeout_ms, 2000);
}

#[test]
fn test_cache_config_default() {
    let cache = CacheConfig::default();
    assert_eq!(cache.ttl_secs, 86_400);
    assert_eq!(cache.max_entries, 100);
    assert!(cache.near_duplicate);
    assert_eq!(cache.history_size, 64);
}

#[test]
fn test_history_config_default() {
    let history = HistoryConfig::default();
    assert!(history.enabled);
    assert_eq!(history.max_records, 100);
}

#[test]
fn test_guard_config_default() {
    let guard = GuardConfig::default();
    assert_eq!(guard.cooldown_secs, 900);
    assert_eq!(guard.max_snapshots, 20);
    assert_eq!(guard.max_age_days, 30);
    assert!(guard.protected_files.iter().any(|f| f == "knowledge/INDEX.md"));
}

#[test]
fn test_embedding_config_default() {
    let embedding = EmbeddingConfig::default();
    assert_eq!(embedding.provider, "none");
    assert_eq!(embedding.base_url, "http://localhost:11434");
    assert_eq!(embedding.model, "mxbai-embed-large");
    assert_eq!(embedding.max_chars, 2000);
}

#[test]
fn test_source_path_relative_to_root() {
    let workspace = WorkspaceConfig {
        root: "/srv/agent".to_string(),
        source_dir: "memory".to_string(),
        state_dir: "/var/lib/recall".to_string(),
    };
    assert_eq!(workspace.source_path(), PathBuf::from("/srv/agent/memory"));
    assert_eq!(workspace.state_path(), PathBuf::from("/var/lib/recall"));
}

#[test]
fn test_source_path_absolute_overrides_root() {
    let workspace = WorkspaceConfig {
        root: "/srv/agent".to_string(),
        source_dir: "/data/notes".to_string(),
        state_dir: "/tmp".to_string(),
    };
    assert_eq!(workspace.source_path(), PathBuf::from("/data/notes"));
}

#[test]
fn test_default_paths_are_expanded() {
    let workspace = WorkspaceConfig::default();
    assert!(!workspace.state_path().to_string_lossy().starts_with('~'));
    assert!(!GuardConfig::default().backup_path().to_string_lossy().starts_with('~'));
}

#[test]
fn test_config_serialization_roundtrip() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).unwrap();
    let back: Config = toml::from_str(&toml_str).unwrap();
    assert_eq!(back.guard.protected_files, config.guard.protected_files);
    assert_eq!(back.search.top_k, config.search.top_k);
}
