//! Configuration tests

mod common;

use tempfile::TempDir;

use voicemux::config::{CommandExpansion, Config, ConfigError, SpeechBackend};
use voicemux::summary::SummaryStrategy;

#[test]
fn missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load(Some(&dir.path().join("none.yaml"))).unwrap();

    assert!(config.projects.is_empty());
    assert_eq!(config.summary.max_spoken_length, 150);
    assert_eq!(config.summary.strategy, SummaryStrategy::Smart);
    assert_eq!(config.monitor.poll_interval_ms, 1000);
    assert_eq!(config.routing.sticky_ttl(), None);
    assert!(config.routing.fuzzy_matching);
}

#[test]
fn transcription_settings_are_read() {
    let config = Config::parse("voice:\n  whisper_model: small\n  language: de\n").unwrap();
    assert_eq!(config.voice.transcription_label(), "whisper model small, language de");
    assert_eq!(
        Config::default().voice.transcription_label(),
        "whisper model base, language en"
    );
}

#[test]
fn init_writes_template_and_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    let written = Config::init(Some(&path), false).unwrap();
    assert_eq!(written, path);

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.project_names(), vec!["scratch"]);
    assert_eq!(config.voice.tts_voice, "Samantha");
    assert_eq!(config.voice.speech_backend, SpeechBackend::Say);

    assert!(matches!(
        Config::init(Some(&path), false),
        Err(ConfigError::Invalid { .. })
    ));
    Config::init(Some(&path), true).unwrap();
}

#[test]
fn parses_projects_and_commands_in_order() {
    let config = common::test_config();

    assert_eq!(config.project_names(), vec!["frontend", "backend"]);
    assert_eq!(config.projects["frontend"].command, "claude");
    assert_eq!(config.projects["frontend"].voice_alias, vec!["front", "web app"]);
    assert_eq!(config.summary.max_spoken_length, 40);
    assert_eq!(config.monitor.quiescence_ms, 60);
    // Sections left out keep their defaults
    assert!(config.routing.acknowledge_commands);

    let expansions: Vec<(&str, &str)> = config
        .commands
        .iter()
        .map(|(k, v)| (k.as_str(), v.text()))
        .collect();
    assert_eq!(
        expansions,
        vec![("run tests", "npm test"), ("lint", "npm run lint")]
    );
    assert!(matches!(config.commands["lint"], CommandExpansion::Send { .. }));
}

#[test]
fn save_and_reload_keeps_projects() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    let project_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config
        .add_project("api", project_dir.path(), "claude --resume", vec!["server".to_string()])
        .unwrap();
    config.save(Some(&path)).unwrap();

    let loaded = Config::load(Some(&path)).unwrap();
    assert_eq!(loaded.project_names(), vec!["api"]);
    assert_eq!(loaded.projects["api"].command, "claude --resume");
    assert_eq!(loaded.projects["api"].voice_alias, vec!["server"]);
    loaded.validate(true).unwrap();
}

#[test]
fn add_project_rejects_collisions_and_rolls_back() {
    let mut config = common::test_config();
    let dir = TempDir::new().unwrap();

    let err = config
        .add_project("frontend", dir.path(), "claude", Vec::new())
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateName(_)));

    let err = config
        .add_project("docs", dir.path(), "claude", vec!["api".to_string()])
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateAlias { .. }));
    assert!(!config.projects.contains_key("docs"));

    assert!(config.remove_project("backend").is_some());
    assert!(config.remove_project("backend").is_none());
}

#[test]
fn validate_rejects_bad_settings() {
    let mut config = common::test_config();
    config.summary.max_spoken_length = 0;
    assert!(matches!(config.validate(false), Err(ConfigError::Invalid { .. })));

    let mut config = common::test_config();
    config.voice.volume = 5;
    assert!(matches!(config.validate(false), Err(ConfigError::Invalid { .. })));

    let mut config = common::test_config();
    config.monitor.error_patterns.push("unclosed (group".to_string());
    match config.validate(false) {
        Err(ConfigError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "unclosed (group"),
        other => panic!("unexpected: {:?}", other),
    }

    let mut config = common::test_config();
    config.projects["backend"].directory = "/definitely/not/here".to_string();
    assert!(config.validate(false).is_ok());
    assert!(matches!(config.validate(true), Err(ConfigError::MissingDirectory(_))));
}

#[test]
fn alias_collision_in_file_is_reported() {
    let raw = r#"
projects:
  frontend:
    directory: /tmp
    voice_alias: [ui]
  design:
    directory: /tmp
    voice_alias: [UI]
"#;
    let config = Config::parse(raw).unwrap();
    match config.validate(false) {
        Err(ConfigError::DuplicateAlias { alias, existing, conflicting }) => {
            assert_eq!(alias, "ui");
            assert_eq!(existing, "frontend");
            assert_eq!(conflicting, "design");
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn registry_for_selected_projects() {
    let config = common::test_config();
    let registry = config
        .build_registry(Some(&["backend".to_string()][..]))
        .unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.resolve("api").is_some());
    assert!(registry.resolve("front").is_none());

    assert!(config.build_registry(Some(&["mobile".to_string()][..])).is_err());
}

#[test]
fn malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "projects: [not, a, map").unwrap();

    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Malformed { .. })
    ));
}
