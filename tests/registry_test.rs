//! Session registry tests

use voicemux::config::ConfigError;
use voicemux::session::{Resolution, Session, SessionId, SessionRegistry, SessionStatus};

fn registry() -> SessionRegistry {
    let mut registry = SessionRegistry::new();
    registry
        .register(Session::new("frontend", "/tmp").with_aliases(["front", "Web App"]))
        .unwrap();
    registry
        .register(Session::new("backend", "/tmp").with_aliases(["api"]))
        .unwrap();
    registry
}

#[test]
fn resolves_names_and_aliases_case_insensitively() {
    let registry = registry();
    let frontend = SessionId::from("frontend");

    assert_eq!(registry.resolve("Frontend"), Some(frontend.clone()));
    assert_eq!(registry.resolve("FRONT"), Some(frontend.clone()));
    assert_eq!(registry.resolve("web app"), Some(frontend));
    assert_eq!(registry.resolve("API"), Some(SessionId::from("backend")));
    assert_eq!(registry.resolve("database"), None);
    assert_eq!(registry.resolve("  "), None);
}

#[test]
fn rejects_alias_owned_by_another_session() {
    let mut registry = registry();
    let err = registry
        .register(Session::new("docs", "/tmp").with_aliases(["API"]))
        .unwrap_err();

    match err {
        ConfigError::DuplicateAlias {
            alias,
            existing,
            conflicting,
        } => {
            assert_eq!(alias, "api");
            assert_eq!(existing, "backend");
            assert_eq!(conflicting, "docs");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.resolve("docs"), None);
}

#[test]
fn rejects_duplicate_name() {
    let mut registry = registry();
    let err = registry.register(Session::new("Frontend", "/tmp")).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateName(name) if name == "Frontend"));
}

#[test]
fn fuzzy_match_tolerates_one_edit() {
    let registry = registry();

    assert_eq!(
        registry.resolve_detailed("frontent"),
        Resolution::Fuzzy(SessionId::from("frontend"))
    );
    assert_eq!(
        registry.resolve_detailed("backen"),
        Resolution::Fuzzy(SessionId::from("backend"))
    );
    assert_eq!(registry.resolve_detailed("bakcend"), Resolution::NotFound);
}

#[test]
fn short_tokens_never_match_fuzzily() {
    let registry = registry();
    // "apo" is one edit from "api" but too short
    assert_eq!(registry.resolve_detailed("apo"), Resolution::NotFound);
}

#[test]
fn fuzzy_match_can_be_ambiguous() {
    let mut registry = SessionRegistry::new();
    registry.register(Session::new("docs", "/tmp")).unwrap();
    registry.register(Session::new("dogs", "/tmp")).unwrap();

    assert_eq!(
        registry.resolve_detailed("dots"),
        Resolution::Ambiguous(vec![SessionId::from("docs"), SessionId::from("dogs")])
    );
    assert_eq!(registry.resolve("dots"), None);
}

#[test]
fn fuzzy_matching_can_be_disabled() {
    let mut registry = SessionRegistry::new().with_fuzzy_matching(false);
    registry.register(Session::new("frontend", "/tmp")).unwrap();

    assert_eq!(registry.resolve_detailed("frontent"), Resolution::NotFound);
    assert!(registry.resolve("frontend").is_some());
}

#[test]
fn remove_frees_every_key() {
    let mut registry = registry();
    let removed = registry.remove(&SessionId::from("frontend")).unwrap();
    assert_eq!(removed.name, "frontend");

    assert_eq!(registry.resolve("front"), None);
    assert_eq!(registry.all(), vec![SessionId::from("backend")]);
    registry
        .register(Session::new("web", "/tmp").with_aliases(["front"]))
        .unwrap();
}

#[test]
fn keeps_registration_order_and_status() {
    let mut registry = registry();
    assert_eq!(
        registry.all(),
        vec![SessionId::from("frontend"), SessionId::from("backend")]
    );
    assert_eq!(registry.max_key_words(), 2);

    let id = SessionId::from("backend");
    assert_eq!(registry.set_status(&id, SessionStatus::Busy), Some(SessionStatus::Idle));
    assert!(registry.get(&id).unwrap().is_busy());
}
