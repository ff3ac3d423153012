use std::path::Path;
use std::time::Duration;

use ev_board::config::loader::load_config;
use ev_board::config::types::AppConfig;
use ev_board::types::{EntityType, FilterValue, SortDirection, Sorting};

#[test]
fn parse_minimal_config() {
    let toml = r#"
[[screens]]
title = "Sites"
endpoint = "sites"
"#;
    let config: AppConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.screens.len(), 1);
    assert_eq!(config.screens[0].title, "Sites");
    assert_eq!(config.screens[0].endpoint, "sites");
    assert!(config.screens[0].topics().is_empty());
}

#[test]
fn default_config_has_sane_defaults() {
    let config = AppConfig::default();
    assert!(config.screens.is_empty());
    assert_eq!(config.defaults.page_size, 50);
    assert_eq!(config.defaults.poll_interval_secs, 0);
    assert_eq!(config.defaults.search_debounce_ms, 300);
    assert_eq!(config.defaults.notification_coalesce_ms, 500);
    assert!(!config.defaults.report_silent_errors);
    assert_eq!(config.backend.timeout_secs, 30);
    assert!(config.backend.token.is_none());
}

#[test]
fn parse_defaults_partially() {
    let toml = r#"
[defaults]
page_size = 20
report_silent_errors = true
"#;
    let config: AppConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.defaults.page_size, 20);
    assert!(config.defaults.report_silent_errors);
    assert_eq!(config.defaults.search_debounce_ms, 300);
}

#[test]
fn entity_topic_is_subscribed_unless_topics_are_listed() {
    let toml = r#"
[[screens]]
title = "Sites"
endpoint = "sites"
entity = "site"

[[screens]]
title = "Site areas"
endpoint = "site-areas"
entity = "site-area"
topics = ["site-area", "site"]
"#;
    let config: AppConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.screens[0].topics(), vec![EntityType::Site]);
    assert_eq!(
        config.screens[1].topics(),
        vec![EntityType::SiteArea, EntityType::Site]
    );
}

#[test]
fn unknown_entity_type_fails() {
    let toml = r#"
[[screens]]
title = "Chargers"
endpoint = "chargers"
entity = "charger"
"#;
    assert!(toml::from_str::<AppConfig>(toml).is_err());
}

#[test]
fn screen_overrides_win_over_defaults() {
    let config = load_config(Some(Path::new("tests/fixtures/config.toml"))).unwrap();

    let stations = config.screen("charging stations").unwrap();
    let options = stations.table_options(&config.defaults);
    assert_eq!(options.page_size, 25);
    assert_eq!(options.poll_interval, None, "0 disables polling");
    assert_eq!(options.search_debounce, Duration::from_millis(250));
    assert_eq!(options.topics, vec![EntityType::ChargingStation]);
    assert_eq!(stations.verbs, vec!["reset", "clearcache"]);

    let sessions = config.screen("Sessions").unwrap();
    let options = sessions.table_options(&config.defaults);
    assert_eq!(options.page_size, 100);
    assert_eq!(options.poll_interval, Some(Duration::from_secs(60)));
    assert_eq!(
        sessions.sorting().unwrap(),
        Some(Sorting::new("timestamp", SortDirection::Desc))
    );
}

#[test]
fn static_filters_keep_order_and_shape() {
    let config = load_config(Some(Path::new("tests/fixtures/config.toml"))).unwrap();
    let sessions = config.screen("Sessions").unwrap();
    let keys: Vec<&str> = sessions.static_filters.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["WithUser", "Status"]);
    assert_eq!(sessions.static_filters["WithUser"], FilterValue::single("true"));
    assert_eq!(
        sessions.static_filters["Status"].to_query_value().as_deref(),
        Some("Completed|Stopped")
    );
}

#[test]
fn load_fixture() {
    let config = load_config(Some(Path::new("tests/fixtures/config.toml"))).unwrap();
    assert_eq!(config.backend.base_url, "https://back-office.example.com/v1/api");
    assert_eq!(config.backend.timeout_secs, 10);
    assert_eq!(config.screens.len(), 2);
}

#[test]
fn unknown_keys_in_fixture_tolerated() {
    let config = load_config(Some(Path::new("tests/fixtures/unknown_keys.toml"))).unwrap();
    assert_eq!(config.screens.len(), 1);
    assert_eq!(config.screens[0].entity, Some(EntityType::Site));
}

#[test]
fn invalid_toml_produces_error() {
    let result = load_config(Some(Path::new("tests/fixtures/invalid_toml.toml")));
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("parsing TOML"), "got: {err}");
    assert!(err.contains("invalid_toml.toml"), "got: {err}");
}

#[test]
fn missing_config_file_produces_error() {
    let result = load_config(Some(Path::new("tests/fixtures/nonexistent.toml")));
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("reading"), "got: {err}");
}

#[test]
fn duplicate_titles_are_rejected_case_insensitively() {
    let result = load_config(Some(Path::new("tests/fixtures/duplicate_titles.toml")));
    let err = result.unwrap_err().to_string();
    assert!(err.contains("duplicate screen title"), "got: {err}");
}

#[test]
fn invalid_screens_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let cases = [
        ("bad_sort", "title = \"Sites\"\nendpoint = \"sites\"\nsort = \"name:sideways\"", "invalid sort"),
        ("empty_endpoint", "title = \"Sites\"\nendpoint = \" \"", "endpoint must not be empty"),
        ("zero_page", "title = \"Sites\"\nendpoint = \"sites\"\npage_size = 0", "page_size"),
        ("reserved_verb", "title = \"Sites\"\nendpoint = \"sites\"\nverbs = [\"delete\"]", "verb"),
    ];
    for (name, screen, expected) in cases {
        let path = dir.path().join(format!("{name}.toml"));
        std::fs::write(&path, format!("[[screens]]\n{screen}\n")).unwrap();
        let err = load_config(Some(&path)).unwrap_err().to_string();
        assert!(err.contains(expected), "{name}: got {err}");
    }
}

#[test]
fn config_flag_overrides_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.toml");
    std::fs::write(
        &path,
        "[[screens]]\ntitle = \"Users\"\nendpoint = \"users\"\nentity = \"user\"\n",
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.screens.len(), 1);
    assert_eq!(config.screens[0].title, "Users");
}
