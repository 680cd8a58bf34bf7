use mealworm_monitor::config::DEFAULT_SERVER_URL;
use mealworm_monitor::settings::{load_settings, save_settings, settings_path, ClientSettings};
use tempfile::TempDir;

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nonexistent.json");
    let settings = load_settings(&path);
    assert!(settings.server_url.is_none());
    assert!(settings.last_farm_id.is_none());
}

#[test]
fn test_load_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "not json at all {{{").unwrap();
    let settings = load_settings(&path);
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let settings = ClientSettings {
        server_url: Some("http://10.0.0.5:5000".to_string()),
        last_farm_id: Some("farm-12".to_string()),
    };

    save_settings(&path, &settings);
    assert_eq!(load_settings(&path), settings);
}

#[test]
fn test_partial_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");

    std::fs::write(&path, r#"{"last_farm_id": "farm-3"}"#).unwrap();
    let loaded = load_settings(&path);

    assert_eq!(loaded.last_farm_id.as_deref(), Some("farm-3"));
    assert!(loaded.server_url.is_none());
}

#[test]
fn test_blank_farm_id_is_not_remembered() {
    let settings = ClientSettings {
        server_url: None,
        last_farm_id: Some("   ".to_string()),
    };
    assert_eq!(settings.remembered_farm_id(), None);
}

#[test]
fn test_server_url_precedence() {
    let saved = ClientSettings {
        server_url: Some("http://saved:5000".to_string()),
        last_farm_id: None,
    };
    assert_eq!(saved.server_url(Some("http://flag:1")), "http://flag:1");
    assert_eq!(saved.server_url(None), "http://saved:5000");
    assert_eq!(ClientSettings::default().server_url(None), DEFAULT_SERVER_URL);
}

#[test]
fn test_settings_path() {
    let path = settings_path();
    assert!(path.ends_with("settings.json"));
}
