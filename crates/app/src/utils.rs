use shared::settings::AppSettings;
use std::path::PathBuf;

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("bible_study");
        p.push("settings.json");
        p
    })
}

/// Load settings from disk or return defaults.
///
/// The flag is false when nothing usable was on disk (first run).
pub fn load_settings_or_default() -> (AppSettings, bool) {
    if let Some(path) = config_path() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<AppSettings>(&contents) {
                Ok(settings) => return (settings, true),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
                }
            }
        }
    }
    (AppSettings::default(), false)
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) {
    if let Some(path) = config_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(settings) {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save settings");
            }
        }
    }
}

/// Directory for the study database: the configured override, else the
/// platform data directory.
pub fn data_dir(settings: &AppSettings) -> PathBuf {
    match settings.data_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => expand_user_path(dir),
        _ => services::SqliteKvStore::default_data_dir(),
    }
}

pub fn expand_user_path(path_str: &str) -> PathBuf {
    if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_app_scoped() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("bible_study/settings.json"));
        }
    }

    #[test]
    fn test_data_dir_override() {
        let settings = AppSettings {
            data_dir: Some("/tmp/study-data".into()),
            ..AppSettings::default()
        };
        assert_eq!(data_dir(&settings), PathBuf::from("/tmp/study-data"));

        let blank = AppSettings {
            data_dir: Some("   ".into()),
            ..AppSettings::default()
        };
        assert_eq!(data_dir(&blank), services::SqliteKvStore::default_data_dir());
    }

    #[test]
    fn test_expand_plain_path_untouched() {
        assert_eq!(expand_user_path("/var/lib/x"), PathBuf::from("/var/lib/x"));
    }
}
