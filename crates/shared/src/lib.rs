pub mod error;
pub mod events;
pub mod result;
pub mod study;
pub mod tabs;

pub use error::{Result, StudyError};
pub use study::{KnowledgeLevel, Language, StudyItem, StudyMode};

pub mod settings {
    use serde::{Deserialize, Serialize};

    use crate::study::{KnowledgeLevel, Language};

    /// Default bound for the result cache and the history log
    pub const DEFAULT_CAPACITY: usize = 50;

    fn default_capacity() -> usize {
        DEFAULT_CAPACITY
    }

    /// One generation-service endpoint, tried in list order
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GenerationEndpoint {
        pub name: String,
        pub base_url: String, // e.g., "http://localhost:8787"
        #[serde(default)]
        pub api_key: Option<String>,
    }

    /// Number of sessions each guided curriculum defines
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CurriculumSettings {
        pub beginner_sessions: u32,
        pub intermediate_sessions: u32,
        pub advanced_sessions: u32,
    }

    impl CurriculumSettings {
        /// Always at least one, since starting a plan fetches its first session.
        pub fn sessions_for(&self, level: KnowledgeLevel) -> u32 {
            let configured = match level {
                KnowledgeLevel::Beginner => self.beginner_sessions,
                KnowledgeLevel::Intermediate => self.intermediate_sessions,
                KnowledgeLevel::Advanced => self.advanced_sessions,
            };
            configured.max(1)
        }
    }

    impl Default for CurriculumSettings {
        fn default() -> Self {
            Self {
                beginner_sessions: 4,
                intermediate_sessions: 6,
                advanced_sessions: 8,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        /// Language used when no preference has been stored yet
        #[serde(default)]
        pub language: Language,
        #[serde(default = "default_capacity")]
        pub cache_capacity: usize,
        #[serde(default = "default_capacity")]
        pub history_capacity: usize,
        #[serde(default)]
        pub endpoints: Vec<GenerationEndpoint>,
        /// Overrides the platform data directory for the study database
        #[serde(default)]
        pub data_dir: Option<String>,
        /// JSON file with the canonical book/chapter/verse table
        #[serde(default)]
        pub reference_table_path: Option<String>,
        #[serde(default)]
        pub curriculum: CurriculumSettings,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                language: Language::English,
                cache_capacity: DEFAULT_CAPACITY,
                history_capacity: DEFAULT_CAPACITY,
                endpoints: vec![GenerationEndpoint {
                    name: "local".into(),
                    base_url: "http://localhost:8787".into(),
                    api_key: None,
                }],
                data_dir: None,
                reference_table_path: None,
                curriculum: CurriculumSettings::default(),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_partial_settings_fill_defaults() {
            let settings: AppSettings = serde_json::from_str(r#"{"language":"spanish"}"#).unwrap();
            assert_eq!(settings.language, Language::Spanish);
            assert_eq!(settings.cache_capacity, DEFAULT_CAPACITY);
            assert_eq!(settings.curriculum.sessions_for(KnowledgeLevel::Beginner), 4);
            assert!(settings.endpoints.is_empty());
        }

        #[test]
        fn test_zero_session_curriculum_clamped() {
            let settings: AppSettings =
                serde_json::from_str(r#"{"curriculum":{"beginner_sessions":0,"intermediate_sessions":3,"advanced_sessions":0}}"#)
                    .unwrap();
            assert_eq!(settings.curriculum.sessions_for(KnowledgeLevel::Beginner), 1);
            assert_eq!(settings.curriculum.sessions_for(KnowledgeLevel::Intermediate), 3);
            assert_eq!(settings.curriculum.sessions_for(KnowledgeLevel::Advanced), 1);
        }
    }
}
