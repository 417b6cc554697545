pub mod auth;
pub mod dashboard;
pub mod domain;
pub mod engine;
pub mod llm;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    pub const IDLE_TIMEOUT_KEY: &str = "IDLE_TIMEOUT_SECS";

    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

    // Lookup order per key: first non-empty variable wins.
    const DATABASE_URL_KEYS: &[&str] = &["DATABASE_URL"];
    const STORE_URL_KEYS: &[&str] = &["SUPABASE_URL", "VITE_SUPABASE_URL"];
    const STORE_KEY_KEYS: &[&str] = &["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"];
    const AI_API_KEY_KEYS: &[&str] = &["GEMINI_API_KEY", "API_KEY", "VITE_GEMINI_API_KEY"];
    const SENTRY_DSN_KEYS: &[&str] = &["SENTRY_DSN"];

    /// Keys the dashboard cannot work without. Missing keys are reported at
    /// startup but do not abort the process.
    pub const REQUIRED_KEYS: &[&str] = &[
        "DATABASE_URL",
        "SUPABASE_URL",
        "SUPABASE_ANON_KEY",
        "GEMINI_API_KEY",
    ];

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub store_url: Option<String>,
        pub store_key: Option<String>,
        pub ai_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub idle_timeout: Duration,
        /// Problems found while resolving values; reported by `warn_missing`.
        pub issues: Vec<String>,
    }

    impl Settings {
        pub fn from_env() -> Self {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
            let first = |keys: &[&str]| {
                keys.iter()
                    .filter_map(|k| lookup(*k))
                    .map(|v| v.trim().to_string())
                    .find(|v| !v.is_empty())
            };

            let mut issues = Vec::new();
            let idle_timeout_secs = match lookup(IDLE_TIMEOUT_KEY) {
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs >= 1 => secs,
                    _ => {
                        issues.push(format!(
                            "{IDLE_TIMEOUT_KEY}={raw:?} is not a positive integer; using {DEFAULT_IDLE_TIMEOUT_SECS}"
                        ));
                        DEFAULT_IDLE_TIMEOUT_SECS
                    }
                },
                None => DEFAULT_IDLE_TIMEOUT_SECS,
            };

            Self {
                database_url: first(DATABASE_URL_KEYS),
                store_url: first(STORE_URL_KEYS),
                store_key: first(STORE_KEY_KEYS),
                ai_api_key: first(AI_API_KEY_KEYS),
                sentry_dsn: first(SENTRY_DSN_KEYS),
                idle_timeout: Duration::from_secs(idle_timeout_secs),
                issues,
            }
        }

        pub fn missing_required(&self) -> Vec<&'static str> {
            let present = [
                self.database_url.is_some(),
                self.store_url.is_some(),
                self.store_key.is_some(),
                self.ai_api_key.is_some(),
            ];
            REQUIRED_KEYS
                .iter()
                .zip(present)
                .filter(|(_, ok)| !ok)
                .map(|(k, _)| *k)
                .collect()
        }

        pub fn warn_missing(&self) {
            for key in self.missing_required() {
                tracing::warn!(key, "required configuration missing; dependent features disabled");
            }
            for issue in &self.issues {
                tracing::warn!(issue = %issue, "configuration value ignored");
            }
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_store_url(&self) -> anyhow::Result<&str> {
            self.store_url.as_deref().context("SUPABASE_URL is required")
        }

        pub fn require_store_key(&self) -> anyhow::Result<&str> {
            self.store_key
                .as_deref()
                .context("SUPABASE_ANON_KEY is required")
        }

        pub fn require_ai_api_key(&self) -> anyhow::Result<&str> {
            self.ai_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(pairs: &[(&str, &str)]) -> Settings {
            let env: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Settings::from_lookup(|k| env.get(k).cloned())
        }

        #[test]
        fn falls_back_to_vite_prefixed_names() {
            let s = settings(&[
                ("VITE_SUPABASE_URL", "https://x.supabase.co"),
                ("VITE_SUPABASE_ANON_KEY", "anon"),
                ("API_KEY", "ai"),
            ]);
            assert_eq!(s.store_url.as_deref(), Some("https://x.supabase.co"));
            assert_eq!(s.store_key.as_deref(), Some("anon"));
            assert_eq!(s.ai_api_key.as_deref(), Some("ai"));
        }

        #[test]
        fn primary_name_wins_and_blank_values_are_skipped() {
            let s = settings(&[
                ("GEMINI_API_KEY", "  "),
                ("API_KEY", "second"),
                ("VITE_GEMINI_API_KEY", "third"),
            ]);
            assert_eq!(s.ai_api_key.as_deref(), Some("second"));
        }

        #[test]
        fn reports_missing_required_keys() {
            let s = settings(&[("DATABASE_URL", "postgres://localhost/db")]);
            assert_eq!(
                s.missing_required(),
                vec!["SUPABASE_URL", "SUPABASE_ANON_KEY", "GEMINI_API_KEY"]
            );
            assert!(s.require_ai_api_key().is_err());
            assert_eq!(s.idle_timeout, Duration::from_secs(1800));
        }

        #[test]
        fn malformed_idle_timeout_falls_back_to_default() {
            for raw in ["soon", "0", "-5"] {
                let s = settings(&[("IDLE_TIMEOUT_SECS", raw)]);
                assert_eq!(s.idle_timeout, Duration::from_secs(1800), "{raw}");
                assert_eq!(s.issues.len(), 1);
                assert!(s.issues[0].contains("IDLE_TIMEOUT_SECS"));
            }
            let s = settings(&[("IDLE_TIMEOUT_SECS", " 90 ")]);
            assert_eq!(s.idle_timeout, Duration::from_secs(90));
            assert!(s.issues.is_empty());
        }
    }
}
