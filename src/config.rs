//! Service configuration loaded from environment variables.

use std::path::PathBuf;

use crate::materializer::DedupPolicy;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Database file (from MONEYTRACKER_DB). Falls back to the platform data
    /// directory when unset.
    pub database_path: Option<PathBuf>,
    /// HTTP port (from MONEYTRACKER_PORT)
    pub port: u16,
    /// How generated entries are recognized (from MONEYTRACKER_DEDUP_POLICY)
    pub dedup_policy: DedupPolicy,
    /// Repair the current month on startup (from MONEYTRACKER_CATCH_UP)
    pub catch_up_on_start: bool,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_path = lookup("MONEYTRACKER_DB")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let port = lookup("MONEYTRACKER_PORT")
            .and_then(|s| match s.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("Ignoring invalid MONEYTRACKER_PORT value: {}", s);
                    None
                }
            })
            .unwrap_or(DEFAULT_PORT);

        let dedup_policy = lookup("MONEYTRACKER_DEDUP_POLICY")
            .and_then(|s| {
                let policy = DedupPolicy::from_str(&s.trim().to_lowercase());
                if policy.is_none() {
                    tracing::warn!("Ignoring unknown MONEYTRACKER_DEDUP_POLICY value: {}", s);
                }
                policy
            })
            .unwrap_or_default();

        let catch_up_on_start = lookup("MONEYTRACKER_CATCH_UP")
            .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        Self {
            database_path,
            port,
            dedup_policy,
            catch_up_on_start,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            port: DEFAULT_PORT,
            dedup_policy: DedupPolicy::default(),
            catch_up_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), ServiceConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("MONEYTRACKER_DB", "/tmp/ledger.db"),
            ("MONEYTRACKER_PORT", "8080"),
            ("MONEYTRACKER_DEDUP_POLICY", "Legacy"),
            ("MONEYTRACKER_CATCH_UP", "off"),
        ]);

        assert_eq!(cfg.database_path, Some(PathBuf::from("/tmp/ledger.db")));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.dedup_policy, DedupPolicy::Legacy);
        assert!(!cfg.catch_up_on_start);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("MONEYTRACKER_PORT", "not-a-port"),
            ("MONEYTRACKER_DEDUP_POLICY", "fuzzy"),
            ("MONEYTRACKER_CATCH_UP", "yes"),
        ]);

        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.dedup_policy, DedupPolicy::Identity);
        assert!(cfg.catch_up_on_start);
    }
}
