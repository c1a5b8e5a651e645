//! Configuration loading and representation.

use std::collections::BTreeSet;

use thiserror::Error;

use procura_purchasing::AccountId;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ORDER_PREFIX: &str = "PO";
pub const DEFAULT_ACCOUNTS: [&str; 5] = [
    "petty_cash",
    "hay_money",
    "steers_money",
    "afes",
    "donors_money",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid account id '{value}'")]
    InvalidAccount { var: &'static str, value: String },

    #[error("{var}: at least one disbursement account is required")]
    EmptyCatalog { var: &'static str },

    #[error("{var}: must not be blank")]
    Blank { var: &'static str },
}

/// Runtime configuration of the procurement service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcurementConfig {
    pub bind_addr: String,
    /// Disbursement accounts that may be marked eligible, approved or paid from.
    pub accounts: BTreeSet<AccountId>,
    pub order_prefix: String,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            accounts: DEFAULT_ACCOUNTS
                .iter()
                .filter_map(|a| AccountId::new(*a).ok())
                .collect(),
            order_prefix: DEFAULT_ORDER_PREFIX.to_string(),
        }
    }
}

impl ProcurementConfig {
    /// Load from `PROCURA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(addr) = lookup("PROCURA_BIND_ADDR") {
            let addr = addr.trim();
            if addr.is_empty() {
                return Err(ConfigError::Blank {
                    var: "PROCURA_BIND_ADDR",
                });
            }
            cfg.bind_addr = addr.to_string();
        }

        if let Some(raw) = lookup("PROCURA_ACCOUNTS") {
            cfg.accounts = parse_accounts(&raw)?;
        }

        if let Some(prefix) = lookup("PROCURA_ORDER_PREFIX") {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(ConfigError::Blank {
                    var: "PROCURA_ORDER_PREFIX",
                });
            }
            cfg.order_prefix = prefix.to_string();
        }

        Ok(cfg)
    }
}

fn parse_accounts(raw: &str) -> Result<BTreeSet<AccountId>, ConfigError> {
    let accounts = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            AccountId::new(s).map_err(|_| ConfigError::InvalidAccount {
                var: "PROCURA_ACCOUNTS",
                value: s.to_string(),
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    if accounts.is_empty() {
        return Err(ConfigError::EmptyCatalog {
            var: "PROCURA_ACCOUNTS",
        });
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_cover_the_five_accounts() {
        let cfg = ProcurementConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.order_prefix, "PO");
        assert_eq!(cfg.accounts.len(), 5);
        assert!(cfg.accounts.contains(&AccountId::new("hay_money").unwrap()));
    }

    #[test]
    fn accounts_are_parsed_from_a_comma_list() {
        let cfg = ProcurementConfig::from_lookup(lookup(&[(
            "PROCURA_ACCOUNTS",
            " petty_cash, grants ,",
        )]))
        .unwrap();
        let names: Vec<_> = cfg.accounts.iter().map(|a| a.as_str().to_string()).collect();
        assert_eq!(names, vec!["grants", "petty_cash"]);
    }

    #[test]
    fn malformed_or_empty_catalog_is_rejected() {
        let err = ProcurementConfig::from_lookup(lookup(&[("PROCURA_ACCOUNTS", "Petty Cash")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAccount { .. }));

        let err = ProcurementConfig::from_lookup(lookup(&[("PROCURA_ACCOUNTS", " , ")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::EmptyCatalog {
                var: "PROCURA_ACCOUNTS"
            }
        );
    }

    #[test]
    fn blank_prefix_is_rejected() {
        let err = ProcurementConfig::from_lookup(lookup(&[("PROCURA_ORDER_PREFIX", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Blank { .. }));
    }
}
