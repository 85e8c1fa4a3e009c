// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::collections::HashMap;

const ALIAS_ENV_PREFIX: &str = "SRC_ALIAS_";

/// Administrator-supplied rewrites of raw source identifiers to canonical
/// short tags. Read-only after startup; absent entries pass through.
#[derive(Debug, Clone, Default)]
pub struct SourceAliasTable {
    map: HashMap<String, String>,
}

impl SourceAliasTable {
    /// Load aliases from `SRC_ALIAS_<rawtag>=<canonical>` environment keys.
    pub fn from_env() -> Self {
        let map = std::env::vars()
            .filter_map(|(key, value)| {
                let raw = key.strip_prefix(ALIAS_ENV_PREFIX)?;
                if raw.is_empty() || value.trim().is_empty() {
                    return None;
                }
                Some((raw.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { map }
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            map: entries.into_iter().collect(),
        }
    }

    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        self.map.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
