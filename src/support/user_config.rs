//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mhstore.
//
// Mhstore is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public  License as published by  the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mhstore is distributed  in the hope that  it will be useful,  but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Mhstore. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// What to do with a sequence file found in a folder whose messages have all
/// vanished (typically a folder that was deleted and recreated around the
/// store's back).
///
/// Whether such orphaned sequences are stale garbage or intentional state is
/// a policy question, so it lives here rather than being inferred from file
/// presence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Drop sequence members referring to messages that no longer exist on
    /// the next save. The default.
    Prune,
    /// Keep orphaned members across saves as if every sequence were marked
    /// to preserve absent messages.
    Preserve,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        OrphanPolicy::Prune
    }
}

/// The store configuration.
///
/// This is the root of the TOML file stored in "mhstore.toml" wherever the
/// suite keeps its profile, and everything in it can also be supplied by the
/// suite's persistent context via [`ContextSource`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the per-folder sequence definition file.
    pub sequence_file: String,
    /// Name of the per-folder metadata (watermark) file. Doubles as the
    /// advisory lock target.
    pub metadata_file: String,
    /// Upper bound, in milliseconds, on waiting for the folder lock.
    pub lock_timeout_ms: u64,
    pub orphan_sequences: OrphanPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            sequence_file: ".mh_sequences".to_owned(),
            metadata_file: ".mh_folder".to_owned(),
            lock_timeout_ms: 5000,
            orphan_sequences: OrphanPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Load the configuration from the TOML file at `path`.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path).ignore_not_found()?;
        if text.is_empty() {
            return Ok(StoreConfig::default());
        }

        toml::from_str(&text).map_err(|e| Error::BadConfig(e.to_string()))
    }

    /// Derive the configuration from the suite's persistent context,
    /// falling back to defaults for keys the context does not define.
    pub fn from_context(context: &impl ContextSource) -> Self {
        let mut config = StoreConfig::default();
        if let Some(name) = context.lookup("mh-sequences") {
            config.sequence_file = name;
        }
        if let Some(name) = context.lookup("mh-folder-meta") {
            config.metadata_file = name;
        }
        if let Some(ms) =
            context.lookup("lock-timeout-ms").and_then(|s| s.parse().ok())
        {
            config.lock_timeout_ms = ms;
        }
        if let Some(policy) = context.lookup("orphan-sequences") {
            if policy.eq_ignore_ascii_case("preserve") {
                config.orphan_sequences = OrphanPolicy::Preserve;
            }
        }
        config
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// The suite's external persistent key-value context (current folder,
/// default sequence names, protection bits).
///
/// The store never owns that context; it only queries it.
pub trait ContextSource {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl ContextSource for std::collections::HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let root = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::load(root.path().join("nx.toml")).unwrap();
        assert_eq!(".mh_sequences", config.sequence_file);
        assert_eq!(OrphanPolicy::Prune, config.orphan_sequences);
    }

    #[test]
    fn file_overrides_defaults() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("mhstore.toml");
        std::fs::write(
            &path,
            "sequence_file = \".sequences\"\n\
             orphan_sequences = \"preserve\"\n",
        )
        .unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(".sequences", config.sequence_file);
        assert_eq!(".mh_folder", config.metadata_file);
        assert_eq!(OrphanPolicy::Preserve, config.orphan_sequences);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("mhstore.toml");
        std::fs::write(&path, "sequence_file = [").unwrap();

        assert_matches!(Err(Error::BadConfig(_)), StoreConfig::load(&path));
    }

    #[test]
    fn context_lookup_overrides_defaults() {
        let mut context = HashMap::new();
        context.insert("mh-sequences".to_owned(), ".seq".to_owned());
        context.insert("lock-timeout-ms".to_owned(), "250".to_owned());

        let config = StoreConfig::from_context(&context);
        assert_eq!(".seq", config.sequence_file);
        assert_eq!(Duration::from_millis(250), config.lock_timeout());
        assert_eq!(".mh_folder", config.metadata_file);
    }
}
