use std::collections::BTreeMap;

use crate::model::Config;

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let values = [
            ("max_iterations", self.max_iterations.to_string()),
            ("node_timeout", self.node_timeout_secs.to_string()),
            ("on_persistence_error", self.on_persistence_error.to_string()),
            ("lock_ttl_seconds", self.lock_ttl_seconds.to_string()),
            ("state_dir", self.state_dir.to_string()),
            ("verbose", self.verbose.to_string()),
            ("strategy", self.strategy.to_string()),
        ];

        values
            .into_iter()
            .map(|(key, value)| (key.to_string(), (value, self.source_of(key).to_string())))
            .collect()
    }
}
