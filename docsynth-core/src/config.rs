use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::discovery::PRIMARY_CONTAINER;

/// Settings the core pipeline needs. Secrets never live here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Server-relative path of the site, e.g. `/sites/team`.
    pub site_path: String,
    /// Container used when a caller does not name one.
    #[serde(default = "default_container")]
    pub default_container: String,
}

fn default_container() -> String {
    PRIMARY_CONTAINER.to_string()
}

impl SynthesisConfig {
    pub fn new(site_path: impl Into<String>) -> Self {
        Self {
            site_path: site_path.into(),
            default_container: default_container(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            site_path = %self.site_path,
            default_container = %self.default_container,
            "Loaded SynthesisConfig"
        );
        debug!(?self, "SynthesisConfig loaded (full debug)");
    }
}
