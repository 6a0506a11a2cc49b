//! Logger configuration knobs, layered in by `themis-config`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Whether field values passed through [`crate::PiiRedactor`] are
    /// actually redacted, or passed through verbatim (tests may disable
    /// this to assert on raw content).
    pub redaction_enabled: bool,
    pub log_level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            log_level: "info".to_string(),
        }
    }
}
