//! Facade configuration model

use serde::{Deserialize, Serialize};
use validator::Validate;

use contracts::MeasurementKind;
use observability::ObservabilityConfig;

/// Complete facade configuration
///
/// Every section is optional; missing values take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FacadeConfig {
    /// Server connection
    #[validate(nested)]
    pub network: NetworkSection,

    /// Dispatch policy overrides
    #[validate(nested)]
    pub dispatch: DispatchSection,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NetworkSection {
    /// Port used for `host` addresses without `:port`
    #[validate(range(min = 1))]
    pub default_port: u16,

    /// Largest document accepted from the server, in bytes
    #[validate(range(min = 1024, max = 1_073_741_824))]
    pub max_frame_length: usize,

    /// Per-address connect timeout
    #[validate(range(min = 1, max = 300_000))]
    pub connect_timeout_ms: u64,

    /// How long disconnecting may spend writing queued documents
    #[validate(range(max = 60_000))]
    pub flush_timeout_ms: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            default_port: 3000,
            max_frame_length: 8 * 1024 * 1024,
            connect_timeout_ms: 5_000,
            flush_timeout_ms: 2_000,
        }
    }
}

/// `[dispatch]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DispatchSection {
    /// Per-kind overrides applied over the built-in defaults
    #[validate(nested)]
    pub policies: Vec<PolicyOverride>,
}

/// One `[[dispatch.policies]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PolicyOverride {
    /// Measurement kind, e.g. `"image"` or `"pose"`
    pub kind: MeasurementKind,

    /// Pending events kept per receiving port; absent means unbounded
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_queue_length: Option<usize>,
}
