use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity the push channel tags every message with.
pub const PLUGIN_ID: &str = "psuoff";

/// Last confirmed power state of the supply.
///
/// When `has_gpio` is false the pin was never claimed and `is_on` carries no
/// information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PsuState {
    #[serde(rename = "hasGPIO")]
    pub has_gpio: bool,
    #[serde(rename = "isOn")]
    pub is_on: bool,
}

impl PsuState {
    pub fn without_gpio() -> Self {
        Self {
            has_gpio: false,
            is_on: false,
        }
    }

    pub fn with_gpio(is_on: bool) -> Self {
        Self {
            has_gpio: true,
            is_on,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
