use serde::{Deserialize, Serialize};

use crate::{
    domain::{PsuState, PLUGIN_ID},
    error::ApiError,
};

/// Body of a POST to the plugin endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "getPSUState")]
    GetState,
    #[serde(rename = "turn_psu_off", alias = "turnPSUOff", alias = "turnoffPSU")]
    TurnOff,
}

impl Command {
    /// Parses a raw request body. Anything that is not one of the known
    /// commands becomes an `invalid_command` error.
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        serde_json::from_slice(body).map_err(|e| ApiError::invalid_command(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetState => "getPSUState",
            Self::TurnOff => "turn_psu_off",
        }
    }
}

/// Unsolicited push delivered to every connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMessage {
    pub plugin: String,
    pub data: PsuState,
}

impl PluginMessage {
    pub fn state(state: PsuState) -> Self {
        Self {
            plugin: PLUGIN_ID.to_string(),
            data: state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSettings {
    pub enable_power_off_warning_dialog: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    pub gcode: String,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
