use std::{fs, path::Path, str::FromStr, time::Duration};

use gpio::{DriverKind, LineConfig, PinNumbering};
use serde::Deserialize;
use server_api::{idle::parse_ignore_list, IdleSettings, ServiceOptions};
use shared::protocol::UiSettings;
use tracing::warn;

const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_bind: String,
    pub gpio_driver: DriverKind,
    pub gpio_mode: PinNumbering,
    pub gpio_pin: u8,
    pub gpio_invert: bool,
    pub board_revision: u8,
    pub hardware_timeout_ms: u64,
    pub sense_interval_secs: u64,
    pub enable_power_off_warning_dialog: bool,
    pub power_off_when_idle: bool,
    pub idle_timeout_minutes: u64,
    pub idle_ignore_commands: String,
    pub shutdown_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5050".into(),
            gpio_driver: DriverKind::Rppal,
            gpio_mode: PinNumbering::Board,
            gpio_pin: 0,
            gpio_invert: false,
            board_revision: 3,
            hardware_timeout_ms: 500,
            sense_interval_secs: 10,
            enable_power_off_warning_dialog: true,
            power_off_when_idle: false,
            idle_timeout_minutes: 30,
            idle_ignore_commands: "M105".into(),
            shutdown_command: None,
        }
    }
}

/// Keys accepted in `server.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    bind_addr: Option<String>,
    gpio_driver: Option<DriverKind>,
    gpio_mode: Option<PinNumbering>,
    gpio_pin: Option<u8>,
    gpio_invert: Option<bool>,
    board_revision: Option<u8>,
    hardware_timeout_ms: Option<u64>,
    sense_interval_secs: Option<u64>,
    enable_power_off_warning_dialog: Option<bool>,
    power_off_when_idle: Option<bool>,
    idle_timeout_minutes: Option<u64>,
    idle_ignore_commands: Option<String>,
    shutdown_command: Option<String>,
}

impl Settings {
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            line: LineConfig {
                driver: self.gpio_driver,
                numbering: self.gpio_mode,
                pin: self.gpio_pin,
                invert: self.gpio_invert,
                board_revision: self.board_revision,
                timeout: Duration::from_millis(self.hardware_timeout_ms.max(1)),
            },
            ui: UiSettings {
                enable_power_off_warning_dialog: self.enable_power_off_warning_dialog,
            },
            idle: IdleSettings {
                enabled: self.power_off_when_idle,
                timeout: Duration::from_secs(
                    self.idle_timeout_minutes.max(1).saturating_mul(60),
                ),
                ignore_commands: parse_ignore_list(&self.idle_ignore_commands),
            },
            shutdown_command: self.shutdown_command.clone(),
            broadcast_capacity: BROADCAST_CAPACITY,
        }
    }

    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.bind_addr {
            self.server_bind = v;
        }
        if let Some(v) = file_cfg.gpio_driver {
            self.gpio_driver = v;
        }
        if let Some(v) = file_cfg.gpio_mode {
            self.gpio_mode = v;
        }
        if let Some(v) = file_cfg.gpio_pin {
            self.gpio_pin = v;
        }
        if let Some(v) = file_cfg.gpio_invert {
            self.gpio_invert = v;
        }
        if let Some(v) = file_cfg.board_revision {
            self.board_revision = v;
        }
        if let Some(v) = file_cfg.hardware_timeout_ms {
            self.hardware_timeout_ms = v;
        }
        if let Some(v) = file_cfg.sense_interval_secs {
            self.sense_interval_secs = v;
        }
        if let Some(v) = file_cfg.enable_power_off_warning_dialog {
            self.enable_power_off_warning_dialog = v;
        }
        if let Some(v) = file_cfg.power_off_when_idle {
            self.power_off_when_idle = v;
        }
        if let Some(v) = file_cfg.idle_timeout_minutes {
            self.idle_timeout_minutes = v;
        }
        if let Some(v) = file_cfg.idle_ignore_commands {
            self.idle_ignore_commands = v;
        }
        if let Some(v) = file_cfg.shutdown_command {
            self.shutdown_command = Some(v).filter(|cmd| !cmd.trim().is_empty());
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SERVER_BIND") {
            self.server_bind = v;
        }
        if let Some(v) = env("APP__BIND_ADDR") {
            self.server_bind = v;
        }
        if let Some(v) = env("APP__GPIO_DRIVER") {
            match v.to_ascii_lowercase().as_str() {
                "rppal" => self.gpio_driver = DriverKind::Rppal,
                "simulated" => self.gpio_driver = DriverKind::Simulated,
                other => warn!(value = other, "ignoring unknown APP__GPIO_DRIVER"),
            }
        }
        if let Some(v) = env("APP__GPIO_MODE") {
            match v.to_ascii_uppercase().as_str() {
                "BOARD" => self.gpio_mode = PinNumbering::Board,
                "BCM" => self.gpio_mode = PinNumbering::Bcm,
                other => warn!(value = other, "ignoring unknown APP__GPIO_MODE"),
            }
        }
        parse_env(&env, "APP__GPIO_PIN", &mut self.gpio_pin);
        parse_env(&env, "APP__GPIO_INVERT", &mut self.gpio_invert);
        parse_env(&env, "APP__BOARD_REVISION", &mut self.board_revision);
        parse_env(&env, "APP__HARDWARE_TIMEOUT_MS", &mut self.hardware_timeout_ms);
        parse_env(&env, "APP__SENSE_INTERVAL_SECS", &mut self.sense_interval_secs);
        parse_env(
            &env,
            "APP__ENABLE_POWER_OFF_WARNING_DIALOG",
            &mut self.enable_power_off_warning_dialog,
        );
        parse_env(&env, "APP__POWER_OFF_WHEN_IDLE", &mut self.power_off_when_idle);
        parse_env(&env, "APP__IDLE_TIMEOUT_MINUTES", &mut self.idle_timeout_minutes);
        if let Some(v) = env("APP__IDLE_IGNORE_COMMANDS") {
            self.idle_ignore_commands = v;
        }
        if let Some(v) = env("APP__SHUTDOWN_COMMAND") {
            self.shutdown_command = Some(v).filter(|cmd| !cmd.trim().is_empty());
        }
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = env(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

/// Defaults, then `server.toml` (or the file named by `PSUOFF_CONFIG`), then
/// environment overrides.
pub fn load_settings() -> Settings {
    let path = std::env::var("PSUOFF_CONFIG").unwrap_or_else(|_| "server.toml".into());
    load_settings_from(Path::new(&path), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => settings.apply_file(file_cfg),
            Err(error) => warn!(path = %path.display(), %error, "ignoring invalid settings file"),
        }
    }

    settings.apply_env(env);
    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
