use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use shared::{
    domain::PsuState,
    error::{ApiError, ApiException, ErrorCode},
    protocol::{Ack, Command, UiSettings},
};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "psuctl", about = "Query and switch off the printer PSU")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:5050")]
    url: Url,
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the current PSU state.
    State,
    /// Switch the PSU off.
    Off {
        /// Confirm when the service asks for a power-off warning.
        #[arg(long)]
        yes: bool,
    },
    /// Print the settings the UI reads.
    Settings,
    /// Poll the state and print every change.
    Watch {
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
}

struct PsuClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl PsuClient {
    fn new(base: &Url) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: plugin_endpoint(base)?,
        })
    }

    async fn command<T: DeserializeOwned>(&self, command: Command) -> Result<T> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&command)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?;
        decode(response).await
    }

    async fn state(&self) -> Result<PsuState> {
        self.command(Command::GetState).await
    }

    async fn turn_off(&self) -> Result<Ack> {
        self.command(Command::TurnOff).await
    }

    async fn settings(&self) -> Result<UiSettings> {
        let url = self.endpoint.join("psuoff/settings")?;
        let response = self.http.get(url).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let error = response
        .json::<ApiError>()
        .await
        .unwrap_or_else(|_| ApiError::new(ErrorCode::Internal, status.to_string()));
    Err(ApiException::from(error).into())
}

/// Resolves the plugin endpoint below `base`, keeping any path prefix.
fn plugin_endpoint(base: &Url) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("api/plugin/psuoff")?)
}

fn describe(state: PsuState) -> &'static str {
    match (state.has_gpio, state.is_on) {
        (false, _) => "unknown (no gpio)",
        (true, true) => "on",
        (true, false) => "off",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = PsuClient::new(&cli.url)?;

    match cli.command {
        Action::State => {
            let state = client.state().await?;
            println!("psu {}", describe(state));
        }
        Action::Off { yes } => {
            let settings = client.settings().await?;
            if settings.enable_power_off_warning_dialog && !yes {
                bail!("You are about to turn off the PSU. Re-run with --yes to proceed.");
            }
            client.turn_off().await?;
            println!("turn off requested");
        }
        Action::Settings => {
            let settings = client.settings().await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Action::Watch { interval_secs } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            let mut last = None;
            loop {
                ticker.tick().await;
                match client.state().await {
                    Ok(state) if last != Some(state) => {
                        println!("psu {}", describe(state));
                        last = Some(state);
                    }
                    Ok(_) => {}
                    Err(error) => eprintln!("{error:#}"),
                }
            }
        }
    }

    Ok(())
}
