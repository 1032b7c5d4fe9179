use std::time::Duration;

use secrecy::Secret;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::api_client::ApiClient;
use crate::load::{ActionWeights, LoadPlan};
use crate::mock_controller::MockDependencyController;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub mock: MockSettings,
    pub load: LoadSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(self.base_url.clone(), self.api_key.clone(), self.timeout())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct MockSettings {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub admin_timeout_milliseconds: u64,
}

impl MockSettings {
    pub fn controller(&self) -> MockDependencyController {
        MockDependencyController::new(
            self.base_url.clone(),
            Duration::from_millis(self.admin_timeout_milliseconds),
        )
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct LoadSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub actors: u32,
    pub spawn_rate_per_second: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub duration_seconds: u64,
    pub weights: WeightSettings,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub transport_retries: u32,
    /// The p95 latency bound the load binary enforces, per action type.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub p95_bound_milliseconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct WeightSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub login: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub action: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub logout: u32,
}

impl LoadSettings {
    /// Rejects weight combinations that would leave an authenticated actor
    /// with nothing to draw, instead of letting an actor task discover
    /// that mid-run.
    pub fn plan(&self) -> Result<LoadPlan, String> {
        let weights = ActionWeights {
            login: self.weights.login,
            action: self.weights.action,
            logout: self.weights.logout,
        };
        weights.validate()?;
        Ok(LoadPlan {
            actors: self.actors,
            spawn_rate_per_second: self.spawn_rate_per_second,
            duration: Duration::from_secs(self.duration_seconds),
            weights,
            transport_retries: self.transport_retries,
            seed: None,
        })
    }

    pub fn p95_bound(&self) -> Duration {
        Duration::from_millis(self.p95_bound_milliseconds)
    }
}

/// The possible runtime environments for the harness.
pub enum Environment {
    Local,
    Docker,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Docker => "docker",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "docker" => Ok(Self::Docker),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local` or `docker`."
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment. Default to `local` if unspecified.
    let environment: Environment = std::env::var("HARNESS_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());
    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Settings from environment variables (with a prefix of HARNESS and
        // '__' as separator), e.g. `HARNESS_API__BASE_URL`. This is how the
        // compose topology injects service addresses.
        .add_source(
            config::Environment::with_prefix("HARNESS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
