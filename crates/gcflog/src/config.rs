use crate::error::Error;

use google_logging2::api::MonitoredResource;
use std::collections::HashMap;
use std::env;

/// Environment variable holding the Google Cloud project
pub const GCP_PROJECT: &str = "GCP_PROJECT";
/// Environment variable holding the name of the running function
pub const FUNCTION_NAME: &str = "FUNCTION_NAME";
/// Environment variable holding the region the function is deployed in
pub const FUNCTION_REGION: &str = "FUNCTION_REGION";

/// The monitored resource type of Cloud Functions
pub const RESOURCE_TYPE: &str = "cloud_function";

/// The log every Cloud Function writes to, URL encoded as required in a `logName`.
pub const LOG_ID: &str = "cloudfunctions.googleapis.com%2Fcloud-functions";

/// The resolved settings a [`Hook`](crate::hook::Hook) is created from.
///
/// Values are taken as given. Use [`Config::from_env`] to pick them up from the standard
/// Cloud Functions environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub project: String,
    pub function_name: String,
    pub region: String,
}

impl Config {
    pub fn new<Str>(project: Str, function_name: Str, region: Str) -> Self
    where
        Str: Into<String>,
    {
        Config {
            project: project.into(),
            function_name: function_name.into(),
            region: region.into(),
        }
    }

    /// Reads `GCP_PROJECT`, `FUNCTION_NAME` and `FUNCTION_REGION`. Unset variables become empty
    /// values and are reported by [`Config::validate`].
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            project: lookup(GCP_PROJECT).unwrap_or_default(),
            function_name: lookup(FUNCTION_NAME).unwrap_or_default(),
            region: lookup(FUNCTION_REGION).unwrap_or_default(),
        }
    }

    /// Checks that all three values are present, in the order project, function name, region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] naming the first variable that is empty.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            (GCP_PROJECT, &self.project),
            (FUNCTION_NAME, &self.function_name),
            (FUNCTION_REGION, &self.region),
        ];
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(Error::MissingConfig(name)),
            None => Ok(()),
        }
    }

    /// The [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource)
    /// attached to every entry shipped for this function.
    pub fn resource(&self) -> MonitoredResource {
        MonitoredResource {
            type_: Some(RESOURCE_TYPE.to_string()),
            labels: Some(HashMap::from([
                ("region".to_string(), self.region.clone()),
                ("function_name".to_string(), self.function_name.clone()),
            ])),
        }
    }

    pub fn log_name(&self) -> String {
        format!("projects/{}/logs/{}", self.project, LOG_ID)
    }
}
