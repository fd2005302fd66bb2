use thiserror;

use reqwest::{self, StatusCode};

/// Boxed cause carried by [`Error::ClientInit`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to create logging client: {0} environment variable unset or missing")]
    MissingConfig(&'static str),
    #[error("Failed to create logging client: {0}")]
    ClientInit(#[source] BoxError),
    #[error("The log shipper has stopped, log entry dropped")]
    ShipperGone,
    #[error("The log buffer is full, log entry dropped")]
    BufferFull,
    #[error("Serde JSON serialization failed with context '{context}'. Error: {source}")]
    ShipperSerializeError {
        context: String,
        source: serde_json::Error,
    },
    #[error("Reqwest error with context '{context}'. Error: {source}")]
    ShipperReqwestError {
        context: String,
        source: reqwest::Error,
    },
    #[error("No 'access_token' found in the metadata server response body")]
    ShipperTokenNotFound,
    #[error("No 'expires_in' found in the metadata server response body")]
    ShipperTokenExpiryNotFound,
    #[error("unsuccessful HTTP response error with context '{context}'. HTTP status code: '{status}', body: '{body}'")]
    HttpResponseError {
        context: String,
        status: StatusCode,
        body: String,
    },
}

impl Error {
    pub(crate) fn client_init<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::ClientInit(err.into())
    }
}
