use std::sync::mpsc as sync_mpsc;
use tokio::sync::mpsc as async_mpsc;

use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};

use chrono::{DateTime, TimeDelta, Utc};

use reqwest::{Client, Response};

use crate::error::Error;

/// The public Google Logging API
pub const DEFAULT_API_BASE: &str = "https://logging.googleapis.com";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// What travels from the [`CloudLogger`](crate::logger::CloudLogger) to the shipper.
pub(crate) enum Message {
    Write(LogEntry),
    /// Acknowledged once every write queued before it has been shipped
    Flush(sync_mpsc::SyncSender<()>),
}

/// Token caching
#[derive(Default)]
pub struct Token {
    token: Option<String>,
    renew_after: DateTime<Utc>,
}

async fn get_error_response(response: Response, context: String) -> Error {
    let status = response.status();

    let body = match response.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<String>(&bytes) {
            Ok(json) => json,
            Err(_) => String::from_utf8_lossy(&bytes).to_string(),
        },
        Err(e) => format!("could not decode body of HTTP Error response: {e}"),
    };

    Error::HttpResponseError {
        context,
        status,
        body,
    }
}

impl Token {
    fn renew_after_from_expires_in(expires_in: u64) -> DateTime<Utc> {
        let renew_after = TimeDelta::seconds(expires_in.saturating_sub(60) as i64);
        Utc::now() + renew_after
    }

    async fn fetch_access_token(&mut self, client: &Client) -> Result<String, Error> {
        if let Some(token) = &self.token {
            if Utc::now() < self.renew_after {
                return Ok(token.clone());
            }
        }

        let response = client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP GET token credentials from metadata server".to_string(),
                source: e,
            })?;

        if response.status().is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| Error::ShipperReqwestError {
                    context: "consuming response body of access token request".to_string(),
                    source: e,
                })?;
            let token_data: serde_json::Value =
                serde_json::from_str(&body).map_err(|e| Error::ShipperSerializeError {
                    context: "deserializing token data".to_string(),
                    source: e,
                })?;
            let token_str = token_data["access_token"]
                .as_str()
                .ok_or(Error::ShipperTokenNotFound)?
                .to_string();
            let expires_in = token_data["expires_in"]
                .as_u64()
                .ok_or(Error::ShipperTokenExpiryNotFound)?;
            self.token = Some(token_str.clone());
            self.renew_after = Self::renew_after_from_expires_in(expires_in);
            Ok(token_str)
        } else {
            Err(get_error_response(response, "fetching token".to_string()).await)
        }
    }
}

/// A sync to async channel bridge.
/// Forwards messages from the [`CloudLogger`](crate::logger::CloudLogger) to the [`Shipper`],
/// keeping their order.
pub(crate) struct Bridge {
    sync_rx: sync_mpsc::Receiver<Message>,
    async_tx: async_mpsc::Sender<Message>,
}

impl Bridge {
    /// Runs until every sender on the sync side is gone. Must run on a blocking thread.
    pub(crate) fn run_sync_to_async_bridge(self) {
        while let Ok(message) = self.sync_rx.recv() {
            if self.async_tx.blocking_send(message).is_err() {
                eprintln!("Log shipper stopped, log messages are no longer sent to Google Logging");
                break;
            }
        }
    }
}

/// Sends the log messages to the Google Logging API
pub(crate) struct Shipper {
    client: Client,
    token: Token,
    api_base: String,
    log_name: String,
    resource: MonitoredResource,
    batch_size: usize,
    async_rx: async_mpsc::Receiver<Message>,
}

impl Shipper {
    pub(crate) fn new(
        client: Client,
        log_name: String,
        resource: MonitoredResource,
        api_base: String,
        batch_size: usize,
        sync_rx: sync_mpsc::Receiver<Message>,
    ) -> (Bridge, Shipper) {
        let (async_tx, async_rx) = async_mpsc::channel::<Message>(100);

        (
            Bridge { sync_rx, async_tx },
            Shipper {
                client,
                token: Token::default(),
                api_base,
                log_name,
                resource,
                batch_size: batch_size.max(1),
                async_rx,
            },
        )
    }

    async fn send_log_entries(&mut self, token: &str, entries: Vec<LogEntry>) -> Result<(), Error> {
        let url = format!("{}/v2/entries:write", self.api_base);

        let body = WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            resource: Some(self.resource.clone()),
            entries: Some(entries),
            ..Default::default()
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP POST request to the Google Logging API".to_string(),
                source: e,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(get_error_response(
                response,
                "response when sending log entries to Google Logging API".to_string(),
            )
            .await)
        }
    }

    async fn ship(&mut self, entries: Vec<LogEntry>) {
        match self.token.fetch_access_token(&self.client).await {
            Ok(token) => {
                let count = entries.len();
                if let Err(e) = self.send_log_entries(&token, entries).await {
                    eprintln!("Failed to send {} log entries: {}", count, e);
                }
            }
            Err(e) => {
                eprintln!("Failed to fetch access token: {}", e);
            }
        }
    }

    /// The process that receives log entries and sends them to the Google Logging API
    pub(crate) async fn run_log_shipper(mut self) {
        while let Some(message) = self.async_rx.recv().await {
            match message {
                Message::Flush(ack) => {
                    let _ = ack.send(());
                }
                Message::Write(entry) => {
                    let (batch, ack) = collect_batch(entry, &mut self.async_rx, self.batch_size);
                    self.ship(batch).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
            }
        }
    }
}

// Takes `first` plus the writes already queued behind it, up to `max` entries. Stops at a flush
// marker, which is handed back so it can be acknowledged after the batch went out.
fn collect_batch(
    first: LogEntry,
    rx: &mut async_mpsc::Receiver<Message>,
    max: usize,
) -> (Vec<LogEntry>, Option<sync_mpsc::SyncSender<()>>) {
    let mut batch = vec![first];
    while batch.len() < max {
        match rx.try_recv() {
            Ok(Message::Write(entry)) => batch.push(entry),
            Ok(Message::Flush(ack)) => return (batch, Some(ack)),
            Err(_) => break,
        }
    }
    (batch, None)
}
