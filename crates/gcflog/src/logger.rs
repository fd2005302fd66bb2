use crate::client::{LogClient, LogEntry, Payload};
use crate::error::Error;
use crate::shipper::{self, Message, Shipper};

use google_logging2::api::{LogEntry as GoogleLogEntry, MonitoredResource};

use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

const FLUSH_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Builder for the [`CloudLogger`]
#[derive(Debug)]
pub struct Builder {
    log_name: String,
    resource: MonitoredResource,
    api_base: String,
    buffer_size: usize,
    batch_size: usize,
    request_timeout: Duration,
    flush_timeout: Duration,
}

/// A [`LogClient`] that ships entries to [Google Cloud Logging](https://cloud.google.com/logging).
///
/// Entries are queued on a bounded channel and picked up by a shipper running on its own thread,
/// which batches whatever is queued into a single
/// [`entries:write`](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write) call.
/// Clones share the same shipper. Logging never blocks: an entry that does not fit in the buffer
/// is refused with [`Error::BufferFull`].
#[derive(Clone)]
pub struct CloudLogger {
    sync_tx: Arc<Mutex<SyncSender<Message>>>,
    flush_timeout: Duration,
}

impl Builder {
    /// Creates a Builder object.
    ///
    /// # Parameters
    /// - `log_name`: The `logName` of the write requests, e.g. `projects/my-project/logs/my-log-id`
    /// - `resource`: The [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) every entry is attributed to
    #[must_use = "The builder must be used"]
    pub fn new(log_name: &str, resource: MonitoredResource) -> Self {
        Self {
            log_name: log_name.to_string(),
            resource,
            api_base: shipper::DEFAULT_API_BASE.to_string(),
            buffer_size: 100,
            batch_size: 50,
            request_timeout: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(10),
        }
    }

    /// Sends to another Logging API endpoint than `https://logging.googleapis.com`
    #[must_use = "The builder must be used"]
    pub fn with_api_base(self, api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Sets how many entries may be queued before [`LogClient::log`] refuses new ones. Defaults
    /// to 100.
    #[must_use = "The builder must be used"]
    pub fn with_buffer_size(self, buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..self
        }
    }

    /// Sets the maximum number of entries sent in one request. Defaults to 50.
    #[must_use = "The builder must be used"]
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Sets the timeout of each HTTP request the shipper makes. Defaults to 30 seconds.
    #[must_use = "The builder must be used"]
    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    /// Sets how long [`LogClient::flush`] waits for the shipper. Defaults to 10 seconds.
    #[must_use = "The builder must be used"]
    pub fn with_flush_timeout(self, flush_timeout: Duration) -> Self {
        Self {
            flush_timeout,
            ..self
        }
    }

    /// Starts the shipper on a dedicated thread and returns the logger feeding it.
    ///
    /// The thread ends when the last clone of the returned logger is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientInit`] if the HTTP client, the runtime or the thread could not be
    /// created.
    pub fn connect(self) -> Result<CloudLogger, Error> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(Error::client_init)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::client_init)?;

        let (sync_tx, sync_rx) = sync_channel::<Message>(self.buffer_size);
        let (bridge, shipper) = Shipper::new(
            client,
            self.log_name,
            self.resource,
            self.api_base,
            self.batch_size,
            sync_rx,
        );

        thread::Builder::new()
            .name("gcf-log-shipper".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    // Forward messages from the sync channel to the async channel where the
                    // shipper sends them to Google Cloud Logging
                    let bridge = tokio::task::spawn_blocking(move || {
                        bridge.run_sync_to_async_bridge();
                    });
                    shipper.run_log_shipper().await;
                    let _ = bridge.await;
                })
            })
            .map_err(Error::client_init)?;

        Ok(CloudLogger::from_sender(sync_tx, self.flush_timeout))
    }
}

impl CloudLogger {
    /// Shorthand for [`Builder::new`]
    #[must_use = "The builder must be used"]
    pub fn builder(log_name: &str, resource: MonitoredResource) -> Builder {
        Builder::new(log_name, resource)
    }

    // The lock is only held for a `try_send`, which never waits.
    pub(crate) fn from_sender(sync_tx: SyncSender<Message>, flush_timeout: Duration) -> Self {
        CloudLogger {
            sync_tx: Arc::new(Mutex::new(sync_tx)),
            flush_timeout,
        }
    }

    fn construct_log_entry(entry: LogEntry) -> GoogleLogEntry {
        let (text_payload, json_payload) = match entry.payload {
            Payload::Text(text) => (Some(text), None),
            Payload::Json(map) => (None, Some(map.into_iter().collect())),
        };

        let labels = if entry.labels.is_empty() {
            None
        } else {
            Some(entry.labels)
        };

        // https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry
        GoogleLogEntry {
            text_payload,
            json_payload,
            labels,
            severity: Some(entry.severity.to_string()),
            timestamp: Some(Utc::now()),
            ..Default::default()
        }
    }
}

impl LogClient for CloudLogger {
    fn log(&self, entry: LogEntry) -> Result<(), Error> {
        let message = Message::Write(Self::construct_log_entry(entry));
        let sync_tx = self.sync_tx.lock().map_err(|_| Error::ShipperGone)?;
        sync_tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => Error::BufferFull,
            TrySendError::Disconnected(_) => Error::ShipperGone,
        })
    }

    /// Waits at most the flush timeout in total, queueing the flush marker included.
    fn flush(&self) {
        let deadline = Instant::now() + self.flush_timeout;
        let (ack_tx, ack_rx) = sync_channel::<()>(1);
        let mut marker = Message::Flush(ack_tx);
        loop {
            let sent = match self.sync_tx.lock() {
                Ok(sync_tx) => sync_tx.try_send(marker),
                Err(_) => return,
            };
            match sent {
                Ok(()) => break,
                Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(back)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    thread::sleep(FLUSH_RETRY_INTERVAL.min(deadline - now));
                    marker = back;
                }
            }
        }
        let _ = ack_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    }
}
