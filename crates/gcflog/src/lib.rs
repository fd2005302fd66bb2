//! A [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) that ships the logs of a
//! [Google Cloud Function](https://cloud.google.com/functions) to [Google Cloud Logging](https://cloud.google.com/logging).
//!
//! # Usage
//!
//! Warning: the shipper authenticates through the metadata server, so entries are only delivered
//! when running on Google Cloud.
//!
//! Create a [`Hook`](hook::Hook) from a [`Config`](config::Config), once per process with
//! [`Hook::new`](hook::Hook::new) or per incoming request with
//! [`Hook::new_for_request`](hook::Hook::new_for_request). The latter labels every entry with the
//! `Function-Execution-Id` of the request so all logs of one invocation can be found together.
//!
//! ```no_run
//! use slog::{info, o, Drain};
//! use slog_gcf::config::Config;
//! use slog_gcf::hook::Hook;
//!
//! let config = Config::from_env();
//! let hook = std::sync::Arc::new(Hook::new(&config).unwrap());
//!
//! let log = slog::Logger::root(hook.clone().fuse(), o!());
//! info!(log, "Hello from {}", config.function_name);
//!
//! // Deliver everything before the function returns
//! hook.flush();
//! ```
//!
//! Severities follow the level of each record, see [`severity`]. To keep the function's own
//! console quiet while shipping, log to the console through a
//! [`FormatDrain`](format::FormatDrain) with the [`NullFormatter`](format::NullFormatter).

/// The entries handed to a logging backend and the client trait delivering them
pub mod client;

/// Where the hook ships to
pub mod config;

/// Error types
pub mod error;

/// Console formatting, including the formatter that prints nothing
pub mod format;

/// The [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) forwarding entries to a [`LogClient`](client::LogClient)
pub mod hook;

/// The Google Cloud Logging client
pub mod logger;

/// Host levels and the Google severities they map to
pub mod severity;

mod shipper;

pub use shipper::DEFAULT_API_BASE;
