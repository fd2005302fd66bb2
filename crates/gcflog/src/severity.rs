use strum::{AsRefStr, Display};

/// The levels of the host logging framework, from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Level {
    /// Every level, in ascending order.
    pub const ALL: [Level; 7] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
    ];

    /// Position of the level in [`Level::ALL`]
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl From<slog::Level> for Level {
    fn from(level: slog::Level) -> Self {
        match level {
            slog::Level::Critical => Level::Fatal,
            slog::Level::Error => Level::Error,
            slog::Level::Warning => Level::Warn,
            slog::Level::Info => Level::Info,
            slog::Level::Debug => Level::Debug,
            slog::Level::Trace => Level::Trace,
        }
    }
}

/// A Google Cloud Logging [LogSeverity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Warning,
    Error,
    Alert,
    Emergency,
}

// Indexed by Level::ordinal
const SEVERITY_TABLE: [Severity; 7] = [
    Severity::Default,
    Severity::Debug,
    Severity::Info,
    Severity::Warning,
    Severity::Error,
    Severity::Alert,
    Severity::Emergency,
];

impl Severity {
    /// Looks up the severity for a level ordinal. Ordinals outside the table map to
    /// [`Severity::Default`].
    pub fn for_ordinal(ordinal: usize) -> Severity {
        SEVERITY_TABLE.get(ordinal).copied().unwrap_or_default()
    }

    pub fn for_level(level: Level) -> Severity {
        Self::for_ordinal(level.ordinal())
    }
}
