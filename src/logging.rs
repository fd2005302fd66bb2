use crate::args;

use args::Args;
use hyper::Request;
use slog::{
    error, info, o, Drain, Duplicate, Level, Logger, Never, OwnedKVList, Record,
    SendSyncRefUnwindSafeDrain,
};
use slog_async::Async;
use slog_gcf::format::{FormatDrain, NullFormatter};
use slog_gcf::hook::Hook;
use slog_term::{CompactFormat, TermDecorator};
use std::sync::Arc;
use std::{fmt::Display, io, result::Result};

type SharedDrain = Arc<dyn SendSyncRefUnwindSafeDrain<Ok = (), Err = Never>>;

#[derive(Clone)]
struct FallbackToStderr<D: Drain> {
    drain: D,
}

impl<D: Drain> Drain for FallbackToStderr<D>
where
    D::Err: Display,
{
    type Ok = ();
    type Err = ();
    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), ()> {
        if let Err(err) = self.drain.log(record, logger_values) {
            eprint!("A drain could not log to its destination: {}", err);
        }
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: Level) -> bool {
        self.drain.is_enabled(level)
    }
}

/// The loggers of the service: a process wide root logger, and per request loggers that carry
/// the request's execution ID to Google Cloud Logging.
pub struct Logging {
    pub root: Logger,
    min_log_level: Level,
    console: SharedDrain,
    hook: Option<Arc<Hook>>,
}

impl Logging {
    /// A logger for one request, with the hook it ships through when shipping is configured.
    /// Flush that hook before answering the request.
    pub fn request_logger<B>(&self, req: &Request<B>) -> (Logger, Option<Arc<Hook>>) {
        match &self.hook {
            Some(hook) => {
                let scoped = Arc::new(hook.for_request(req));
                let drain = Duplicate::new(scoped.clone(), self.console.clone())
                    .filter_level(self.min_log_level)
                    .fuse();
                (Logger::root(drain, o!()), Some(scoped))
            }
            None => (self.root.new(o!()), None),
        }
    }

    /// Blocks until everything shipped through the process wide hook is delivered.
    pub fn flush(&self) {
        if let Some(hook) = &self.hook {
            hook.flush();
        }
    }
}

fn min_log_level(args: &Args) -> Result<Level, String> {
    let min_log_level = match args.verbose {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    Ok(match &args.log_level {
        Some(level) => match level
            .parse::<args::LogLevelType>()
            .map_err(|e| format!("invalid log level '{}': {}", level, e))?
        {
            args::LogLevelType::Error => Level::Error,
            args::LogLevelType::Warn => Level::Warning,
            args::LogLevelType::Info => Level::Info,
            args::LogLevelType::Debug => Level::Debug,
            args::LogLevelType::Trace => Level::Trace,
        },
        None => min_log_level,
    })
}

fn term_drain() -> SharedDrain {
    let decorator = TermDecorator::new().force_color().build();
    let term_drain = CompactFormat::new(decorator).build().fuse();
    Arc::new(Async::new(term_drain).build().fuse())
}

// Nothing reaches stdout: Cloud Functions would pick it up as a second copy of each entry.
fn null_drain() -> SharedDrain {
    let drain = FormatDrain::new(NullFormatter, io::stdout())
        .map(|drain| FallbackToStderr { drain })
        .fuse();
    Arc::new(drain)
}

pub fn create_logging(args: &Args) -> Result<Logging, String> {
    let min_log_level = min_log_level(args)?;

    let mut err: Option<String> = None;
    let hook = match Hook::new(&args.logging_config()) {
        Ok(hook) => Some(Arc::new(hook)),
        Err(e) => {
            err = Some(e.to_string());
            None
        }
    };

    let console = match (&hook, args.local_log) {
        (Some(_), false) => null_drain(),
        _ => term_drain(),
    };

    let drain: SharedDrain = match &hook {
        Some(hook) => Arc::new(
            Duplicate::new(hook.clone(), console.clone())
                .filter_level(min_log_level)
                .fuse(),
        ),
        None => Arc::new(console.clone().filter_level(min_log_level).fuse()),
    };

    let root = Logger::root(drain, o!());
    let log = root.new(o!());
    match &err {
        Some(err_str) => error!(log, "Continuing only with terminal logger: {}", err_str),
        None => info!(log, "Shipping logs to Google Cloud Logging"),
    }

    Ok(Logging {
        root,
        min_log_level,
        console,
        hook,
    })
}
