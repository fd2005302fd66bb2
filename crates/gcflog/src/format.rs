use slog::{Drain, OwnedKVList, Record};
use std::io::{self, Write};
use std::sync::Mutex;

/// Renders a record into the bytes a console drain writes out.
pub trait Format {
    fn format(&self, record: &Record<'_>, values: &OwnedKVList) -> io::Result<Vec<u8>>;
}

/// Formats every record as nothing at all.
///
/// Use it for the console when the [`Hook`](crate::hook::Hook) already ships everything to
/// Google Cloud Logging and the function's stdout would only duplicate it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFormatter;

impl Format for NullFormatter {
    fn format(&self, _record: &Record<'_>, _values: &OwnedKVList) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A drain writing each record, as rendered by its [`Format`], to `out`.
///
/// Empty renderings are not written.
pub struct FormatDrain<F, W> {
    format: F,
    out: Mutex<W>,
}

impl<F, W> FormatDrain<F, W>
where
    F: Format,
    W: Write,
{
    pub fn new(format: F, out: W) -> Self {
        FormatDrain {
            format,
            out: Mutex::new(out),
        }
    }
}

impl<F, W> Drain for FormatDrain<F, W>
where
    F: Format,
    W: Write,
{
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let bytes = self.format.format(record, values)?;
        if bytes.is_empty() {
            return Ok(());
        }
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "console writer lock poisoned"))?;
        out.write_all(&bytes)?;
        out.flush()
    }
}
