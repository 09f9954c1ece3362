use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Sends every formatted line to stdout and, when configured, to a plain-text log file.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    pub file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

pub(crate) struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            let text = String::from_utf8_lossy(buf);
            let plain = console::strip_ansi_codes(&text);
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            file.write_all(plain.as_bytes())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()?;
        if let Some(file) = &self.file {
            file.lock().unwrap_or_else(|e| e.into_inner()).flush()?;
        }
        Ok(())
    }
}

/// Unknown level names fall back to INFO.
pub(crate) fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(Arc::new(Mutex::new(file)))
        }
        None => None,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_writer(TeeMakeWriter { file })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(())
}
