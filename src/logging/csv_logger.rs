use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{info, warn};
use thiserror::Error;

use crate::core::time::Timestamp;

use super::Record;

pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Cannot create log location '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write log '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing csv log")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Prepend a column with the UTC time of each sample
    pub timestamp: bool,

    /// Only log these columns, in this order
    pub columns: Option<Vec<String>>,
}

/// `log_YYYY-MM-DD_HH-MM-SS.csv`
pub fn log_file_name(time: DateTime<Local>) -> String {
    time.format("log_%Y-%m-%d_%H-%M-%S.csv").to_string()
}

/// Writes records as rows of a csv file.
///
/// The header is fixed by the first record. Later records missing a column get
/// an empty cell and columns outside the header are dropped.
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
    options: LogOptions,

    header: Option<Vec<String>>,
    dropped: HashSet<String>,
    rows: usize,
}

impl CsvLogger {
    /// Creates a new log file named after the current local time inside `dir`
    pub fn in_dir(dir: &Path, options: LogOptions) -> Result<Self, LogError> {
        fs::create_dir_all(dir).map_err(|source| LogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        Self::create(&dir.join(log_file_name(Local::now())), options)
    }

    pub fn create(path: &Path, options: LogOptions) -> Result<Self, LogError> {
        let writer = csv::Writer::from_path(path)?;
        info!("Logging to '{}'", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            options,
            header: None,
            dropped: HashSet::new(),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn log<R: Record + ?Sized>(
        &mut self,
        timestamp: &Timestamp,
        record: &R,
    ) -> Result<(), LogError> {
        let fields = record.fields();

        let header = match &self.header {
            Some(header) => header,
            None => {
                let mut header = vec![];
                if self.options.timestamp {
                    header.push(TIMESTAMP_COLUMN.to_string());
                }
                match &self.options.columns {
                    Some(columns) => header.extend(columns.iter().cloned()),
                    None => header.extend(fields.iter().map(|(k, _)| k.clone())),
                }

                self.writer.write_record(&header)?;
                &*self.header.insert(header)
            }
        };

        let mut values: HashMap<&str, &str> = HashMap::with_capacity(fields.len());
        for (key, value) in fields.iter() {
            values.insert(key.as_str(), value.as_str());
        }

        let ts = timestamp.to_rfc3339();
        let row: Vec<&str> = header
            .iter()
            .map(|col| {
                if self.options.timestamp && col == TIMESTAMP_COLUMN {
                    ts.as_str()
                } else {
                    values.get(col.as_str()).copied().unwrap_or("")
                }
            })
            .collect();
        self.writer.write_record(&row)?;

        // A column selection drops the rest on purpose
        if self.options.columns.is_none() {
            for (key, _) in fields.iter() {
                if !header.contains(key) && self.dropped.insert(key.clone()) {
                    warn!("Column '{key}' is not in the log header, dropping it");
                }
            }
        }

        self.rows += 1;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush().map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
