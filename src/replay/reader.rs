use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use thiserror::Error;

use crate::logging::Record;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Cannot read replay log '{path}'")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Replay log has no header")]
    NoHeader,
}

/// A csv log loaded in memory, one row per frame
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayLog {
    header: Arc<[String]>,
    rows: Vec<Vec<String>>,
}

impl ReplayLog {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let to_err = |source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(to_err)?;

        let log = Self::from_csv(rdr, path)?;

        info!(
            "Loaded {} frames with {} columns from '{}'",
            log.len(),
            log.header.len(),
            path.display()
        );

        Ok(log)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, ReplayError> {
        Self::from_csv(
            csv::ReaderBuilder::new().flexible(true).from_reader(reader),
            Path::new("<reader>"),
        )
    }

    fn from_csv<R: io::Read>(mut rdr: csv::Reader<R>, path: &Path) -> Result<Self, ReplayError> {
        let to_err = |source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let header: Arc<[String]> = rdr
            .headers()
            .map_err(to_err)?
            .iter()
            .map(str::to_string)
            .collect();

        if header.is_empty() {
            return Err(ReplayError::NoHeader);
        }

        let mut rows = vec![];
        for rec in rdr.records() {
            let rec = rec.map_err(to_err)?;

            // Short rows are padded, long rows truncated to the header
            let row = (0..header.len())
                .map(|i| rec.get(i).unwrap_or("").to_string())
                .collect();
            rows.push(row);
        }

        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<ReplayFrame> {
        self.rows.get(index).map(|values| ReplayFrame {
            index,
            header: self.header.clone(),
            values: values.clone(),
        })
    }
}

/// One row of a replayed log
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    pub index: usize,
    header: Arc<[String]>,
    values: Vec<String>,
}

impl ReplayFrame {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }
}

impl Record for ReplayFrame {
    fn fields(&self) -> Vec<(String, String)> {
        self.header
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    fn summary(&self) -> String {
        let shown: Vec<String> = self
            .header
            .iter()
            .zip(self.values.iter())
            .take(4)
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        format!("frame {}: {}", self.index + 1, shown.join(" "))
    }

    /// Replayed drone logs carry their error columns
    fn alert(&self) -> Option<String> {
        let code = self.get("errors_code").filter(|c| !c.is_empty())?;

        Some(format!(
            "{} {} ({})",
            code,
            self.get("errors_desc").unwrap_or(""),
            self.get("errors_source").unwrap_or("")
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    const LOG: &str = "rpm,current,errors_code,errors_desc,errors_source\n\
                       1000,0.7,,,\n\
                       2000,1.2,E101,Motor Overheat,Motors\n\
                       3000\n";

    #[test]
    fn test_frames_in_file_order() {
        let log = ReplayLog::from_reader(LOG.as_bytes()).unwrap();

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.header(),
            &["rpm", "current", "errors_code", "errors_desc", "errors_source"]
        );

        let first = log.frame(0).unwrap();
        assert_eq!(first.get("rpm"), Some("1000"));
        assert_eq!(first.alert(), None);
        assert_eq!(first.summary(), "frame 1: rpm=1000 current=0.7 errors_code= errors_desc=");

        let second = log.frame(1).unwrap();
        assert_eq!(
            second.alert().as_deref(),
            Some("E101 Motor Overheat (Motors)")
        );

        // Padded short row
        let third = log.frame(2).unwrap();
        assert_eq!(third.get("current"), Some(""));
        assert_eq!(third.fields().len(), 5);

        assert!(log.frame(3).is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = std::env::temp_dir().join(format!("dronesim-replay-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("log.csv");
        fs::write(&path, LOG).unwrap();

        let log = ReplayLog::load(&path).unwrap();
        assert_eq!(log.len(), 3);

        assert!(matches!(
            ReplayLog::load(&dir.join("missing.csv")),
            Err(ReplayError::Csv { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_file_has_no_header() {
        assert!(matches!(
            ReplayLog::from_reader("".as_bytes()),
            Err(ReplayError::NoHeader)
        ));
    }
}
