//! Append-only CSV log of every completed cycle.
//!
//! The log is also the only durable copy of the irrigation count: it is
//! recovered from the last row on startup.

use std::fs;
use std::io;
use std::io::Write;
use std::path;

use crate::error::LogError;
use crate::model::LogRecord;

pub mod model;
pub mod schema;

pub struct Log {
    log: slog::Logger,
    path: path::PathBuf,
}

impl Log {
    /// Opens the log at `path`, which need not exist yet.
    ///
    /// A trailing line without a newline is the remains of an interrupted
    /// append and is cut off.
    pub fn open<P>(log: slog::Logger, path: P) -> Result<Self, LogError>
    where
        P: Into<path::PathBuf>,
    {
        let path = path.into();
        let log = log.new(o!("path" => path.display().to_string()));
        let db = Log { log, path };
        db.repair_torn_tail()?;
        Ok(db)
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    /// Appends one record as a single write, followed by an fsync.
    ///
    /// The header is written together with the first record. If the existing
    /// header lacks columns the record carries, the file is migrated first.
    /// A header without `WaterCount` is corrupt and nothing is written.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let (header, fresh) = match self.header()? {
            None => (schema::COLUMNS.iter().map(|c| (*c).to_owned()).collect(), true),
            Some(header) => {
                if !header.iter().any(|h| h == schema::WATER_COUNT) {
                    return Err(self.corruption(
                        1,
                        format!("header has no {} column", schema::WATER_COUNT),
                    ));
                }
                let added = schema::missing_columns(&header);
                if added.is_empty() {
                    (header, false)
                } else {
                    (self.migrate(&header, &added)?, false)
                }
            }
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if fresh {
            writer
                .write_record(&header)
                .map_err(|e| self.csv_error(e))?;
        }
        writer
            .write_record(&model::encode(&header, record))
            .map_err(|e| self.csv_error(e))?;
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&bytes)?;
        file.sync_data()?;

        Ok(())
    }

    /// The irrigation count of the last record, or 0 when there is none.
    ///
    /// Every row is validated; an unreadable log is an error, never 0.
    pub fn recover_last_count(&self) -> Result<u64, LogError> {
        Ok(self
            .records()?
            .last()
            .map_or(0, |record| record.irrigation_count))
    }

    /// The most recent `n` records in time order.
    pub fn tail(&self, n: usize) -> Result<Vec<LogRecord>, LogError> {
        self.tail_since(None, n)
    }

    /// Like [`Log::tail`], ignoring records from before `since`.
    pub fn tail_since(
        &self,
        since: Option<chrono::NaiveDateTime>,
        n: usize,
    ) -> Result<Vec<LogRecord>, LogError> {
        let mut records = self.records()?;
        if let Some(since) = since {
            records.retain(|record| record.reading.timestamp >= since);
        }
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    /// All records, checking that the irrigation count never decreases.
    ///
    /// An empty measurement cell reads as the last value written above it in
    /// the same column; the file itself keeps the cell empty. Timestamps and
    /// counts are never filled.
    pub fn records(&self) -> Result<Vec<LogRecord>, LogError> {
        let mut reader = match self.reader()? {
            Some(reader) => reader,
            None => return Ok(Vec::new()),
        };
        let header = headers(&mut reader).map_err(|e| self.csv_error(e))?;

        let mut lines = Vec::new();
        let mut rows = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| self.csv_error(e))?;
            lines.push(row.position().map_or(0, |p| p.line()));
            let mut cells = row.iter().map(str::to_owned).collect::<Vec<_>>();
            cells.resize(cells.len().max(header.len()), String::new());
            rows.push(cells);
        }
        schema::forward_fill(&mut rows, &schema::fillable(&header));

        let mut records: Vec<LogRecord> = Vec::new();
        for (cells, line) in rows.iter().zip(lines) {
            let record = model::Row::new(&header, cells)
                .decode()
                .map_err(|reason| self.corruption(line, reason))?;

            if let Some(previous) = records.last() {
                if record.irrigation_count < previous.irrigation_count {
                    return Err(self.corruption(
                        line,
                        format!(
                            "irrigation count decreases from {} to {}",
                            previous.irrigation_count, record.irrigation_count
                        ),
                    ));
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    fn header(&self) -> Result<Option<Vec<String>>, LogError> {
        match self.reader()? {
            Some(mut reader) => Ok(Some(
                headers(&mut reader).map_err(|e| self.csv_error(e))?,
            )),
            None => Ok(None),
        }
    }

    /// `None` when the file does not exist or is empty.
    fn reader(&self) -> Result<Option<csv::Reader<fs::File>>, LogError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }

        Ok(Some(
            csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_reader(file),
        ))
    }

    /// Rewrites the file with `added` columns, replacing it atomically.
    fn migrate(&self, header: &[String], added: &[&str]) -> Result<Vec<String>, LogError> {
        info!(self.log, "extending log schema"; "columns" => added.join(","));

        let mut rows = Vec::new();
        if let Some(mut reader) = self.reader()? {
            for result in reader.records() {
                let row = result.map_err(|e| self.csv_error(e))?;
                rows.push(row.iter().map(str::to_owned).collect::<Vec<_>>());
            }
        }
        let extended = schema::migrate(header, added, &mut rows);

        let staging = self.path.with_extension("csv.migrating");
        {
            let file = fs::File::create(&staging)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer
                .write_record(&extended)
                .map_err(|e| self.csv_error(e))?;
            for row in &rows {
                writer.write_record(row).map_err(|e| self.csv_error(e))?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        Ok(extended)
    }

    fn repair_torn_tail(&self) -> Result<(), LogError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        warn!(self.log, "discarding incomplete trailing record";
              "bytes" => bytes.len() - keep);

        let file = fs::OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(keep as u64)?;
        file.sync_data()?;

        Ok(())
    }

    fn corruption(&self, line: u64, reason: String) -> LogError {
        LogError::Corruption {
            path: self.path.clone(),
            line,
            reason,
        }
    }

    fn csv_error(&self, err: csv::Error) -> LogError {
        let line = err.position().map_or(0, |p| p.line());
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(e) => LogError::Io(e),
            _ => self.corruption(line, reason),
        }
    }
}

fn headers<R>(reader: &mut csv::Reader<R>) -> Result<Vec<String>, csv::Error>
where
    R: io::Read,
{
    Ok(reader.headers()?.iter().map(str::to_owned).collect())
}
