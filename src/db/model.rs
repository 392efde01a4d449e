//! Conversion between [`LogRecord`]s and CSV rows.

use crate::db::schema;
use crate::model::{Climate, LogRecord, Reading};

/// Cells of `record` laid out for `header`; unknown columns are left empty.
pub fn encode(header: &[String], record: &LogRecord) -> Vec<String> {
    header
        .iter()
        .map(|column| cell(column, record).unwrap_or_default())
        .collect()
}

fn cell(column: &str, record: &LogRecord) -> Option<String> {
    let reading = &record.reading;
    let climate = reading.climate.as_ref();
    let number = |value: Option<f64>| value.map(|v| v.to_string());

    match column {
        schema::DATETIME => Some(
            reading
                .timestamp
                .format(schema::TIMESTAMP_FORMAT)
                .to_string(),
        ),
        schema::TEMP => number(reading.temperature),
        schema::PH => number(reading.ph),
        schema::EC => number(reading.conductivity),
        schema::MOISTURE => number(Some(reading.moisture)),
        schema::NITROGEN => number(reading.nitrogen),
        schema::PHOSPHORUS => number(reading.phosphorus),
        schema::POTASSIUM => number(reading.potassium),
        schema::FAHRENHEIT => number(climate.map(|c| c.fahrenheit)),
        schema::CELSIUS => number(climate.map(|c| c.celsius)),
        schema::REL_HUMIDITY => number(climate.map(|c| c.humidity)),
        schema::VPD => number(climate.map(|c| c.vpd)),
        schema::WATER_COUNT => Some(record.irrigation_count.to_string()),
        _ => None,
    }
}

/// A row read back under `header`.
pub struct Row<'a> {
    header: &'a [String],
    cells: &'a [String],
}

impl<'a> Row<'a> {
    pub fn new(header: &'a [String], cells: &'a [String]) -> Self {
        Row { header, cells }
    }

    fn raw(&self, column: &str) -> Option<&'a str> {
        self.header
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.cells.get(i))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    fn number(&self, column: &str) -> Result<Option<f64>, String> {
        match self.raw(column) {
            None => Ok(None),
            Some(cell) => cell
                .parse::<f64>()
                .map(Some)
                .map_err(|e| format!("{} {:?} is not a number: {}", column, cell, e)),
        }
    }

    fn required(&self, column: &str) -> Result<f64, String> {
        self.number(column)?
            .ok_or_else(|| format!("{} is empty", column))
    }

    /// Tolerates float-formatted counts ("3.0") written by older tooling.
    fn count(&self) -> Result<u64, String> {
        let cell = self
            .raw(schema::WATER_COUNT)
            .ok_or_else(|| format!("{} is empty", schema::WATER_COUNT))?;

        cell.parse::<u64>().or_else(|_| match cell.parse::<f64>() {
            Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
            _ => Err(format!("{} {:?} is not a count", schema::WATER_COUNT, cell)),
        })
    }

    pub fn decode(&self) -> Result<LogRecord, String> {
        let timestamp = self
            .raw(schema::DATETIME)
            .ok_or_else(|| format!("{} is empty", schema::DATETIME))?;
        let timestamp = chrono::NaiveDateTime::parse_from_str(timestamp, schema::TIMESTAMP_FORMAT)
            .map_err(|e| format!("{} {:?}: {}", schema::DATETIME, timestamp, e))?;

        let climate = match (
            self.number(schema::CELSIUS)?,
            self.number(schema::FAHRENHEIT)?,
            self.number(schema::REL_HUMIDITY)?,
            self.number(schema::VPD)?,
        ) {
            (Some(celsius), Some(fahrenheit), Some(humidity), Some(vpd)) => Some(Climate {
                celsius,
                fahrenheit,
                humidity,
                vpd,
            }),
            _ => None,
        };

        Ok(LogRecord {
            reading: Reading {
                timestamp,
                temperature: self.number(schema::TEMP)?,
                ph: self.number(schema::PH)?,
                conductivity: self.number(schema::EC)?,
                moisture: self.required(schema::MOISTURE)?,
                nitrogen: self.number(schema::NITROGEN)?,
                phosphorus: self.number(schema::PHOSPHORUS)?,
                potassium: self.number(schema::POTASSIUM)?,
                climate,
            },
            irrigation_count: self.count()?,
        })
    }
}
