//! Column layout of `sensor_data_<id>.csv` and its migration.
//!
//! The layout is shared with the weekly summary reporter, so names and
//! order are fixed.

pub const DATETIME: &str = "Datetime";
pub const TEMP: &str = "Temp";
pub const PH: &str = "pH";
pub const EC: &str = "EC";
pub const MOISTURE: &str = "Moisture";
pub const NITROGEN: &str = "Nitrogen";
pub const PHOSPHORUS: &str = "Phosphorus";
pub const POTASSIUM: &str = "Potassium";
pub const FAHRENHEIT: &str = "Fahrenheit";
pub const CELSIUS: &str = "Celsius";
pub const REL_HUMIDITY: &str = "RelHumidity";
pub const VPD: &str = "VPD";
pub const WATER_COUNT: &str = "WaterCount";

pub const COLUMNS: [&str; 13] = [
    DATETIME,
    TEMP,
    PH,
    EC,
    MOISTURE,
    NITROGEN,
    PHOSPHORUS,
    POTASSIUM,
    FAHRENHEIT,
    CELSIUS,
    REL_HUMIDITY,
    VPD,
    WATER_COUNT,
];

pub const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Known columns the given header does not have yet, in canonical order.
///
/// `WaterCount` is never reported: a log without counts cannot be migrated.
pub fn missing_columns(header: &[String]) -> Vec<&'static str> {
    COLUMNS
        .iter()
        .cloned()
        .filter(|column| *column != WATER_COUNT)
        .filter(|column| !header.iter().any(|h| h == column))
        .collect()
}

/// Columns that may be carried forward from an earlier row when read back.
/// The timestamp and the irrigation count are always taken as written.
pub fn fillable(header: &[String]) -> Vec<bool> {
    header
        .iter()
        .map(|column| *column != DATETIME && *column != WATER_COUNT)
        .collect()
}

/// Extends `header` with `added` columns and brings `rows` along.
///
/// Existing cells are left exactly as they are. Only the new columns of
/// every row are padded and forward-filled.
pub fn migrate(header: &[String], added: &[&str], rows: &mut Vec<Vec<String>>) -> Vec<String> {
    let mut extended = header.to_vec();
    extended.extend(added.iter().map(|c| (*c).to_owned()));

    for row in rows.iter_mut() {
        row.resize(row.len().max(extended.len()), String::new());
    }
    let fill = (0..extended.len())
        .map(|i| i >= header.len())
        .collect::<Vec<_>>();
    forward_fill(rows, &fill);

    extended
}

/// Replaces each empty cell of a `fill` column with the last non-empty value
/// above it. Rows before the first value of a column stay empty.
pub fn forward_fill(rows: &mut [Vec<String>], fill: &[bool]) {
    let mut last: Vec<Option<String>> = vec![None; fill.len()];

    for row in rows.iter_mut() {
        let columns = row.iter_mut().zip(fill).zip(last.iter_mut());
        for ((cell, &fill), last) in columns {
            if !fill {
                continue;
            }
            if cell.is_empty() {
                if let Some(value) = last {
                    cell.clone_from(value);
                }
            } else {
                *last = Some(cell.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_owned()).collect()
    }

    #[test]
    fn finds_columns_absent_from_legacy_header() {
        let legacy = strings(&[DATETIME, TEMP, PH, EC, MOISTURE, NITROGEN, PHOSPHORUS, POTASSIUM]);

        assert_eq!(
            missing_columns(&legacy),
            vec![FAHRENHEIT, CELSIUS, REL_HUMIDITY, VPD]
        );
        assert!(missing_columns(&strings(&COLUMNS)).is_empty());
    }

    #[test]
    fn timestamp_and_count_are_never_filled() {
        let header = strings(&[DATETIME, MOISTURE, EC, WATER_COUNT]);

        assert_eq!(fillable(&header), vec![false, true, true, false]);
    }

    #[test]
    fn migration_leaves_existing_cells_alone() {
        let header = strings(&["Datetime", "Moisture", "Note"]);
        let mut rows = vec![
            strings(&["03-21-2020 08:00:00", "30", "a"]),
            strings(&["03-21-2020 08:15:00", "", ""]),
            strings(&["03-21-2020 08:30:00", "28"]),
        ];

        let extended = migrate(&header, &[VPD], &mut rows);

        assert_eq!(extended, strings(&["Datetime", "Moisture", "Note", "VPD"]));
        assert_eq!(rows[0], strings(&["03-21-2020 08:00:00", "30", "a", ""]));
        assert_eq!(rows[1], strings(&["03-21-2020 08:15:00", "", "", ""]));
        assert_eq!(rows[2], strings(&["03-21-2020 08:30:00", "28", "", ""]));
    }

    #[test]
    fn fill_is_per_column() {
        let mut rows = vec![
            strings(&["", "30", "1"]),
            strings(&["", "", ""]),
            strings(&["7", "", "2"]),
        ];

        forward_fill(&mut rows, &[true, true, false]);

        assert_eq!(rows[0], strings(&["", "30", "1"]));
        assert_eq!(rows[1], strings(&["", "30", ""]));
        assert_eq!(rows[2], strings(&["7", "30", "2"]));
    }
}
