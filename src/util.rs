use chrono::Timelike;

/// Rounds half away from zero to the given number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Current local wall clock time, truncated to the precision stored in the log.
pub fn now() -> chrono::NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_places() {
        assert_eq!(round_to(98.6049, 2), 98.6);
        assert_eq!(round_to(1.0846, 3), 1.085);
        assert_eq!(round_to(-3.14159, 1), -3.1);
        assert_eq!(round_to(12.0, 0), 12.0);
    }
}
