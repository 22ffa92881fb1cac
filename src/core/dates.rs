//! Conversion between StAMPS day numbers and calendar dates.
//!
//! StAMPS stores acquisition days as MATLAB `datenum` values, where day 1 is
//! 0000-01-01. Dates are computed as `0001-01-01 + day - 367`, which lines the
//! MATLAB numbering up with the proleptic Gregorian calendar.

use crate::types::{PsError, PsResult};
use chrono::{Datelike, NaiveDate};

/// Offset between the MATLAB day numbering and 0001-01-01
pub const DAY_OFFSET_CORRECTION: i64 = 367;

/// Convert a StAMPS day number into a calendar date.
///
/// Days below 367 fall before 0001-01-01 and map onto proleptic Gregorian
/// dates in year 0 or earlier.
pub fn date_from_day(day: i64) -> PsResult<NaiveDate> {
    // num_days_from_ce counts 0001-01-01 as day 1
    let ce_days = day
        .checked_sub(DAY_OFFSET_CORRECTION - 1)
        .and_then(|d| i32::try_from(d).ok())
        .ok_or_else(|| PsError::Format(format!("day number {} is out of range", day)))?;

    NaiveDate::from_num_days_from_ce_opt(ce_days)
        .ok_or_else(|| PsError::Format(format!("day number {} is out of range", day)))
}

/// Convert a calendar date back into a StAMPS day number
pub fn day_from_date(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - 1 + DAY_OFFSET_CORRECTION
}

/// Convert a floating point day value, as stored in `.mat` files, to an integer day
pub fn day_from_f64(value: f64) -> PsResult<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(PsError::Format(format!(
            "day number {} is not a whole number",
            value
        )));
    }
    Ok(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_stamps_day() {
        // 737793 is the MATLAB datenum of 2020-01-03
        let date = date_from_day(737793).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 1, 3).unwrap());
    }

    #[test]
    fn test_epoch_boundary() {
        assert_eq!(
            date_from_day(DAY_OFFSET_CORRECTION).unwrap(),
            NaiveDate::from_ymd_opt(1, 1, 1).unwrap()
        );
        assert_eq!(
            date_from_day(DAY_OFFSET_CORRECTION - 1).unwrap(),
            NaiveDate::from_ymd_opt(0, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_small_day_numbers() {
        let reference = date_from_day(100).unwrap();
        for (day, offset) in [(90, -10), (95, -5), (105, 5), (110, 10)] {
            let date = date_from_day(day).unwrap();
            assert_eq!((date - reference).num_days(), offset);
        }
        assert!(date_from_day(i64::MAX).is_err());
        assert!(date_from_day(i64::MIN).is_err());
    }

    #[test]
    fn test_round_trip() {
        for day in (-1000..2000).chain(730_000..740_000) {
            let date = date_from_day(day).unwrap();
            assert_eq!(day_from_date(date), day);
        }
    }

    #[test]
    fn test_fractional_day_rejected() {
        assert_eq!(day_from_f64(737793.0).unwrap(), 737793);
        assert!(day_from_f64(737793.5).is_err());
        assert!(day_from_f64(f64::NAN).is_err());
    }
}
