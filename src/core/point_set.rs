use crate::core::dates::date_from_day;
use crate::types::{PointSet, PsId, PsResult, ScattererEpochRecord, StampsArrays};
use chrono::NaiveDate;

/// Round to 2 decimal places for display, ties to even (0.125 -> 0.12)
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
        (scaled / 2.0).round() * 2.0
    } else {
        scaled.round()
    };
    rounded / 100.0
}

/// Reshapes the wide StAMPS displacement matrix into one row per scatterer and epoch
pub struct PointSetBuilder;

impl PointSetBuilder {
    /// Melt `ph_mm` (scatterers x epochs) into long form.
    ///
    /// Rows are ordered epoch by epoch, scatterers in matrix order within each
    /// epoch. The matrix row index becomes `ps_id`.
    pub fn build(arrays: &StampsArrays) -> PsResult<PointSet> {
        arrays.validate()?;

        let n = arrays.scatterer_count();
        let e = arrays.epoch_count();
        log::info!("Building point set: {} scatterers x {} epochs", n, e);

        let dates = arrays
            .day
            .iter()
            .map(|&d| date_from_day(d))
            .collect::<PsResult<Vec<NaiveDate>>>()?;

        let averages: Vec<f64> = arrays.ph_disp.iter().map(|&v| round2(v)).collect();

        let mut records = Vec::with_capacity(n * e);
        for (col, date) in dates.iter().enumerate() {
            for row in 0..n {
                records.push(ScattererEpochRecord {
                    ps_id: row as PsId,
                    longitude: arrays.lonlat[[row, 0]],
                    latitude: arrays.lonlat[[row, 1]],
                    date: *date,
                    displacement_mm: round2(arrays.ph_mm[[row, col]]),
                    average_mm: averages[row],
                });
            }
        }

        log::debug!("Point set holds {} rows", records.len());
        Ok(PointSet::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::collections::HashMap;

    fn arrays() -> StampsArrays {
        StampsArrays {
            lonlat: Array2::from_shape_vec((3, 2), vec![120.0, 14.0, 120.1, 14.1, 120.2, 14.2])
                .unwrap(),
            ph_mm: Array2::from_shape_vec(
                (3, 2),
                vec![1.234, -2.346, 3.0, 4.005, -0.001, 6.789],
            )
            .unwrap(),
            day: vec![737790, 737802],
            master_day: 737796,
            bperp: vec![-20.0, 35.5],
            ph_disp: vec![-1.236, 0.5, 2.0],
        }
    }

    #[test]
    fn test_row_count_is_scatterers_times_epochs() {
        let points = PointSetBuilder::build(&arrays()).unwrap();
        assert_eq!(points.len(), 6);
    }

    #[test]
    fn test_per_scatterer_attributes_constant() {
        let points = PointSetBuilder::build(&arrays()).unwrap();
        let mut seen: HashMap<PsId, (f64, f64, f64)> = HashMap::new();
        for r in &points {
            let attrs = (r.longitude, r.latitude, r.average_mm);
            let entry = seen.entry(r.ps_id).or_insert(attrs);
            assert_eq!(*entry, attrs);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[&0].2, -1.24);
    }

    #[test]
    fn test_melt_order_and_rounding() {
        let points = PointSetBuilder::build(&arrays()).unwrap();
        let first = &points.records[0];
        assert_eq!(first.ps_id, 0);
        assert_eq!(first.displacement_mm, 1.23);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2019, 12, 31).unwrap());

        // second epoch starts after all scatterers of the first
        let fourth = &points.records[3];
        assert_eq!(fourth.ps_id, 0);
        assert_eq!(fourth.displacement_mm, -2.35);
        assert_eq!(points.dates().len(), 2);
    }

    #[test]
    fn test_round2_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(1.236), 1.24);
        assert_eq!(round2(-2.346), -2.35);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut bad = arrays();
        bad.ph_disp.pop();
        assert!(PointSetBuilder::build(&bad).is_err());
    }
}
