use crate::core::dates::date_from_day;
use crate::types::{
    AcquisitionRole, BaselineRecord, BaselineTable, PsError, PsResult, StampsArrays,
};

/// Builds the per-acquisition baseline table shown in the metadata panel
pub struct BaselineTableBuilder;

impl BaselineTableBuilder {
    /// Merge reference and secondary days and attach their baselines.
    ///
    /// `bperp` either lists the secondaries only, in `day` order, and the
    /// reference baseline is taken as 0, or it already covers the merged,
    /// sorted acquisition list.
    pub fn build(arrays: &StampsArrays) -> PsResult<BaselineTable> {
        let reference_day = arrays.master_day;

        let mut days = arrays.day.clone();
        if !days.contains(&reference_day) {
            days.push(reference_day);
        }
        days.sort_unstable();

        let baselines: Vec<f64> = if arrays.bperp.len() == days.len() {
            // pair values with days in sorted order, as stored by StAMPS
            arrays.bperp.clone()
        } else if arrays.bperp.len() == arrays.day.len() {
            let mut secondary: Vec<(i64, f64)> = arrays
                .day
                .iter()
                .copied()
                .zip(arrays.bperp.iter().copied())
                .collect();
            secondary.sort_by_key(|&(day, _)| day);

            let mut values = Vec::with_capacity(days.len());
            let mut next = secondary.into_iter();
            for &day in &days {
                if day == reference_day {
                    values.push(0.0);
                } else {
                    match next.next() {
                        Some((_, bperp)) => values.push(bperp),
                        None => {
                            return Err(PsError::Format(
                                "bperp ran out before the acquisition list".to_string(),
                            ))
                        }
                    }
                }
            }
            values
        } else {
            return Err(PsError::Format(format!(
                "bperp has {} values for {} acquisitions",
                arrays.bperp.len(),
                days.len()
            )));
        };

        let records = days
            .iter()
            .zip(baselines)
            .map(|(&day, bperp)| {
                Ok(BaselineRecord {
                    date: date_from_day(day)?,
                    perpendicular_baseline_m: bperp,
                    temporal_baseline_days: day - reference_day,
                    role: if day == reference_day {
                        AcquisitionRole::Reference
                    } else {
                        AcquisitionRole::Secondary
                    },
                })
            })
            .collect::<PsResult<Vec<_>>>()?;

        log::debug!(
            "Baseline table: {} acquisitions, reference day {}",
            records.len(),
            reference_day
        );
        Ok(BaselineTable { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn arrays(day: Vec<i64>, master_day: i64, bperp: Vec<f64>) -> StampsArrays {
        let e = day.len();
        StampsArrays {
            lonlat: Array2::zeros((1, 2)),
            ph_mm: Array2::zeros((1, e)),
            day,
            master_day,
            bperp,
            ph_disp: vec![0.0],
        }
    }

    #[test]
    fn test_reference_inserted_with_zero_baseline() {
        let table = BaselineTableBuilder::build(&arrays(
            vec![737790, 737795, 737805, 737810],
            737800,
            vec![-10.0, 5.0, 12.5, -3.0],
        ))
        .unwrap();

        assert_eq!(table.records.len(), 5);
        let temporal: Vec<i64> = table.records.iter().map(|r| r.temporal_baseline_days).collect();
        assert_eq!(temporal, vec![-10, -5, 0, 5, 10]);

        let reference = table.reference().unwrap();
        assert_eq!(reference.perpendicular_baseline_m, 0.0);
        assert_eq!(reference.temporal_baseline_days, 0);
        assert_eq!(table.secondary_count(), 4);
        assert_eq!(table.records[3].perpendicular_baseline_m, 12.5);
    }

    #[test]
    fn test_bperp_including_reference() {
        let table = BaselineTableBuilder::build(&arrays(
            vec![737790, 737810],
            737800,
            vec![-10.0, 0.0, 8.0],
        ))
        .unwrap();
        let bperp: Vec<f64> = table.records.iter().map(|r| r.perpendicular_baseline_m).collect();
        assert_eq!(bperp, vec![-10.0, 0.0, 8.0]);
        assert_eq!(table.records[1].role, AcquisitionRole::Reference);
    }

    #[test]
    fn test_unsorted_secondaries() {
        let table = BaselineTableBuilder::build(&arrays(
            vec![737810, 737790],
            737800,
            vec![8.0, -10.0],
        ))
        .unwrap();
        let bperp: Vec<f64> = table.records.iter().map(|r| r.perpendicular_baseline_m).collect();
        assert_eq!(bperp, vec![-10.0, 0.0, 8.0]);
    }

    #[test]
    fn test_reference_not_duplicated() {
        let table = BaselineTableBuilder::build(&arrays(
            vec![737790, 737800, 737810],
            737800,
            vec![-10.0, 0.0, 8.0],
        ))
        .unwrap();
        let references = table
            .records
            .iter()
            .filter(|r| r.role == AcquisitionRole::Reference)
            .count();
        assert_eq!(references, 1);
        assert_eq!(table.records.len(), 3);
    }

    #[test]
    fn test_wrong_bperp_length() {
        assert!(BaselineTableBuilder::build(&arrays(vec![737790], 737800, vec![])).is_err());
    }
}
