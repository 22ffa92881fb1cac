use crate::types::{PointSet, PsError, PsId, PsResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of scatterers shown when no explicit selection is given
pub const DEFAULT_SELECTION_SIZE: usize = 5;

/// Index of the date pre-selected on the date slider
pub const DEFAULT_DATE_INDEX: usize = 3;

/// Parse a comma separated list of scatterer ids such as `"3,7,12"`.
///
/// Whitespace and empty entries are ignored, so `""` yields an empty list.
pub fn parse_id_list(input: &str) -> PsResult<Vec<PsId>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<PsId>()
                .map_err(|_| PsError::Selection(format!("'{}' is not a valid PS id", token)))
        })
        .collect()
}

/// Rows of the point set acquired on `date`
pub fn select_by_date(points: &PointSet, date: NaiveDate) -> PointSet {
    points.filtered(|r| r.date == date)
}

/// The date pre-selected for the map: the 4th acquisition, or the last one if fewer exist
pub fn default_date(points: &PointSet) -> Option<NaiveDate> {
    let dates = points.dates();
    dates
        .get(DEFAULT_DATE_INDEX)
        .or_else(|| dates.last())
        .copied()
}

/// Resolve the scatterers to plot.
///
/// An empty explicit list falls back to the first [`DEFAULT_SELECTION_SIZE`]
/// distinct ids in row order.
pub fn resolve_ids(points: &PointSet, explicit: &[PsId]) -> Vec<PsId> {
    if explicit.is_empty() {
        points
            .ids_in_order()
            .into_iter()
            .take(DEFAULT_SELECTION_SIZE)
            .collect()
    } else {
        explicit.to_vec()
    }
}

/// All rows of the given scatterers
pub fn select_by_ids(points: &PointSet, ids: &[PsId]) -> PointSet {
    let wanted: HashSet<PsId> = ids.iter().copied().collect();
    points.filtered(|r| wanted.contains(&r.ps_id))
}

/// Row of the selected-points table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPoint {
    pub ps_id: PsId,
    pub latitude: f64,
    pub longitude: f64,
    pub average_mm: f64,
}

/// Outcome of applying both selection axes to one point set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Date used for the map, `None` when the point set is empty
    pub date: Option<NaiveDate>,
    /// Ids used for the time series, explicit or default
    pub ids: Vec<PsId>,
    /// Rows on the selected date
    pub on_date: PointSet,
    /// All epochs of the selected scatterers
    pub time_series: PointSet,
}

impl Selection {
    /// Apply date and id selection. Empty inputs give empty subsets.
    pub fn apply(points: &PointSet, date: Option<NaiveDate>, explicit_ids: &[PsId]) -> Self {
        let date = date.or_else(|| default_date(points));
        let ids = resolve_ids(points, explicit_ids);

        let on_date = match date {
            Some(date) => select_by_date(points, date),
            None => PointSet::default(),
        };
        let time_series = select_by_ids(points, &ids);

        log::debug!(
            "Selection: date {:?} ({} rows), {} ids ({} rows)",
            date,
            on_date.len(),
            ids.len(),
            time_series.len()
        );

        Self {
            date,
            ids,
            on_date,
            time_series,
        }
    }

    /// Selected scatterers on the selected date, for the points table
    pub fn highlighted(&self) -> PointSet {
        let wanted: HashSet<PsId> = self.ids.iter().copied().collect();
        self.on_date.filtered(|r| wanted.contains(&r.ps_id))
    }

    pub fn table(&self) -> Vec<SelectedPoint> {
        self.highlighted()
            .iter()
            .map(|r| SelectedPoint {
                ps_id: r.ps_id,
                latitude: r.latitude,
                longitude: r.longitude,
                average_mm: r.average_mm,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScattererEpochRecord;

    fn points() -> PointSet {
        let mut records = Vec::new();
        for day in 0..6 {
            let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(day * 12);
            for id in [9u32, 3, 7, 12, 1, 4, 20] {
                records.push(ScattererEpochRecord {
                    ps_id: id,
                    longitude: 120.0 + id as f64 * 0.01,
                    latitude: 14.0,
                    date,
                    displacement_mm: day as f64,
                    average_mm: id as f64 / 10.0,
                });
            }
        }
        PointSet::new(records)
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("3,7,12").unwrap(), vec![3, 7, 12]);
        assert_eq!(parse_id_list(" 3, 7 ,").unwrap(), vec![3, 7]);
        assert_eq!(parse_id_list("42").unwrap(), vec![42]);
        assert!(parse_id_list("").unwrap().is_empty());
        assert!(matches!(parse_id_list("3,x"), Err(PsError::Selection(_))));
    }

    #[test]
    fn test_explicit_ids_select_all_epochs() {
        let points = points();
        let ids = parse_id_list("3,7,12").unwrap();
        let selection = Selection::apply(&points, None, &ids);
        assert_eq!(selection.time_series.len(), 3 * 6);
        let mut got = selection.time_series.ids_in_order();
        got.sort_unstable();
        assert_eq!(got, vec![3, 7, 12]);
    }

    #[test]
    fn test_default_ids_are_first_five_in_row_order() {
        let selection = Selection::apply(&points(), None, &[]);
        assert_eq!(selection.ids, vec![9, 3, 7, 12, 1]);
        assert_eq!(selection.time_series.len(), 5 * 6);
    }

    #[test]
    fn test_default_date_is_fourth() {
        let points = points();
        let expected = points.dates()[3];
        let selection = Selection::apply(&points, None, &[3]);
        assert_eq!(selection.date, Some(expected));
        assert_eq!(selection.on_date.len(), 7);
        assert_eq!(selection.table().len(), 1);
        assert_eq!(selection.table()[0].average_mm, 0.3);
    }

    #[test]
    fn test_empty_point_set_degrades_gracefully() {
        let selection = Selection::apply(&PointSet::default(), None, &[]);
        assert!(selection.date.is_none());
        assert!(selection.ids.is_empty());
        assert!(selection.on_date.is_empty());
        assert!(selection.time_series.is_empty());
        assert!(selection.table().is_empty());
    }

    #[test]
    fn test_unknown_ids_select_nothing() {
        let selection = Selection::apply(&points(), None, &[999]);
        assert!(selection.time_series.is_empty());
    }
}
