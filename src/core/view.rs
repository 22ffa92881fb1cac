//! View models for the dashboard: map, time series, statistics, histogram and
//! baseline chart. These are plain data; drawing them is left to the front-end.

use crate::core::pipeline::Ingested;
use crate::core::selection::{SelectedPoint, Selection};
use crate::core::trend::{linear_fit, loess, TrendMethod, DAYS_PER_YEAR, DEFAULT_LOESS_BANDWIDTH};
use crate::types::{
    AcquisitionRole, BaselineTable, PointSet, PsError, PsId, PsResult, SamplingWarning,
    ScattererEpochRecord,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_MARKER_SIZE: u32 = 2;
pub const MAX_MARKER_SIZE: u32 = 15;
pub const DEFAULT_MARKER_SIZE: u32 = 5;
/// Extra size of the markers highlighting selected scatterers
pub const HIGHLIGHT_MARKER_GROWTH: u32 = 5;
pub const HIGHLIGHT_COLOR: &str = "#51ED5A";

pub const MIN_BIN_WIDTH: u32 = 1;
pub const MAX_BIN_WIDTH: u32 = 10;

/// Padding around the time-series axes
pub const TIME_PAD_BEFORE_DAYS: i64 = 60;
pub const TIME_PAD_AFTER_DAYS: i64 = 120;
pub const DISPLACEMENT_PAD_MM: f64 = 5.0;

/// Which column drives map colour, statistics and histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorBy {
    /// Displacement at the selected date
    #[default]
    Displacement,
    /// Precomputed mean value of the scatterer
    Average,
}

impl ColorBy {
    pub fn value(&self, record: &ScattererEpochRecord) -> f64 {
        match self {
            ColorBy::Displacement => record.displacement_mm,
            ColorBy::Average => record.average_mm,
        }
    }

    pub fn axis_title(&self) -> &'static str {
        match self {
            ColorBy::Displacement => "LOS Displacement (mm)",
            ColorBy::Average => "Mean LOS Displacement (mm/yr)",
        }
    }
}

impl std::str::FromStr for ColorBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "displacement" => Ok(ColorBy::Displacement),
            "average" | "mean" => Ok(ColorBy::Average),
            _ => Err(format!("unknown colour column: {}", s)),
        }
    }
}

/// Base map styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MapStyle {
    CartoPositron,
    OpenStreetMap,
    #[default]
    CartoDark,
    StamenTerrain,
    StamenToner,
    StamenWatercolor,
}

impl MapStyle {
    pub const ALL: [MapStyle; 6] = [
        MapStyle::CartoPositron,
        MapStyle::OpenStreetMap,
        MapStyle::CartoDark,
        MapStyle::StamenTerrain,
        MapStyle::StamenToner,
        MapStyle::StamenWatercolor,
    ];

    /// Style identifier understood by the map renderer
    pub fn style_id(&self) -> &'static str {
        match self {
            MapStyle::CartoPositron => "carto-positron",
            MapStyle::OpenStreetMap => "open-street-map",
            MapStyle::CartoDark => "carto-darkmatter",
            MapStyle::StamenTerrain => "stamen-terrain",
            MapStyle::StamenToner => "stamen-toner",
            MapStyle::StamenWatercolor => "stamen-watercolor",
        }
    }
}

impl std::str::FromStr for MapStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MapStyle::ALL
            .iter()
            .copied()
            .find(|style| style.style_id() == s || format!("{:?}", style).eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown map style: {}", s))
    }
}

/// Colour scales offered for the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorScale {
    Greys,
    YlGnBu,
    Greens,
    YlOrRd,
    Bluered,
    RdBu,
    Reds,
    Blues,
    Picnic,
    Rainbow,
    Portland,
    Jet,
    Hot,
    Blackbody,
    Earth,
    #[default]
    Electric,
    Viridis,
    Cividis,
}

impl ColorScale {
    pub const ALL: [ColorScale; 18] = [
        ColorScale::Greys,
        ColorScale::YlGnBu,
        ColorScale::Greens,
        ColorScale::YlOrRd,
        ColorScale::Bluered,
        ColorScale::RdBu,
        ColorScale::Reds,
        ColorScale::Blues,
        ColorScale::Picnic,
        ColorScale::Rainbow,
        ColorScale::Portland,
        ColorScale::Jet,
        ColorScale::Hot,
        ColorScale::Blackbody,
        ColorScale::Earth,
        ColorScale::Electric,
        ColorScale::Viridis,
        ColorScale::Cividis,
    ];

    pub fn name(&self) -> String {
        format!("{:?}", self)
    }
}

impl std::str::FromStr for ColorScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorScale::ALL
            .iter()
            .copied()
            .find(|scale| scale.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown colour scale: {}", s))
    }
}

/// Presentation parameters for one rendering pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    /// Date shown on the map, defaults to the 4th acquisition
    pub date: Option<NaiveDate>,
    /// Scatterers for the time series, defaults to the first 5
    pub ids: Vec<PsId>,
    pub color_by: ColorBy,
    pub map_style: MapStyle,
    pub color_scale: ColorScale,
    pub marker_size: u32,
    pub bin_width: u32,
    pub trend: TrendMethod,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            date: None,
            ids: Vec::new(),
            color_by: ColorBy::default(),
            map_style: MapStyle::default(),
            color_scale: ColorScale::default(),
            marker_size: DEFAULT_MARKER_SIZE,
            bin_width: MIN_BIN_WIDTH,
            trend: TrendMethod::default(),
        }
    }
}

impl ViewParams {
    pub fn validate(&self) -> PsResult<()> {
        if !(MIN_MARKER_SIZE..=MAX_MARKER_SIZE).contains(&self.marker_size) {
            return Err(PsError::InvalidParameter(format!(
                "marker size {} outside {}..={}",
                self.marker_size, MIN_MARKER_SIZE, MAX_MARKER_SIZE
            )));
        }
        if !(MIN_BIN_WIDTH..=MAX_BIN_WIDTH).contains(&self.bin_width) {
            return Err(PsError::InvalidParameter(format!(
                "bin width {} outside {}..={}",
                self.bin_width, MIN_BIN_WIDTH, MAX_BIN_WIDTH
            )));
        }
        Ok(())
    }
}

/// One marker on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub ps_id: PsId,
    pub longitude: f64,
    pub latitude: f64,
    pub value: f64,
    pub date: NaiveDate,
}

impl MapPoint {
    fn from_record(record: &ScattererEpochRecord, color_by: ColorBy) -> Self {
        Self {
            ps_id: record.ps_id,
            longitude: record.longitude,
            latitude: record.latitude,
            value: color_by.value(record),
            date: record.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub points: Vec<MapPoint>,
    /// Selected scatterers on the shown date
    pub highlighted: Vec<MapPoint>,
    /// (lon, lat) midpoint of the point extent
    pub center: Option<(f64, f64)>,
    pub style: String,
    pub color_scale: String,
    /// Colour scale midpoint
    pub color_mid: f64,
    pub colorbar_title: String,
    pub marker_size: u32,
    pub highlight_marker_size: u32,
    pub highlight_color: String,
}

impl MapView {
    pub fn build(selection: &Selection, params: &ViewParams) -> Self {
        let color_by = params.color_by;
        let points: Vec<MapPoint> = selection
            .on_date
            .iter()
            .map(|r| MapPoint::from_record(r, color_by))
            .collect();
        let highlighted = selection
            .highlighted()
            .iter()
            .map(|r| MapPoint::from_record(r, color_by))
            .collect();

        Self {
            points,
            highlighted,
            center: selection.on_date.extent().map(|b| b.center()),
            style: params.map_style.style_id().to_string(),
            color_scale: params.color_scale.name(),
            color_mid: 0.0,
            colorbar_title: color_by.axis_title().to_string(),
            marker_size: params.marker_size,
            highlight_marker_size: params.marker_size + HIGHLIGHT_MARKER_GROWTH,
            highlight_color: HIGHLIGHT_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub displacement_mm: f64,
}

/// Displacement history of one scatterer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsSeries {
    pub ps_id: PsId,
    pub points: Vec<SeriesPoint>,
}

/// Linear velocity estimate in mm/yr
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub mm_per_year: f64,
    pub stderr: Option<f64>,
}

impl std::fmt::Display for Velocity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stderr {
            Some(se) => write!(f, "{:.2} ± {:.2} mm/yr", self.mm_per_year, se),
            None => write!(f, "{:.2} mm/yr", self.mm_per_year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub method: TrendMethod,
    /// Fitted value at each acquisition date
    pub points: Vec<SeriesPoint>,
    /// Only for linear regression
    pub velocity: Option<Velocity>,
}

impl TrendLine {
    /// Fit the per-date mean displacement of the selection
    pub fn fit(points: &PointSet, method: TrendMethod) -> Option<Self> {
        let mut by_date: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for r in points {
            let entry = by_date.entry(r.date).or_insert((0.0, 0));
            entry.0 += r.displacement_mm;
            entry.1 += 1;
        }

        let first = *by_date.keys().next()?;
        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let x: Vec<f64> = dates
            .iter()
            .map(|d| (*d - first).num_days() as f64 / DAYS_PER_YEAR)
            .collect();
        let y: Vec<f64> = by_date.values().map(|(sum, n)| sum / *n as f64).collect();

        let (fitted, velocity) = match method {
            TrendMethod::LinearRegression => {
                let fit = linear_fit(&x, &y)?;
                let fitted = x.iter().map(|&xi| fit.predict(xi)).collect();
                let velocity = Velocity {
                    mm_per_year: fit.slope,
                    stderr: fit.slope_stderr,
                };
                (fitted, Some(velocity))
            }
            TrendMethod::Loess => (loess(&x, &y, DEFAULT_LOESS_BANDWIDTH), None),
        };

        let points = dates
            .into_iter()
            .zip(fitted)
            .map(|(date, displacement_mm)| SeriesPoint {
                date,
                displacement_mm,
            })
            .collect();

        Some(Self {
            method,
            points,
            velocity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesView {
    pub series: Vec<PsSeries>,
    pub trend: Option<TrendLine>,
    pub x_domain: Option<(NaiveDate, NaiveDate)>,
    pub y_domain: Option<(f64, f64)>,
}

impl TimeSeriesView {
    /// Build the chart for the selected scatterers, in the order of `ids`
    pub fn build(points: &PointSet, ids: &[PsId], method: TrendMethod) -> Self {
        let mut grouped: BTreeMap<PsId, Vec<SeriesPoint>> = BTreeMap::new();
        for r in points {
            grouped.entry(r.ps_id).or_default().push(SeriesPoint {
                date: r.date,
                displacement_mm: r.displacement_mm,
            });
        }

        let series: Vec<PsSeries> = ids
            .iter()
            .filter_map(|id| {
                grouped.remove(id).map(|mut points| {
                    points.sort_by_key(|p| p.date);
                    PsSeries { ps_id: *id, points }
                })
            })
            .collect();

        let dates = points.dates();
        let x_domain = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => Some((
                *first - Duration::days(TIME_PAD_BEFORE_DAYS),
                *last + Duration::days(TIME_PAD_AFTER_DAYS),
            )),
            _ => None,
        };

        let y_domain = DescriptiveStats::compute(points.iter().map(|r| r.displacement_mm))
            .map(|s| (s.min - DISPLACEMENT_PAD_MM, s.max + DISPLACEMENT_PAD_MM));

        Self {
            series,
            trend: TrendLine::fit(points, method),
            x_domain,
            y_domain,
        }
    }
}

/// Summary statistics of the colour column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

impl DescriptiveStats {
    /// `None` for an empty input
    pub fn compute<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for v in values {
            count += 1;
            sum += v;
            max = max.max(v);
            min = min.min(v);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            count,
            max,
            min,
            mean: sum / count as f64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Contiguous bins beyond this span collapse to the occupied bins only
pub const MAX_HISTOGRAM_BINS: i64 = 10_000;

/// Fixed-width histogram with bins aligned to multiples of the width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bin_width: f64,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn build<I: IntoIterator<Item = f64>>(values: I, bin_width: f64) -> Self {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        if bin_width > 0.0 {
            for v in values.into_iter().filter(|v| v.is_finite()) {
                *counts.entry((v / bin_width).floor() as i64).or_insert(0) += 1;
            }
        }

        let bin = |k: i64, count: usize| HistogramBin {
            start: k as f64 * bin_width,
            end: (k + 1) as f64 * bin_width,
            count,
        };
        let bins = match (counts.keys().next(), counts.keys().next_back()) {
            (Some(&lo), Some(&hi)) if hi.saturating_sub(lo) < MAX_HISTOGRAM_BINS => (lo..=hi)
                .map(|k| bin(k, counts.get(&k).copied().unwrap_or(0)))
                .collect(),
            (Some(&lo), Some(&hi)) => {
                log::warn!(
                    "Histogram spans {} bins, keeping only the {} occupied ones",
                    hi.saturating_sub(lo).saturating_add(1),
                    counts.len()
                );
                counts.iter().map(|(&k, &count)| bin(k, count)).collect()
            }
            _ => Vec::new(),
        };

        Self { bin_width, bins }
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePoint {
    pub date: NaiveDate,
    pub temporal_baseline_days: i64,
    pub perpendicular_baseline_m: f64,
    pub role: AcquisitionRole,
}

/// Temporal vs perpendicular baseline scatter chart and acquisition metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineChart {
    pub points: Vec<BaselinePoint>,
    pub reference_date: Option<NaiveDate>,
    pub secondary_count: usize,
}

impl BaselineChart {
    pub fn build(table: &BaselineTable) -> Self {
        Self {
            points: table
                .records
                .iter()
                .map(|r| BaselinePoint {
                    date: r.date,
                    temporal_baseline_days: r.temporal_baseline_days,
                    perpendicular_baseline_m: r.perpendicular_baseline_m,
                    role: r.role,
                })
                .collect(),
            reference_date: table.reference().map(|r| r.date),
            secondary_count: table.secondary_count(),
        }
    }
}

/// Everything rendered for one interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    /// Rows handed to the views after sampling
    pub point_count: usize,
    pub warning: Option<SamplingWarning>,
    /// Dates selectable on the date slider
    pub dates: Vec<NaiveDate>,
    pub selected_date: Option<NaiveDate>,
    pub selected_ids: Vec<PsId>,
    pub map: MapView,
    pub selected_points: Vec<SelectedPoint>,
    pub time_series: TimeSeriesView,
    pub stats: Option<DescriptiveStats>,
    pub histogram: Histogram,
    pub baseline: BaselineChart,
}

impl Dashboard {
    /// Assemble all views. Empty point sets give empty views rather than errors.
    pub fn build(ingested: &Ingested, params: &ViewParams) -> PsResult<Self> {
        params.validate()?;

        let points = &ingested.points;
        let selection = Selection::apply(points, params.date, &params.ids);

        let color_by = params.color_by;
        let map = MapView::build(&selection, params);
        let stats = DescriptiveStats::compute(selection.on_date.iter().map(|r| color_by.value(r)));
        let histogram = Histogram::build(
            selection.on_date.iter().map(|r| color_by.value(r)),
            params.bin_width as f64,
        );
        let time_series = TimeSeriesView::build(&selection.time_series, &selection.ids, params.trend);

        if let Some(velocity) = time_series.trend.as_ref().and_then(|t| t.velocity) {
            log::debug!("Selection velocity: {}", velocity);
        }

        Ok(Self {
            point_count: ingested.effective_n,
            warning: ingested.warning,
            dates: points.dates(),
            selected_date: selection.date,
            selected_ids: selection.ids.clone(),
            selected_points: selection.table(),
            map,
            time_series,
            stats,
            histogram,
            baseline: BaselineChart::build(&ingested.baseline),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(ps_id: PsId, day: i64, displacement_mm: f64) -> ScattererEpochRecord {
        ScattererEpochRecord {
            ps_id,
            longitude: 120.0 + ps_id as f64,
            latitude: 14.0 + ps_id as f64,
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(day),
            displacement_mm,
            average_mm: ps_id as f64 * -1.5,
        }
    }

    #[test]
    fn test_histogram_alignment() {
        let hist = Histogram::build([0.2, 0.7, 1.1, 3.9, -0.5], 1.0);
        let starts: Vec<f64> = hist.bins.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![-1.0, 0.0, 1.0, 2.0, 3.0]);
        let counts: Vec<usize> = hist.bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 1, 0, 1]);
        assert_eq!(hist.total(), 5);

        assert!(Histogram::build(Vec::<f64>::new(), 2.0).bins.is_empty());
    }

    #[test]
    fn test_histogram_outlier_keeps_occupied_bins() {
        let hist = Histogram::build([0.5, 1.5, 1e9, f64::NAN], 1.0);
        assert_eq!(hist.bins.len(), 3);
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.bins[2].start, 1e9);

        // the widest contiguous span still gets empty bins filled in
        let edge = Histogram::build([0.5, (MAX_HISTOGRAM_BINS - 1) as f64 + 0.5], 1.0);
        assert_eq!(edge.bins.len(), MAX_HISTOGRAM_BINS as usize);
        assert_eq!(edge.total(), 2);
    }

    #[test]
    fn test_descriptive_stats() {
        let stats = DescriptiveStats::compute([1.0, -2.0, 4.0]).unwrap();
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.min, -2.0);
        assert_relative_eq!(stats.mean, 1.0);
        assert!(DescriptiveStats::compute(std::iter::empty()).is_none());
    }

    #[test]
    fn test_linear_trend_velocity() {
        // 10 mm per year for both scatterers
        let mut records = Vec::new();
        for day in [0i64, 365, 730, 1095] {
            let value = day as f64 / DAYS_PER_YEAR * 10.0;
            records.push(record(1, day, value + 1.0));
            records.push(record(2, day, value - 1.0));
        }
        let points = PointSet::new(records);
        let view = TimeSeriesView::build(&points, &[2, 1], TrendMethod::LinearRegression);

        assert_eq!(view.series.len(), 2);
        assert_eq!(view.series[0].ps_id, 2);
        let trend = view.trend.unwrap();
        assert_eq!(trend.points.len(), 4);
        let velocity = trend.velocity.unwrap();
        assert_relative_eq!(velocity.mm_per_year, 10.0, epsilon = 1e-9);
        assert_relative_eq!(velocity.stderr.unwrap(), 0.0, epsilon = 1e-9);

        let (lo, hi) = view.x_domain.unwrap();
        assert_eq!(lo, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() - Duration::days(60));
        assert_eq!(hi - lo, Duration::days(1095 + 60 + 120));
    }

    #[test]
    fn test_loess_trend_has_no_velocity() {
        let records = (0..8).map(|d| record(1, d * 12, d as f64)).collect();
        let view = TimeSeriesView::build(&PointSet::new(records), &[1], TrendMethod::Loess);
        let trend = view.trend.unwrap();
        assert!(trend.velocity.is_none());
        assert_eq!(trend.points.len(), 8);
    }

    #[test]
    fn test_map_view_center_and_average_colouring() {
        let points = PointSet::new(vec![record(0, 0, 1.0), record(2, 0, 3.0)]);
        let selection = Selection::apply(&points, None, &[2]);
        let params = ViewParams {
            color_by: ColorBy::Average,
            ..ViewParams::default()
        };
        let map = MapView::build(&selection, &params);
        assert_eq!(map.points.len(), 2);
        assert_eq!(map.center, Some((121.0, 15.0)));
        assert_eq!(map.points[1].value, -3.0);
        assert_eq!(map.highlighted.len(), 1);
        assert_eq!(map.highlight_marker_size, DEFAULT_MARKER_SIZE + 5);
        assert_eq!(map.style, "carto-darkmatter");
        assert_eq!(map.color_scale, "Electric");
        assert_eq!(map.colorbar_title, "Mean LOS Displacement (mm/yr)");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("open-street-map".parse::<MapStyle>().unwrap(), MapStyle::OpenStreetMap);
        assert_eq!("viridis".parse::<ColorScale>().unwrap(), ColorScale::Viridis);
        assert_eq!("average".parse::<ColorBy>().unwrap(), ColorBy::Average);
        assert!("plasma".parse::<ColorScale>().is_err());
        assert_eq!(ColorScale::default(), ColorScale::Electric);
        assert_eq!(ViewParams::default().color_scale, ColorScale::Electric);
    }

    #[test]
    fn test_view_params_bounds() {
        assert!(ViewParams::default().validate().is_ok());
        let too_big = ViewParams {
            marker_size: 16,
            ..ViewParams::default()
        };
        assert!(too_big.validate().is_err());
        let zero_bins = ViewParams {
            bin_width: 0,
            ..ViewParams::default()
        };
        assert!(zero_bins.validate().is_err());
    }
}
