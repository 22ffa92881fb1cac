use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Line-of-sight displacement in millimetres
pub type Millimetres = f64;

/// Stable scatterer identifier (row position in the source matrix)
pub type PsId = u32;

/// One persistent scatterer observed at one acquisition date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScattererEpochRecord {
    pub ps_id: PsId,
    pub longitude: f64,
    pub latitude: f64,
    pub date: NaiveDate,
    /// LOS displacement relative to the reference acquisition, 2 decimals
    pub displacement_mm: Millimetres,
    /// Precomputed mean value for the scatterer, 2 decimals
    pub average_mm: Millimetres,
}

/// Whether an acquisition is the interferometric reference or a secondary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionRole {
    Reference,
    Secondary,
}

impl std::fmt::Display for AcquisitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionRole::Reference => write!(f, "Reference"),
            AcquisitionRole::Secondary => write!(f, "Secondary"),
        }
    }
}

/// Baseline information for one acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub date: NaiveDate,
    pub perpendicular_baseline_m: f64,
    pub temporal_baseline_days: i64,
    pub role: AcquisitionRole,
}

/// Geospatial bounding box (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Midpoint as (lon, lat)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.max_lon + self.min_lon) / 2.0,
            (self.max_lat + self.min_lat) / 2.0,
        )
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Named numeric arrays read from the StAMPS `.mat` pair.
///
/// Day numbers use the MATLAB `datenum` convention (see [`crate::core::dates`]).
#[derive(Debug, Clone)]
pub struct StampsArrays {
    /// Scatterer positions, N x 2 (lon, lat)
    pub lonlat: Array2<f64>,
    /// Displacement per secondary epoch, N x E (mm)
    pub ph_mm: Array2<f64>,
    /// Secondary acquisition day numbers, length E
    pub day: Vec<i64>,
    /// Reference acquisition day number
    pub master_day: i64,
    /// Perpendicular baselines, length E, or E + 1 when the reference is included
    pub bperp: Vec<f64>,
    /// Mean displacement per scatterer, length N
    pub ph_disp: Vec<f64>,
}

impl StampsArrays {
    pub fn scatterer_count(&self) -> usize {
        self.lonlat.nrows()
    }

    pub fn epoch_count(&self) -> usize {
        self.day.len()
    }

    /// Check that the arrays describe one consistent dataset
    pub fn validate(&self) -> PsResult<()> {
        if self.lonlat.ncols() != 2 {
            return Err(PsError::Format(format!(
                "lonlat must have 2 columns, found {}",
                self.lonlat.ncols()
            )));
        }

        let n = self.scatterer_count();
        if self.ph_mm.nrows() != n {
            return Err(PsError::Format(format!(
                "ph_mm has {} rows but lonlat has {}",
                self.ph_mm.nrows(),
                n
            )));
        }

        if self.ph_mm.ncols() != self.day.len() {
            return Err(PsError::Format(format!(
                "ph_mm has {} epoch columns but day has {} entries",
                self.ph_mm.ncols(),
                self.day.len()
            )));
        }

        if self.ph_disp.len() != n {
            return Err(PsError::Format(format!(
                "ph_disp has {} values but there are {} scatterers",
                self.ph_disp.len(),
                n
            )));
        }

        let e = self.epoch_count();
        let expected = if self.day.contains(&self.master_day) { e } else { e + 1 };
        if self.bperp.len() != e && self.bperp.len() != expected {
            return Err(PsError::Format(format!(
                "bperp has {} values, expected {} or {}",
                self.bperp.len(),
                e,
                expected
            )));
        }

        Ok(())
    }
}

/// Long-form table of scatterer/epoch rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    pub records: Vec<ScattererEpochRecord>,
}

impl PointSet {
    pub fn new(records: Vec<ScattererEpochRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScattererEpochRecord> {
        self.records.iter()
    }

    /// Keep the rows matching `predicate`, preserving order
    pub fn filtered<F>(&self, mut predicate: F) -> PointSet
    where
        F: FnMut(&ScattererEpochRecord) -> bool,
    {
        PointSet::new(self.records.iter().filter(|r| predicate(r)).cloned().collect())
    }

    /// Distinct dates in ascending order
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.records.iter().map(|r| r.date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Distinct scatterer ids in row order
    pub fn ids_in_order(&self) -> Vec<PsId> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.ps_id))
            .map(|r| r.ps_id)
            .collect()
    }

    /// Extent of the point positions, `None` when empty
    pub fn extent(&self) -> Option<BoundingBox> {
        let first = self.records.first()?;
        let init = BoundingBox {
            min_lon: first.longitude,
            max_lon: first.longitude,
            min_lat: first.latitude,
            max_lat: first.latitude,
        };
        Some(self.records.iter().fold(init, |b, r| BoundingBox {
            min_lon: b.min_lon.min(r.longitude),
            max_lon: b.max_lon.max(r.longitude),
            min_lat: b.min_lat.min(r.latitude),
            max_lat: b.max_lat.max(r.latitude),
        }))
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a ScattererEpochRecord;
    type IntoIter = std::slice::Iter<'a, ScattererEpochRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Per-acquisition baseline table, sorted by date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineTable {
    pub records: Vec<BaselineRecord>,
}

impl BaselineTable {
    pub fn reference(&self) -> Option<&BaselineRecord> {
        self.records
            .iter()
            .find(|r| r.role == AcquisitionRole::Reference)
    }

    pub fn secondary_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.role == AcquisitionRole::Secondary)
            .count()
    }
}

/// Non-fatal notice that the requested sample size was clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingWarning {
    pub requested: usize,
    pub adjusted: usize,
}

impl std::fmt::Display for SamplingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Maximum value exceeds dataset size! Maximum value adjusted to {}",
            self.adjusted
        )
    }
}

/// Error types for PS-InSAR ingestion and export
#[derive(Debug, thiserror::Error)]
pub enum PsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    Format(String),

    #[error("Boundary error: {0}")]
    Boundary(String),

    #[error("Invalid selection: {0}")]
    Selection(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Export is disabled in this deployment")]
    ExportDisabled,

    #[error("Another export is already running")]
    ExportBusy,

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for PS-InSAR operations
pub type PsResult<T> = Result<T, PsError>;

