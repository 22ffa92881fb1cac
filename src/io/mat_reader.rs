use crate::core::dates::day_from_f64;
use crate::types::{PsError, PsResult, StampsArrays};
use matfile::{MatFile, NumericData};
use ndarray::{Array2, ShapeBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A numeric array with its MATLAB dimensions, data in column-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArray {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

impl NamedArray {
    pub fn new(dims: Vec<usize>, data: Vec<f64>) -> Self {
        Self { dims, data }
    }

    /// Column vector helper
    pub fn column(data: Vec<f64>) -> Self {
        Self {
            dims: vec![data.len(), 1],
            data,
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            dims: vec![1, 1],
            data: vec![value],
        }
    }

    /// Interpret as a 2D matrix
    pub fn to_matrix(&self, name: &str) -> PsResult<Array2<f64>> {
        let (rows, cols) = match self.dims.as_slice() {
            [rows] => (*rows, 1),
            [rows, cols] => (*rows, *cols),
            dims => {
                return Err(PsError::Format(format!(
                    "{} must be 2-dimensional, found dimensions {:?}",
                    name, dims
                )))
            }
        };

        Array2::from_shape_vec((rows, cols).f(), self.data.clone())
            .map_err(|e| PsError::Format(format!("Failed to reshape {}: {}", name, e)))
    }

    /// Interpret as a vector; any shape with at most one non-singleton dimension qualifies
    pub fn to_vector(&self, name: &str) -> PsResult<Vec<f64>> {
        let non_singleton = self.dims.iter().filter(|&&d| d > 1).count();
        if non_singleton > 1 {
            return Err(PsError::Format(format!(
                "{} must be a vector, found dimensions {:?}",
                name, self.dims
            )));
        }
        Ok(self.data.clone())
    }
}

/// Source of named numeric arrays, such as a parsed `.mat` file
pub trait NamedArraySource {
    fn named_array(&self, name: &str) -> Option<NamedArray>;
}

impl NamedArraySource for MatFile {
    fn named_array(&self, name: &str) -> Option<NamedArray> {
        let array = self.find_by_name(name)?;
        let data = numeric_to_f64(array.data());
        Some(NamedArray::new(array.size().clone(), data))
    }
}

impl NamedArraySource for HashMap<String, NamedArray> {
    fn named_array(&self, name: &str) -> Option<NamedArray> {
        self.get(name).cloned()
    }
}

fn numeric_to_f64(data: &NumericData) -> Vec<f64> {
    match data {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::UInt8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::UInt16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::UInt32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::UInt64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
    }
}

fn required(source: &dyn NamedArraySource, file: &str, name: &str) -> PsResult<NamedArray> {
    source.named_array(name).ok_or_else(|| {
        PsError::Format(format!("required field '{}' missing from {} file", name, file))
    })
}

/// Reader for the pair of `.mat` files exported by the SNAP-StAMPS workflow.
///
/// The time-series file (`ps_plot_ts_v-do.mat`) carries `lonlat`, `ph_mm`,
/// `day`, `master_day` and `bperp`; the scalar file (`ps_plot_v-do.mat`)
/// carries `ph_disp`.
///
/// The two files are told apart by name only: sorted by file name, the first
/// is taken as the time-series file and the second as the scalar file. The
/// StAMPS default names satisfy this (`ps_plot_ts...` < `ps_plot_v...`).
/// Renamed files that break the ordering are reported as missing fields.
pub struct StampsReader;

impl StampsReader {
    /// Order a file pair as (time-series, scalar) by file name
    pub fn order_pair<P: AsRef<Path>>(files: &[P]) -> PsResult<(PathBuf, PathBuf)> {
        if files.len() != 2 {
            return Err(PsError::Format(format!(
                "expected exactly 2 .mat files, got {}",
                files.len()
            )));
        }

        let mut paths: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        paths.sort_by(|a, b| {
            let key_a = a.file_name().unwrap_or(a.as_os_str());
            let key_b = b.file_name().unwrap_or(b.as_os_str());
            key_a.cmp(key_b)
        });

        let scalar = paths.pop();
        let ts = paths.pop();
        match (ts, scalar) {
            (Some(ts), Some(scalar)) => {
                log::debug!(
                    "Time-series file: {}, scalar file: {}",
                    ts.display(),
                    scalar.display()
                );
                Ok((ts, scalar))
            }
            _ => Err(PsError::Format("expected exactly 2 .mat files".to_string())),
        }
    }

    /// Parse a single `.mat` file
    pub fn read_mat<P: AsRef<Path>>(path: P) -> PsResult<MatFile> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let start = std::time::Instant::now();
        let file = File::open(path)?;
        let mat = MatFile::parse(BufReader::new(file)).map_err(|e| {
            PsError::Format(format!("Failed to parse {}: {:?}", path.display(), e))
        })?;
        log::debug!(
            "Parsed {} ({} arrays) in {:?}",
            path.display(),
            mat.arrays().len(),
            start.elapsed()
        );
        Ok(mat)
    }

    /// Read both files of a StAMPS export
    pub fn read_pair<P: AsRef<Path>>(files: &[P]) -> PsResult<StampsArrays> {
        let (ts_path, scalar_path) = Self::order_pair(files)?;
        log::info!("Reading StAMPS time series from: {}", ts_path.display());
        let ts = Self::read_mat(&ts_path)?;
        log::info!("Reading StAMPS mean velocity from: {}", scalar_path.display());
        let scalar = Self::read_mat(&scalar_path)?;
        Self::from_sources(&ts, &scalar)
    }

    /// Assemble and validate the arrays from two named-array sources
    pub fn from_sources(
        ts: &dyn NamedArraySource,
        scalar: &dyn NamedArraySource,
    ) -> PsResult<StampsArrays> {
        let lonlat = required(ts, "time-series", "lonlat")?.to_matrix("lonlat")?;
        let ph_mm = required(ts, "time-series", "ph_mm")?.to_matrix("ph_mm")?;

        let day = required(ts, "time-series", "day")?
            .to_vector("day")?
            .into_iter()
            .map(day_from_f64)
            .collect::<PsResult<Vec<i64>>>()?;

        let master = required(ts, "time-series", "master_day")?.to_vector("master_day")?;
        let master_day = match master.as_slice() {
            [value] => day_from_f64(*value)?,
            values => {
                return Err(PsError::Format(format!(
                    "master_day must hold a single value, found {}",
                    values.len()
                )))
            }
        };

        let bperp = required(ts, "time-series", "bperp")?.to_vector("bperp")?;
        let ph_disp = required(scalar, "scalar", "ph_disp")?.to_vector("ph_disp")?;

        let arrays = StampsArrays {
            lonlat,
            ph_mm,
            day,
            master_day,
            bperp,
            ph_disp,
        };
        arrays.validate()?;

        log::debug!(
            "StAMPS arrays: {} scatterers x {} epochs, reference day {}",
            arrays.scatterer_count(),
            arrays.epoch_count(),
            arrays.master_day
        );
        Ok(arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_source() -> HashMap<String, NamedArray> {
        let mut map = HashMap::new();
        // 3 scatterers, column-major lon then lat
        map.insert(
            "lonlat".to_string(),
            NamedArray::new(vec![3, 2], vec![120.0, 120.1, 120.2, 14.0, 14.1, 14.2]),
        );
        map.insert(
            "ph_mm".to_string(),
            NamedArray::new(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        );
        map.insert(
            "day".to_string(),
            NamedArray::column(vec![737790.0, 737802.0]),
        );
        map.insert("master_day".to_string(), NamedArray::scalar(737796.0));
        map.insert("bperp".to_string(), NamedArray::column(vec![-20.0, 35.5]));
        map
    }

    fn scalar_source() -> HashMap<String, NamedArray> {
        let mut map = HashMap::new();
        map.insert(
            "ph_disp".to_string(),
            NamedArray::column(vec![-1.234, 0.5, 2.0]),
        );
        map
    }

    #[test]
    fn test_from_sources_column_major() {
        let arrays = StampsReader::from_sources(&ts_source(), &scalar_source()).unwrap();
        assert_eq!(arrays.scatterer_count(), 3);
        assert_eq!(arrays.epoch_count(), 2);
        assert_eq!(arrays.lonlat[[1, 0]], 120.1);
        assert_eq!(arrays.lonlat[[1, 1]], 14.1);
        assert_eq!(arrays.ph_mm[[2, 1]], 6.0);
        assert_eq!(arrays.master_day, 737796);
    }

    #[test]
    fn test_missing_field() {
        let mut ts = ts_source();
        ts.remove("ph_mm");
        let err = StampsReader::from_sources(&ts, &scalar_source()).unwrap_err();
        assert!(matches!(err, PsError::Format(ref msg) if msg.contains("ph_mm")));
    }

    #[test]
    fn test_row_count_mismatch() {
        let mut ts = ts_source();
        ts.insert(
            "lonlat".to_string(),
            NamedArray::new(vec![2, 2], vec![120.0, 120.1, 14.0, 14.1]),
        );
        let result = StampsReader::from_sources(&ts, &scalar_source());
        assert!(matches!(result, Err(PsError::Format(_))));
    }

    #[test]
    fn test_multiple_master_days_rejected() {
        let mut ts = ts_source();
        ts.insert(
            "master_day".to_string(),
            NamedArray::column(vec![737796.0, 737797.0]),
        );
        assert!(StampsReader::from_sources(&ts, &scalar_source()).is_err());
    }

    #[test]
    fn test_order_pair_by_file_name() {
        let files = ["/data/b/ps_plot_v-do.mat", "/data/a/ps_plot_ts_v-do.mat"];
        let (ts, scalar) = StampsReader::order_pair(&files).unwrap();
        assert!(ts.ends_with("ps_plot_ts_v-do.mat"));
        assert!(scalar.ends_with("ps_plot_v-do.mat"));

        assert!(StampsReader::order_pair(&files[..1]).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = StampsReader::read_mat("nonexistent.mat");
        assert!(matches!(result, Err(PsError::Io(_))));
    }
}
