//! psviz: ingestion and view-model engine for SNAP-StAMPS PS-InSAR results
//!
//! Reads the pair of StAMPS `.mat` exports, turns them into a long-form table of
//! scatterer/epoch rows, applies subset and mask boundaries, samples the rows for
//! interactive display, and builds the map, time-series, statistics and baseline
//! views. The full dataset can be exported as a point layer and an IDW velocity
//! raster.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionRole, BaselineRecord, BaselineTable, BoundingBox, PointSet, PsError, PsId,
    PsResult, SamplingWarning, ScattererEpochRecord, StampsArrays,
};

pub use io::{Boundary, StampsReader};
pub use crate::core::{
    Dashboard, ExportParams, Exporter, IngestCache, IngestParams, IngestPipeline, Ingested,
    ViewParams,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::baseline::BaselineTableBuilder;
    use crate::core::export::{ExportParams, Exporter};
    use crate::core::pipeline::{IngestParams, IngestPipeline};
    use crate::io::StampsReader;
    use crate::types::PsError;
    use numpy::IntoPyArray;
    use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use std::path::PathBuf;

    impl From<PsError> for PyErr {
        fn from(e: PsError) -> Self {
            match e {
                PsError::Io(_) => PyIOError::new_err(e.to_string()),
                PsError::Format(_)
                | PsError::Boundary(_)
                | PsError::Selection(_)
                | PsError::InvalidParameter(_) => PyValueError::new_err(e.to_string()),
                _ => PyRuntimeError::new_err(e.to_string()),
            }
        }
    }

    /// Read the `.mat` pair into column arrays (ps, lon, lat, displacement, ave, date)
    #[pyfunction]
    #[pyo3(signature = (files, max_points=None, subset=None, mask=None, seed=None))]
    fn read_data(
        py: Python<'_>,
        files: Vec<String>,
        max_points: Option<usize>,
        subset: Option<String>,
        mask: Option<String>,
        seed: Option<u64>,
    ) -> PyResult<PyObject> {
        let params = IngestParams {
            max_points,
            subset: subset.map(PathBuf::from),
            mask: mask.map(PathBuf::from),
            seed,
        };
        let ingested = IngestPipeline::new(params).run(&files)?;
        let points = &ingested.points;

        let dict = PyDict::new(py);
        let ps: Vec<u32> = points.iter().map(|r| r.ps_id).collect();
        let lon: Vec<f64> = points.iter().map(|r| r.longitude).collect();
        let lat: Vec<f64> = points.iter().map(|r| r.latitude).collect();
        let displacement: Vec<f64> = points.iter().map(|r| r.displacement_mm).collect();
        let ave: Vec<f64> = points.iter().map(|r| r.average_mm).collect();
        let dates: Vec<String> = points
            .iter()
            .map(|r| r.date.format("%Y-%m-%d").to_string())
            .collect();

        dict.set_item("ps", ps.into_pyarray(py).to_owned())?;
        dict.set_item("lon", lon.into_pyarray(py).to_owned())?;
        dict.set_item("lat", lat.into_pyarray(py).to_owned())?;
        dict.set_item("displacement", displacement.into_pyarray(py).to_owned())?;
        dict.set_item("ave", ave.into_pyarray(py).to_owned())?;
        dict.set_item("date", dates)?;
        dict.set_item("n", ingested.effective_n)?;
        dict.set_item("warning", ingested.warning.map(|w| w.to_string()))?;

        Ok(dict.to_object(py))
    }

    /// Baseline table as columns (date, bperp, temporal, role)
    #[pyfunction]
    fn read_baseline(py: Python<'_>, files: Vec<String>) -> PyResult<PyObject> {
        let arrays = StampsReader::read_pair(&files)?;
        let table = BaselineTableBuilder::build(&arrays)?;

        let dict = PyDict::new(py);
        let dates: Vec<String> = table
            .records
            .iter()
            .map(|r| r.date.format("%Y-%m-%d").to_string())
            .collect();
        let bperp: Vec<f64> = table
            .records
            .iter()
            .map(|r| r.perpendicular_baseline_m)
            .collect();
        let temporal: Vec<i64> = table
            .records
            .iter()
            .map(|r| r.temporal_baseline_days)
            .collect();
        let roles: Vec<String> = table.records.iter().map(|r| r.role.to_string()).collect();

        dict.set_item("date", dates)?;
        dict.set_item("bperp", bperp.into_pyarray(py).to_owned())?;
        dict.set_item("temporal", temporal.into_pyarray(py).to_owned())?;
        dict.set_item("role", roles)?;

        Ok(dict.to_object(py))
    }

    /// Export the full dataset; returns the raster path
    #[pyfunction]
    #[pyo3(signature = (files, output_dir=None, name=None))]
    fn export_data(
        files: Vec<String>,
        output_dir: Option<String>,
        name: Option<String>,
    ) -> PyResult<String> {
        let mut params = ExportParams::default();
        if let Some(dir) = output_dir {
            params.output_dir = PathBuf::from(dir);
        }
        if let Some(name) = name {
            params.raster_name = name;
        }

        let report = Exporter::new(params).export(&files)?;
        Ok(report.raster_path.to_string_lossy().into_owned())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(read_data, m)?)?;
        m.add_function(wrap_pyfunction!(read_baseline, m)?)?;
        m.add_function(wrap_pyfunction!(export_data, m)?)?;
        Ok(())
    }
}
