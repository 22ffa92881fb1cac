use crate::core::pipeline::{IngestParams, IngestPipeline};
use crate::io::boundary::{point_geometry, POINT_EPSG};
use crate::types::{BoundingBox, GeoTransform, PointSet, PsError, PsId, PsResult};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DriverManager, LayerOptions};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Environment variable that disables export in hosted deployments
pub const DEPLOYMENT_ENV: &str = "DEPLOYMENT";

/// Name of the intermediate point layer written next to the raster
pub const POINT_LAYER_NAME: &str = "points";

/// Degrees added around a zero-width extent
const MIN_EXTENT_PAD_DEG: f64 = 0.0005;

// Outputs go to fixed paths, so only one export may run at a time
static EXPORT_LOCK: Mutex<()> = Mutex::new(());

/// Deployment switches read from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub export_enabled: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            export_enabled: true,
        }
    }
}

impl DeploymentConfig {
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(DEPLOYMENT_ENV).ok().as_deref())
    }

    /// A truthy `DEPLOYMENT` value marks a hosted deployment
    pub fn from_value(value: Option<&str>) -> Self {
        let hosted = value
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            export_enabled: !hosted,
        }
    }
}

/// Raster export parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    pub output_dir: PathBuf,
    pub raster_name: String,
    /// Grid size in cells
    pub width: usize,
    pub height: usize,
    /// Inverse distance weighting power
    pub power: f64,
    /// Smoothing distance added to every sample distance (degrees)
    pub smoothing: f64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("export"),
            raster_name: "velocity.tif".to_string(),
            width: 256,
            height: 256,
            power: 2.0,
            smoothing: 0.0,
        }
    }
}

impl ExportParams {
    pub fn validate(&self) -> PsResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PsError::InvalidParameter(format!(
                "grid size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.power.is_nan() || self.power <= 0.0 || self.smoothing.is_nan() || self.smoothing < 0.0 {
            return Err(PsError::InvalidParameter(format!(
                "power {} must be positive and smoothing {} non-negative",
                self.power, self.smoothing
            )));
        }
        Ok(())
    }

    pub fn raster_path(&self) -> PathBuf {
        self.output_dir.join(&self.raster_name)
    }

    pub fn vector_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.shp", POINT_LAYER_NAME))
    }
}

/// What an export run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub rows_written: usize,
    pub scatterers_interpolated: usize,
    pub vector_path: PathBuf,
    pub raster_path: PathBuf,
}

/// Claim the process-wide export slot, failing fast if it is taken
pub fn try_lock_export() -> PsResult<MutexGuard<'static, ()>> {
    match EXPORT_LOCK.try_lock() {
        Ok(guard) => Ok(guard),
        // a panicked export leaves nothing to protect
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => Err(PsError::ExportBusy),
    }
}

/// Layer and field names of the in-memory sample layer handed to the gridder
const SAMPLE_LAYER_NAME: &str = "samples";
const SAMPLE_FIELD: &str = "ave_mm";

/// GDAL `invdist` gridding onto a regular lon/lat grid
pub struct IdwInterpolator {
    pub power: f64,
    pub smoothing: f64,
}

impl IdwInterpolator {
    pub fn new(power: f64, smoothing: f64) -> Self {
        Self { power, smoothing }
    }

    /// Grid covering `extent` (north-up), with its geotransform.
    ///
    /// The samples are loaded into an in-memory point layer and gridded by
    /// `GDALGrid` with the inverse distance to a power algorithm.
    pub fn grid(
        &self,
        samples: &[(f64, f64, f64)],
        extent: &BoundingBox,
        width: usize,
        height: usize,
    ) -> PsResult<(Array2<f32>, GeoTransform)> {
        if samples.is_empty() {
            return Err(PsError::Export("no points to interpolate".to_string()));
        }

        let extent = padded(extent);
        log::debug!(
            "invdist grid {}x{} over [{}, {}] x [{}, {}], {} samples",
            width,
            height,
            extent.min_lon,
            extent.max_lon,
            extent.min_lat,
            extent.max_lat,
            samples.len()
        );

        let source = sample_layer(samples)?;
        let args = vec![
            "-of".to_string(),
            "MEM".to_string(),
            "-l".to_string(),
            SAMPLE_LAYER_NAME.to_string(),
            "-zfield".to_string(),
            SAMPLE_FIELD.to_string(),
            "-a".to_string(),
            format!("invdist:power={}:smoothing={}", self.power, self.smoothing),
            "-txe".to_string(),
            extent.min_lon.to_string(),
            extent.max_lon.to_string(),
            // max before min gives a negative pixel height
            "-tye".to_string(),
            extent.max_lat.to_string(),
            extent.min_lat.to_string(),
            "-outsize".to_string(),
            width.to_string(),
            height.to_string(),
            "-ot".to_string(),
            "Float32".to_string(),
        ];
        let grid = run_gdal_grid(&source, &args)?;

        let transform = GeoTransform::from_gdal(grid.geo_transform()?);
        let buffer = grid
            .rasterband(1)?
            .read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let image = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| PsError::Export(format!("grid shape: {}", e)))?;

        Ok((image, transform))
    }
}

/// In-memory point layer with one `ave_mm` value per sample
fn sample_layer(samples: &[(f64, f64, f64)]) -> PsResult<Dataset> {
    let driver = DriverManager::get_driver_by_name("Memory")?;
    let mut dataset = driver.create_vector_only("")?;
    let srs = SpatialRef::from_epsg(POINT_EPSG as u32)?;

    let mut layer = dataset.create_layer(LayerOptions {
        name: SAMPLE_LAYER_NAME,
        srs: Some(&srs),
        ty: OGRwkbGeometryType::wkbPoint,
        ..Default::default()
    })?;
    layer.create_defn_fields(&[(SAMPLE_FIELD, OGRFieldType::OFTReal)])?;

    for &(lon, lat, value) in samples {
        layer.create_feature_fields(
            point_geometry(lon, lat)?,
            &[SAMPLE_FIELD],
            &[FieldValue::RealValue(value)],
        )?;
    }

    Ok(dataset)
}

/// Run the `GDALGrid` utility over `source` into an in-memory raster
fn run_gdal_grid(source: &Dataset, args: &[String]) -> PsResult<Dataset> {
    let c_args = args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PsError::Export(format!("gridding option: {}", e)))?;
    let mut argv: Vec<*mut c_char> = c_args.iter().map(|a| a.as_ptr() as *mut c_char).collect();
    argv.push(ptr::null_mut());
    let dest = CString::new("").map_err(|e| PsError::Export(e.to_string()))?;

    unsafe {
        let options = gdal_sys::GDALGridOptionsNew(argv.as_mut_ptr(), ptr::null_mut());
        if options.is_null() {
            return Err(PsError::Export(format!(
                "invalid gridding options: {}",
                last_gdal_error()
            )));
        }

        let mut usage_error: c_int = 0;
        let handle = gdal_sys::GDALGrid(dest.as_ptr(), source.c_dataset(), options, &mut usage_error);
        gdal_sys::GDALGridOptionsFree(options);

        if handle.is_null() {
            return Err(PsError::Export(format!(
                "GDALGrid failed: {}",
                last_gdal_error()
            )));
        }
        Ok(Dataset::from_c_dataset(handle))
    }
}

fn last_gdal_error() -> String {
    unsafe {
        let msg = gdal_sys::CPLGetLastErrorMsg();
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn padded(extent: &BoundingBox) -> BoundingBox {
    let mut extent = *extent;
    if extent.width() <= 0.0 {
        extent.min_lon -= MIN_EXTENT_PAD_DEG;
        extent.max_lon += MIN_EXTENT_PAD_DEG;
    }
    if extent.height() <= 0.0 {
        extent.min_lat -= MIN_EXTENT_PAD_DEG;
        extent.max_lat += MIN_EXTENT_PAD_DEG;
    }
    extent
}

/// One (lon, lat, average) sample per scatterer
pub fn scatterer_samples(points: &PointSet) -> Vec<(f64, f64, f64)> {
    let mut by_id: BTreeMap<PsId, (f64, f64, f64)> = BTreeMap::new();
    for r in points {
        by_id
            .entry(r.ps_id)
            .or_insert((r.longitude, r.latitude, r.average_mm));
    }
    by_id.into_values().collect()
}

/// Write the point set as an ESRI Shapefile point layer, dates as ISO text
pub fn write_point_layer<P: AsRef<Path>>(points: &PointSet, path: P) -> PsResult<()> {
    let path = path.as_ref();
    log::info!("Writing {} points to {}", points.len(), path.display());

    for ext in ["shp", "shx", "dbf", "prj", "cpg"] {
        let sidecar = path.with_extension(ext);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)?;
        }
    }

    let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
    let mut dataset = driver.create_vector_only(path)?;
    let srs = SpatialRef::from_epsg(POINT_EPSG as u32)?;

    let mut layer = dataset.create_layer(LayerOptions {
        name: POINT_LAYER_NAME,
        srs: Some(&srs),
        ty: OGRwkbGeometryType::wkbPoint,
        ..Default::default()
    })?;

    layer.create_defn_fields(&[
        ("ps_id", OGRFieldType::OFTInteger64),
        ("date", OGRFieldType::OFTString),
        ("disp_mm", OGRFieldType::OFTReal),
        ("ave_mm", OGRFieldType::OFTReal),
    ])?;

    let fields = ["ps_id", "date", "disp_mm", "ave_mm"];
    for r in points {
        layer.create_feature_fields(
            point_geometry(r.longitude, r.latitude)?,
            &fields,
            &[
                FieldValue::Integer64Value(r.ps_id as i64),
                FieldValue::StringValue(r.date.format("%Y-%m-%d").to_string()),
                FieldValue::RealValue(r.displacement_mm),
                FieldValue::RealValue(r.average_mm),
            ],
        )?;
    }

    Ok(())
}

/// Save a single-band Float32 GeoTIFF in WGS84
pub fn save_geotiff<P: AsRef<Path>>(
    image: &Array2<f32>,
    transform: &GeoTransform,
    output_path: P,
) -> PsResult<()> {
    log::info!("Saving raster as GeoTIFF: {}", output_path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = image.dim();

    let mut dataset = driver.create_with_band_type::<f32, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(POINT_EPSG as u32)?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<f32> = image.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;

    Ok(())
}

/// Rasterises scatterer velocities from the complete dataset
pub struct Exporter {
    params: ExportParams,
    deployment: DeploymentConfig,
}

impl Exporter {
    /// Exporter honouring the `DEPLOYMENT` environment flag
    pub fn new(params: ExportParams) -> Self {
        Self {
            params,
            deployment: DeploymentConfig::from_env(),
        }
    }

    pub fn with_deployment(mut self, deployment: DeploymentConfig) -> Self {
        self.deployment = deployment;
        self
    }

    pub fn params(&self) -> &ExportParams {
        &self.params
    }

    /// Re-ingest the full dataset (no sampling, subset or mask) and export it
    pub fn export<P: AsRef<Path>>(&self, files: &[P]) -> PsResult<ExportReport> {
        self.check_allowed()?;
        let _guard = try_lock_export()?;

        let ingested = IngestPipeline::new(IngestParams::default()).run(files)?;
        self.write_outputs(&ingested.points)
    }

    /// Export an already ingested point set
    pub fn export_points(&self, points: &PointSet) -> PsResult<ExportReport> {
        self.check_allowed()?;
        let _guard = try_lock_export()?;
        self.write_outputs(points)
    }

    fn check_allowed(&self) -> PsResult<()> {
        if !self.deployment.export_enabled {
            return Err(PsError::ExportDisabled);
        }
        self.params.validate()
    }

    fn write_outputs(&self, points: &PointSet) -> PsResult<ExportReport> {
        let start = std::time::Instant::now();
        std::fs::create_dir_all(&self.params.output_dir).map_err(|e| {
            PsError::Export(format!(
                "creating output directory {}: {}",
                self.params.output_dir.display(),
                e
            ))
        })?;

        let vector_path = self.params.vector_path();
        write_point_layer(points, &vector_path)
            .map_err(|e| PsError::Export(format!("writing point layer: {}", e)))?;

        let samples = scatterer_samples(points);
        let extent = points
            .extent()
            .ok_or_else(|| PsError::Export("no points to interpolate".to_string()))?;

        let interpolator = IdwInterpolator::new(self.params.power, self.params.smoothing);
        let (grid, transform) = interpolator
            .grid(&samples, &extent, self.params.width, self.params.height)
            .map_err(|e| PsError::Export(format!("interpolating raster: {}", e)))?;

        let raster_path = self.params.raster_path();
        save_geotiff(&grid, &transform, &raster_path)
            .map_err(|e| PsError::Export(format!("writing raster: {}", e)))?;

        log::info!(
            "Export of {} scatterers finished in {:?}",
            samples.len(),
            start.elapsed()
        );

        Ok(ExportReport {
            rows_written: points.len(),
            scatterers_interpolated: samples.len(),
            vector_path,
            raster_path,
        })
    }
}
