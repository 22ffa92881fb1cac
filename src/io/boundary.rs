use crate::core::spatial_filter::Region;
use crate::types::{PsError, PsResult};
use gdal::vector::{Geometry, LayerAccess, OGRwkbGeometryType};
use gdal::Dataset;
use std::path::{Path, PathBuf};

/// WGS84, the CRS of the scatterer coordinates
pub const POINT_EPSG: i32 = 4326;

/// Point geometry at (lon, lat)
pub(crate) fn point_geometry(lon: f64, lat: f64) -> PsResult<Geometry> {
    let mut point = Geometry::empty(OGRwkbGeometryType::wkbPoint)?;
    point.set_point_2d(0, (lon, lat));
    Ok(point)
}

/// Polygon boundary read from a vector file (GeoJSON, Shapefile, GeoPackage, ...)
pub struct Boundary {
    source: PathBuf,
    geometries: Vec<Geometry>,
}

impl Boundary {
    /// Read every feature geometry from the first layer of a vector file
    pub fn from_path<P: AsRef<Path>>(path: P) -> PsResult<Self> {
        let path = path.as_ref();
        log::info!("Reading boundary from: {}", path.display());

        let dataset = Dataset::open(path).map_err(|e| {
            PsError::Boundary(format!("Failed to open {}: {}", path.display(), e))
        })?;

        if dataset.layer_count() == 0 {
            return Err(PsError::Boundary(format!(
                "{} contains no vector layers",
                path.display()
            )));
        }

        let mut layer = dataset.layer(0)?;

        match layer.spatial_ref().map(|srs| srs.auth_code()) {
            Some(Ok(POINT_EPSG)) | None => {}
            Some(Ok(code)) => log::warn!(
                "Boundary {} uses EPSG:{}, coordinates are compared as WGS84 lon/lat",
                path.display(),
                code
            ),
            Some(Err(_)) => log::warn!(
                "Boundary {} has a CRS without an EPSG code, coordinates are compared as WGS84 lon/lat",
                path.display()
            ),
        }

        let geometries: Vec<Geometry> = layer
            .features()
            .filter_map(|feature| feature.geometry().cloned())
            .collect();

        if geometries.is_empty() {
            return Err(PsError::Boundary(format!(
                "{} contains no feature geometries",
                path.display()
            )));
        }

        log::debug!("Boundary {}: {} geometries", path.display(), geometries.len());

        Ok(Self {
            source: path.to_path_buf(),
            geometries,
        })
    }

    /// Boundary holding only the first feature.
    ///
    /// Masking consults the first feature of the mask file; later features are ignored.
    pub fn first_feature(mut self) -> Self {
        if self.geometries.len() > 1 {
            log::warn!(
                "Mask {} has {} features, only the first is used",
                self.source.display(),
                self.geometries.len()
            );
            self.geometries.truncate(1);
        }
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }
}

impl Region for Boundary {
    fn covers(&self, lon: f64, lat: f64) -> PsResult<bool> {
        let point = point_geometry(lon, lat)?;
        Ok(self.geometries.iter().any(|g| g.intersects(&point)))
    }

    fn contains(&self, lon: f64, lat: f64) -> PsResult<bool> {
        let point = point_geometry(lon, lat)?;
        Ok(self.geometries.iter().any(|g| g.contains(&point)))
    }
}

impl std::fmt::Debug for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boundary")
            .field("source", &self.source)
            .field("geometries", &self.geometries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_geometry_keeps_full_precision() {
        let point = point_geometry(121.123456789012, -14.000000000001).unwrap();
        assert_eq!(point.geometry_type(), OGRwkbGeometryType::wkbPoint);
        let coords = point.get_point_vec();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].0, 121.123456789012);
        assert_eq!(coords[0].1, -14.000000000001);
    }
}
