use crate::types::{BoundingBox, PointSet, PsId, PsResult};
use std::collections::HashMap;

/// A geographic area that points can be tested against
pub trait Region {
    /// Point lies inside the region or on its edge
    fn covers(&self, lon: f64, lat: f64) -> PsResult<bool>;

    /// Point lies strictly inside the region
    fn contains(&self, lon: f64, lat: f64) -> PsResult<bool>;
}

impl Region for BoundingBox {
    fn covers(&self, lon: f64, lat: f64) -> PsResult<bool> {
        Ok(lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat)
    }

    fn contains(&self, lon: f64, lat: f64) -> PsResult<bool> {
        Ok(lon > self.min_lon && lon < self.max_lon && lat > self.min_lat && lat < self.max_lat)
    }
}

/// Subset and mask stage of the ingestion pipeline.
///
/// Subset keeps points covered by the subset region (clip semantics, edges
/// included). Mask then drops points strictly inside the mask region. Callers
/// pass only the first feature of a mask file as the mask region.
#[derive(Default)]
pub struct SpatialFilter<'a> {
    subset: Option<&'a dyn Region>,
    mask: Option<&'a dyn Region>,
}

impl<'a> SpatialFilter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subset(mut self, region: Option<&'a dyn Region>) -> Self {
        self.subset = region;
        self
    }

    pub fn with_mask(mut self, region: Option<&'a dyn Region>) -> Self {
        self.mask = region;
        self
    }

    pub fn is_noop(&self) -> bool {
        self.subset.is_none() && self.mask.is_none()
    }

    /// Apply subset, then mask. An empty result is not an error.
    pub fn apply(&self, points: PointSet) -> PsResult<PointSet> {
        if self.is_noop() {
            return Ok(points);
        }

        let before = points.len();
        let mut keep: HashMap<PsId, bool> = HashMap::new();
        let mut records = Vec::with_capacity(points.len());

        // Position is constant per scatterer, so each one is tested once
        for record in points.records {
            let kept = match keep.get(&record.ps_id) {
                Some(&kept) => kept,
                None => {
                    let kept = self.keeps(record.longitude, record.latitude)?;
                    keep.insert(record.ps_id, kept);
                    kept
                }
            };
            if kept {
                records.push(record);
            }
        }

        log::info!(
            "Spatial filter kept {} of {} rows ({} scatterers tested)",
            records.len(),
            before,
            keep.len()
        );
        if records.is_empty() {
            log::warn!("Spatial filter removed every point");
        }

        Ok(PointSet::new(records))
    }

    fn keeps(&self, lon: f64, lat: f64) -> PsResult<bool> {
        if let Some(subset) = self.subset {
            if !subset.covers(lon, lat)? {
                return Ok(false);
            }
        }
        if let Some(mask) = self.mask {
            if mask.contains(lon, lat)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
