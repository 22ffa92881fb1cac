use crate::core::baseline::BaselineTableBuilder;
use crate::core::point_set::PointSetBuilder;
use crate::core::sampler::Sampler;
use crate::core::spatial_filter::{Region, SpatialFilter};
use crate::io::{Boundary, StampsReader};
use crate::types::{
    BaselineTable, PointSet, PsError, PsResult, SamplingWarning, StampsArrays,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Default cap on the number of rows handed to the views
pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Largest cap accepted from the point-count control
pub const MAX_POINTS_LIMIT: usize = 50_000;

/// How long an ingestion result stays cached
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Ingestion parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestParams {
    /// Maximum rows to keep, `None` for the full dataset
    pub max_points: Option<usize>,
    /// Vector file restricting processing to the area inside it
    pub subset: Option<PathBuf>,
    /// Vector file whose first feature excludes the area inside it
    pub mask: Option<PathBuf>,
    /// Seed for reproducible sampling
    pub seed: Option<u64>,
}

impl IngestParams {
    /// Parameters for the interactive views: default cap, no boundaries
    pub fn interactive() -> Self {
        Self {
            max_points: Some(DEFAULT_MAX_POINTS),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PsResult<()> {
        if let Some(n) = self.max_points {
            if n > MAX_POINTS_LIMIT {
                return Err(PsError::InvalidParameter(format!(
                    "maximum points {} exceeds the limit of {}",
                    n, MAX_POINTS_LIMIT
                )));
            }
        }
        Ok(())
    }
}

/// Output of one ingestion pass
#[derive(Debug, Clone)]
pub struct Ingested {
    /// Filtered and sampled rows
    pub points: PointSet,
    pub baseline: BaselineTable,
    /// Sample size actually used
    pub effective_n: usize,
    pub warning: Option<SamplingWarning>,
}

/// Parser -> point-set builder -> spatial filter -> sampler, plus the baseline table
pub struct IngestPipeline {
    params: IngestParams,
}

impl IngestPipeline {
    pub fn new(params: IngestParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IngestParams {
        &self.params
    }

    /// Read the `.mat` pair and boundary files, then process them
    pub fn run<P: AsRef<Path>>(&self, files: &[P]) -> PsResult<Ingested> {
        self.params.validate()?;
        let start = Instant::now();

        let arrays = StampsReader::read_pair(files)?;

        let subset = match &self.params.subset {
            Some(path) => Some(Boundary::from_path(path)?),
            None => None,
        };
        let mask = match &self.params.mask {
            Some(path) => Some(Boundary::from_path(path)?.first_feature()),
            None => None,
        };

        let ingested = self.run_arrays(
            &arrays,
            subset.as_ref().map(|b| b as &dyn Region),
            mask.as_ref().map(|b| b as &dyn Region),
        )?;

        log::info!("Ingestion finished in {:?}", start.elapsed());
        Ok(ingested)
    }

    /// Process already-parsed arrays with optional subset and mask regions
    pub fn run_arrays(
        &self,
        arrays: &StampsArrays,
        subset: Option<&dyn Region>,
        mask: Option<&dyn Region>,
    ) -> PsResult<Ingested> {
        self.params.validate()?;

        let points = PointSetBuilder::build(arrays)?;
        let points = SpatialFilter::new()
            .with_subset(subset)
            .with_mask(mask)
            .apply(points)?;

        let outcome = Sampler::new(self.params.seed).sample(points, self.params.max_points);
        let baseline = BaselineTableBuilder::build(arrays)?;

        log::info!(
            "Ingested {} rows ({} acquisitions in baseline table)",
            outcome.points.len(),
            baseline.records.len()
        );

        Ok(Ingested {
            points: outcome.points,
            baseline,
            effective_n: outcome.effective_n,
            warning: outcome.warning,
        })
    }
}

/// Identity of an input file: path, size and modification time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    pub fn of<P: AsRef<Path>>(path: P) -> PsResult<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Cache key: the input files plus every parameter that changes the result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    files: Vec<FileIdentity>,
    subset: Option<FileIdentity>,
    mask: Option<FileIdentity>,
    max_points: Option<usize>,
    seed: Option<u64>,
}

impl CacheKey {
    pub fn new<P: AsRef<Path>>(files: &[P], params: &IngestParams) -> PsResult<Self> {
        let mut identities = files
            .iter()
            .map(FileIdentity::of)
            .collect::<PsResult<Vec<_>>>()?;
        identities.sort();

        Ok(Self {
            files: identities,
            subset: params.subset.as_ref().map(FileIdentity::of).transpose()?,
            mask: params.mask.as_ref().map(FileIdentity::of).transpose()?,
            max_points: params.max_points,
            seed: params.seed,
        })
    }
}

/// Short-lived cache of ingestion results, so unchanged uploads are not re-parsed
/// on every interaction
pub struct IngestCache {
    ttl: Duration,
    entries: HashMap<CacheKey, (Instant, Arc<Ingested>)>,
}

impl Default for IngestCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl IngestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the TTL
    pub fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
    }

    /// Return a fresh cached result for `key`, or compute and store one
    pub fn get_or_insert_with<F>(&mut self, key: CacheKey, compute: F) -> PsResult<Arc<Ingested>>
    where
        F: FnOnce() -> PsResult<Ingested>,
    {
        self.evict_expired();

        if let Some((_, cached)) = self.entries.get(&key) {
            log::debug!("Ingestion cache hit");
            return Ok(Arc::clone(cached));
        }

        log::debug!("Ingestion cache miss");
        let ingested = Arc::new(compute()?);
        self.entries
            .insert(key, (Instant::now(), Arc::clone(&ingested)));
        Ok(ingested)
    }

    /// Ingest through the cache
    pub fn ingest<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        params: &IngestParams,
    ) -> PsResult<Arc<Ingested>> {
        let key = CacheKey::new(files, params)?;
        self.get_or_insert_with(key, || IngestPipeline::new(params.clone()).run(files))
    }
}
