//! Core PS-InSAR processing modules

pub mod dates;
pub mod point_set;
pub mod spatial_filter;
pub mod sampler;
pub mod baseline;
pub mod selection;
pub mod trend;
pub mod view;
pub mod export;
pub mod pipeline;

// Re-export main types
pub use point_set::PointSetBuilder;
pub use spatial_filter::{Region, SpatialFilter};
pub use sampler::{SampleOutcome, Sampler};
pub use baseline::BaselineTableBuilder;
pub use selection::{parse_id_list, SelectedPoint, Selection};
pub use trend::{LinearFit, TrendMethod};
pub use view::{ColorBy, ColorScale, Dashboard, MapStyle, ViewParams};
pub use export::{DeploymentConfig, ExportParams, ExportReport, Exporter, IdwInterpolator};
pub use pipeline::{IngestCache, IngestParams, IngestPipeline, Ingested};
