pub mod containment;
pub mod crs;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod fields;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod summary;
pub mod writer;
pub mod zip_handler;

pub use engine::{Crs, GeometryEngine, Layer};
pub use error::{Error, Result};
pub use model::{Issue, IssueSet, MapMarker, MapOverlay, ParcelRecord, ParcelResult};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use registry::Registry;
pub use summary::Summary;
pub use zip_handler::{CleanupPolicy, ScratchDir, ZipHandler};

#[cfg(feature = "gdal")]
pub use engine::GdalEngine;
