pub mod convert;
pub mod detection;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod labels;
pub mod mask;
pub mod overlay;
pub mod review;
pub mod task;
pub mod types;
pub mod validate;

pub use convert::{convert, image_urls, ConvertOptions};
pub use detection::{Detection, ImageDetections, RawBox};
pub use document::{read_document, write_document};
pub use error::{Error, ErrorKind, Result};
pub use export::{ExportOptions, ExportSummary, Exporter};
pub use geometry::{EncodedGeometry, GeometryEncoder};
pub use labels::{active_categories, label_config};
pub use mask::Mask;
pub use review::{publish, Project, ProjectSpec, Published, ReviewBackend, UploadReceipt};
pub use task::{Prediction, Region, RegionValue, Task};
pub use types::{Annotation, Category, Dataset, Image, Info, License, Rle, Segmentation};
pub use validate::validate_dataset;
