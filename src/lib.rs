//! Write-once, read-many index from S2 cell coverings to opaque keys.
//!
//! A [`GeoMapWriter`] collects `(covering, key)` records and builds a single
//! immutable file. A [`GeoMapReader`] opens that file and answers which
//! records contain, or intersect, a query covering.
//!
//! ```rust
//! use geomap::prelude::*;
//! use s2::cellid::CellID;
//! use s2::latlng::LatLng;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("regions.geomap");
//!
//! let leaf = CellID::from(&LatLng::from_degrees(40.7128, -74.0060));
//! let district = CellEntry::from_cell_id(leaf.parent(10));
//! let block = CellEntry::from_cell_id(leaf.parent(12));
//!
//! let mut writer = GeoMapWriter::new(3)?;
//! writer.write(&[district], "district")?;
//! writer.write(&[block], "block")?;
//! writer.build(&path)?;
//!
//! let reader = GeoMapReader::open(&path)?;
//! assert_eq!(reader.contains(&[block])?, vec!["district", "block"]);
//! assert_eq!(reader.contains(&[district])?, vec!["district"]);
//! assert_eq!(reader.intersects(&[district])?, vec!["district", "block"]);
//! # Ok::<(), geomap::GeoMapError>(())
//! ```

pub mod bitmap;
pub mod cell;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod reader;
pub mod storage;
pub mod writer;

pub use bitmap::IdSet;
pub use cell::{ancestors, cover_point, cover_rect, covering_from_cell_ids, is_ancestor};
pub use config::{CoveringOptions, GeoMapConfig};
pub use error::{GeoMapError, Result};
pub use index::{BucketIndex, BucketKey, SortedBuckets};
pub use query::BucketSource;
pub use reader::GeoMapReader;
pub use writer::GeoMapWriter;

pub use geomap_types::{CellEntry, GeoMapStats, RecordId};

pub use geo::{Point, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoMapError, GeoMapReader, GeoMapWriter, Result};

    pub use crate::{CellEntry, RecordId};

    pub use crate::{CoveringOptions, GeoMapConfig};

    pub use geo::{Point, Rect};
}
