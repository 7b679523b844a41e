//! # geomap-types
//!
//! Core value types shared by the geomap writer and reader.
//!
//! - **Cell types**: `CellEntry`, a `(level, cell id)` pair from the S2 hierarchy
//! - **Record types**: `RecordId`, the dense id assigned to every written key
//! - **Stats**: `GeoMapStats`, a serializable snapshot of an opened index
//!
//! ## Examples
//!
//! ```rust
//! use geomap_types::cell::CellEntry;
//! use s2::cellid::CellID;
//! use s2::latlng::LatLng;
//!
//! let leaf = CellID::from(&LatLng::from_degrees(40.7128, -74.0060));
//! let entry = CellEntry::from_cell_id(leaf.parent(12));
//! assert_eq!(entry.level, 12);
//! assert!(entry.parent(10).contains(&entry));
//! ```

pub mod cell;
pub mod record;
pub mod stats;

pub use cell::CellEntry;
pub use record::RecordId;
pub use stats::GeoMapStats;
