//! # horizon-types
//!
//! Core temporal key types for the horizon historical cache.
//!
//! - **Timestamp**: a totally ordered, `Copy` point in time with nanosecond
//!   resolution
//! - **TimeUnit**: calendar-free units used to step a timestamp forward or back
//!
//! All types are serializable with Serde.
//!
//! ## Examples
//!
//! ```rust
//! use horizon_types::timestamp::{TimeUnit, Timestamp};
//!
//! let open = Timestamp::from_secs(1_700_000_000);
//! let close = open.add_unit(TimeUnit::Hours, 8);
//! assert!(open.is_before(&close));
//! ```

pub mod timestamp;

pub use timestamp::{TimeUnit, Timestamp};
