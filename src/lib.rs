//! Bidsindex – a tabular indexer for BIDS neuroimaging datasets.
//!
//! Bidsindex walks a directory tree, identifies the files that belong to a
//! BIDS dataset, parses the structured entities encoded in each file name,
//! resolves JSON sidecar metadata per the inheritance principle, and
//! assembles the results into a columnar table with a fixed, versioned
//! schema. The table can be persisted as Parquet for fast querying of large
//! multi-subject, multi-dataset collections without re-scanning the
//! filesystem.
//!
//! ## Modules
//! * [`schema`] – The versioned entity specification, its registry, and the
//!   columnar schema of the index.
//! * [`entities`] – The file name grammar ([`entities::parse_entities`]) and
//!   schema validation ([`entities::validate_entities`]).
//! * [`dataset`] – Dataset root detection, the upward locator for (possibly
//!   nested) datasets, and the recursive dataset search.
//! * [`classify`] – Deciding whether a path is a data file or a JSON
//!   sidecar.
//! * [`metadata`] – The sidecar inheritance resolver.
//! * [`index`] – The indexing run itself, synchronous or on a worker pool.
//! * [`table`] – Arrow record batches and Parquet persistence.
//! * [`config`] – Classification policy and run defaults, read from an
//!   optional config file.
//!
//! ## Quick Start
//! ```
//! use std::path::Path;
//! use bidsindex::entities::{parse_entities, validate_entities};
//! use bidsindex::schema;
//!
//! let schema = schema::active();
//! let raw = parse_entities(Path::new(
//!     "ds/sub-A01/ses-B02/func/sub-A01_ses-B02_task-rest_run-1_bold.nii.gz",
//! ));
//! let (valid, extra) = validate_entities(&raw, &schema);
//! assert_eq!(valid["task"].to_string(), "rest");
//! assert_eq!(valid["run"].as_index(), Some(1));
//! assert!(extra.is_empty());
//! ```
//!
//! ## Error handling
//! Only filesystem-level and configuration-level failures surface as
//! [`error::IndexError`]. Per-item problems (an entity value failing
//! validation, a malformed sidecar, a subject directory without files)
//! degrade to logged warnings plus a documented fallback, so a run either
//! fails fast on an unmet precondition or completes.

pub mod classify;
pub mod config;
pub mod dataset;
pub mod entities;
pub mod error;
pub mod index;
pub mod metadata;
pub mod schema;
pub mod table;
