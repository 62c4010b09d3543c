//! Per-ecosystem package metadata extractors for depot.
//!
//! Each supported ecosystem contributes one `FormatExtractor` that turns
//! an uploaded artifact into a validated identity, canonical metadata and
//! the lead file to store. Extractors are independent of each other and
//! assembled into an explicit `ExtractorSet` at startup.

pub mod arch;
pub mod composer;
pub mod conan;
pub mod error;
pub mod extractor;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod pypi;
pub mod rubygems;

pub use error::{ExtractError, ExtractResult};
pub use extractor::{
    ExtractedFile, ExtractedPackage, ExtractorSet, FilePayload, FormatExtractor,
};
