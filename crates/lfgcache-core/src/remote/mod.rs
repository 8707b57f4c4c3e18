//! Remote object service access.
//!
//! `RemoteSource` is the seam the sync engine talks to. `ParseClient`
//! implements it against a Parse-compatible REST server; tests plug in an
//! in-memory source instead, and `UnconfiguredSource` stands in when no
//! server is set up.
//!
//! Objects come back as `RawObject`s, loosely typed field maps, and are
//! turned into typed records by the functions in `decode`.

pub mod client;
pub mod decode;
pub mod error;
pub mod source;
pub mod unconfigured;

pub use client::ParseClient;
pub use decode::{decode_category, decode_listing, DecodeError, RemoteCategory};
pub use error::RemoteError;
pub use source::{RawObject, RemoteSource};
pub use unconfigured::UnconfiguredSource;
