//! Media loading for outbound attachments: fetch a URL or read a local path,
//! enforce a size cap, report the content type.

pub mod error;
pub mod mime;
pub mod store;

pub use {
    error::{Error, Result},
    store::{DEFAULT_MAX_BYTES, MediaBlob, MediaStore},
};
