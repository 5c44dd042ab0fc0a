//! API response wrappers

pub mod extract;
pub mod response;

pub use extract::{ValidJson, ValidPath};
pub use response::{Created, DataResponse, NoContent};
