pub mod issuance;
pub mod mdocs;

pub use issuance::*;
pub use mdocs::*;
