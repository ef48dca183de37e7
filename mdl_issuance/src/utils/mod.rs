pub mod cose;
pub mod crypto;
pub mod serialization;
pub mod x509;
