use crate::{
    issuer::ProtocolError,
    store::StoreError,
    utils::{cose::CoseError, serialization::CborError, x509::CertificateError},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("CBOR error: {0}")]
    Cbor(#[from] CborError),
    #[error("COSE error: {0}")]
    Cose(#[from] CoseError),
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
