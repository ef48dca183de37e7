pub mod configured_document;
pub mod document;
pub mod endorsed_authentication_key;
pub mod issued_document;
pub mod person;
