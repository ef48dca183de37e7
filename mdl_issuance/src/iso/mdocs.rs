//! Data structures from ISO 18013-5: the Mobile Security Object with its
//! per-element digests, and the issuer-signed items it commits to.

use ciborium::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::utils::{
    cose::{CoseKey, CoseSign1},
    serialization::{TaggedBytes, Tdate},
};

pub type DocType = String;
pub type NameSpace = String;
pub type DataElementIdentifier = String;
pub type DataElementValue = Value;
pub type DigestID = u64;

/// One data element together with the random blind and digest ID under which
/// its digest appears in the MSO. Hashed in its [`IssuerSignedItemBytes`] form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    pub random: ByteBuf,
    #[serde(rename = "digestID")]
    pub digest_id: DigestID,
    pub element_value: DataElementValue,
    pub element_identifier: DataElementIdentifier,
}

pub type IssuerSignedItemBytes = TaggedBytes<IssuerSignedItem>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueDigests(pub IndexMap<NameSpace, DigestIDs>);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DigestIDs(pub IndexMap<DigestID, ByteBuf>);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    pub device_key: CoseKey,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    pub signed: Tdate,
    pub valid_from: Tdate,
    pub valid_until: Tdate,
}

/// The MSO proper. Its digests commit the issuer to the data elements, and
/// `device_key_info` carries the AuthKey the verifier must see device
/// authentication under.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    pub version: String,
    pub digest_algorithm: String,
    pub value_digests: ValueDigests,
    pub device_key_info: DeviceKeyInfo,
    pub doc_type: DocType,
    pub validity_info: ValidityInfo,
}

impl MobileSecurityObject {
    pub const VERSION: &'static str = "1";
    pub const DIGEST_ALGORITHM: &'static str = "SHA-256";
}

pub type MobileSecurityObjectBytes = TaggedBytes<MobileSecurityObject>;

/// What the wallet stores per AuthKey: the issuer-signed items with their
/// values blanked (for selective disclosure at presentation time), plus the
/// `IssuerAuth` COSE_Sign1 over the MSO.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StaticAuthData {
    pub digest_id_mapping: IndexMap<NameSpace, Vec<IssuerSignedItemBytes>>,
    pub issuer_auth: CoseSign1,
}

/// Per-element policy the wallet enforces at presentation time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlProfile {
    pub id: u64,
    pub user_authentication_required: bool,
    pub timeout_millis: u64,
}

pub type AccessControlProfiles = Vec<AccessControlProfile>;

/// A data element as held in the catalog: name, value and the access control
/// profiles that guard it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedEntry {
    pub name: DataElementIdentifier,
    pub value: DataElementValue,
    pub access_control_profiles: Vec<u64>,
}

pub type ProvisionedNameSpaces = IndexMap<NameSpace, Vec<ProvisionedEntry>>;
