//! Session messages for the credential lifecycle flows: provisioning,
//! authentication-key certification, update and deletion. All of these are
//! CBOR maps carrying their type in a `messageType` entry and, except for the
//! flow-initiating messages, the session in an `eSessionId` entry.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use serde_with::skip_serializing_none;

use crate::{
    issuer::server_state::SessionId,
    utils::cose::{CoseKey, CoseSign1},
};

use super::mdocs::{AccessControlProfiles, DocType, ProvisionedNameSpaces};

// Provisioning flow

pub const START_PROVISIONING_MSG_TYPE: &str = "StartProvisioning";
pub const PROVISIONING_REQUEST_MSG_TYPE: &str = "com.android.identity_credential.StartProvisioning";
pub const SET_CERTIFICATE_CHAIN_MSG_TYPE: &str = "com.android.identity_credential.SetCertificateChain";
pub const SET_PROOF_OF_PROVISIONING_MSG_TYPE: &str = "com.android.identity_credential.SetProofOfProvisioning";

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename = "StartProvisioning")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct StartProvisioningMessage {
    pub provisioning_code: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "ReadyToProvisionMessage")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct ReadyToProvisionMessage {
    pub e_session_id: SessionId,
}

/// Follows [`ReadyToProvisionMessage`]; requests the challenge and doc type
/// for the document under provisioning.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.StartProvisioning")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequestMessage {
    pub e_session_id: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.ProvisioningResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResponseMessage {
    pub e_session_id: SessionId,
    pub challenge: ByteBuf,
    pub doc_type: DocType,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.SetCertificateChain")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct SetCertificateChainMessage {
    pub e_session_id: SessionId,
    pub credential_key_certificate_chain: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DataToProvisionMessage")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DataToProvisionMessage {
    pub e_session_id: SessionId,
    pub access_control_profiles: AccessControlProfiles,
    pub name_spaces: ProvisionedNameSpaces,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.SetProofOfProvisioning")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct SetProofOfProvisioningMessage {
    pub e_session_id: SessionId,
    pub proof_of_provisioning_signature: CoseSign1,
}

// CertifyAuthKeys flow

pub const CERTIFY_AUTH_KEYS_MSG_TYPE: &str = "com.android.identity_credential.CertifyAuthKeys";
pub const CERTIFY_AUTH_KEYS_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE: &str =
    "com.android.identity_credential.CertifyAuthKeysProveOwnershipResponse";
pub const CERTIFY_AUTH_KEYS_SEND_CERTS_MSG_TYPE: &str = "com.android.identity_credential.CertifyAuthKeysSendCerts";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeys")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysMessage {
    pub credential_key: CoseKey,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeysProveOwnership")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysProveOwnershipMessage {
    pub e_session_id: SessionId,
    pub challenge: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeysProveOwnershipResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysProveOwnershipResponseMessage {
    pub e_session_id: SessionId,
    pub proof_of_ownership_signature: CoseSign1,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeysReady")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysReadyMessage {
    pub e_session_id: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeysSendCerts")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysSendCertsMessage {
    pub e_session_id: SessionId,
    pub auth_key_certs: Vec<ByteBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.CertifyAuthKeysResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct CertifyAuthKeysResponseMessage {
    pub e_session_id: SessionId,
    pub static_auth_datas: Vec<ByteBuf>,
}

// Update flow

pub const UPDATE_CREDENTIAL_MSG_TYPE: &str = "com.android.identity_credential.UpdateCredential";
pub const UPDATE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE: &str =
    "com.android.identity_credential.UpdateCredentialProveOwnershipResponse";
pub const UPDATE_CREDENTIAL_GET_DATA_TO_UPDATE_MSG_TYPE: &str =
    "com.android.identity_credential.UpdateCredentialGetDataToUpdate";
pub const UPDATE_CREDENTIAL_SET_PROOF_OF_PROVISIONING_MSG_TYPE: &str =
    "com.android.identity_credential.UpdateCredentialSetProofOfProvisioning";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredential")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialMessage {
    pub credential_key: CoseKey,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialProveOwnership")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialProveOwnershipMessage {
    pub e_session_id: SessionId,
    pub challenge: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialProveOwnershipResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialProveOwnershipResponseMessage {
    pub e_session_id: SessionId,
    pub proof_of_ownership_signature: CoseSign1,
}

/// The issuer's decision on whether this wallet instance must update, delete,
/// or leave its copy of the document as is.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCredentialResult {
    NoUpdate,
    Update,
    Delete,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialResponseMessage {
    pub e_session_id: SessionId,
    pub update_credential_result: UpdateCredentialResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialGetDataToUpdate")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialGetDataToUpdateMessage {
    pub e_session_id: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialDataToProvisionMessage")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialDataToProvisionMessage {
    pub e_session_id: SessionId,
    pub access_control_profiles: AccessControlProfiles,
    pub name_spaces: ProvisionedNameSpaces,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.UpdateCredentialSetProofOfProvisioning")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialSetProofOfProvisioningMessage {
    pub e_session_id: SessionId,
    pub proof_of_provisioning_signature: CoseSign1,
}

// Delete flow

pub const DELETE_CREDENTIAL_MSG_TYPE: &str = "com.android.identity_credential.DeleteCredential";
pub const DELETE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE: &str =
    "com.android.identity_credential.DeleteCredentialProveOwnershipResponse";
pub const DELETE_CREDENTIAL_DELETED_MSG_TYPE: &str = "com.android.identity_credential.DeleteCredentialDeleted";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DeleteCredential")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialMessage {
    pub credential_key: CoseKey,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DeleteCredentialProveOwnership")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialProveOwnershipMessage {
    pub e_session_id: SessionId,
    pub challenge: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DeleteCredentialProveOwnershipResponse")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialProveOwnershipResponseMessage {
    pub e_session_id: SessionId,
    pub proof_of_ownership_signature: CoseSign1,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DeleteCredentialReadyForDeletion")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialReadyForDeletionMessage {
    pub e_session_id: SessionId,
    pub challenge: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "com.android.identity_credential.DeleteCredentialDeleted")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialDeletedMessage {
    pub e_session_id: SessionId,
    pub proof_of_deletion_signature: CoseSign1,
}

// Session termination

pub const REQUEST_END_SESSION_MSG_TYPE: &str = "RequestEndSession";
pub const END_SESSION_MSG_TYPE: &str = "EndSessionMessage";

pub const END_SESSION_REASON_SUCCESS: &str = "Success";
pub const END_SESSION_REASON_FAILED: &str = "Failed";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "RequestEndSession")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct RequestEndSessionMessage {
    pub e_session_id: SessionId,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename = "EndSessionMessage")]
#[serde(tag = "messageType")]
#[serde(rename_all = "camelCase")]
pub struct EndSessionMessage {
    pub e_session_id: SessionId,
    pub reason: String,
    pub detail: Option<String>,
}
