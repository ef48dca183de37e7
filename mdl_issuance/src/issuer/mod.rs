//! Issuer software: the four credential lifecycle flows, driven by CBOR
//! session messages dispatched through [`IssuanceServer::process_message`].

use std::{sync::Arc, time::Duration};

use ciborium::value::Value;
use p256::ecdsa::VerifyingKey;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    iso::issuance::{
        EndSessionMessage, CERTIFY_AUTH_KEYS_MSG_TYPE, CERTIFY_AUTH_KEYS_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE,
        CERTIFY_AUTH_KEYS_SEND_CERTS_MSG_TYPE, DELETE_CREDENTIAL_DELETED_MSG_TYPE, DELETE_CREDENTIAL_MSG_TYPE,
        DELETE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, END_SESSION_REASON_FAILED, END_SESSION_REASON_SUCCESS,
        PROVISIONING_REQUEST_MSG_TYPE, REQUEST_END_SESSION_MSG_TYPE, SET_CERTIFICATE_CHAIN_MSG_TYPE,
        SET_PROOF_OF_PROVISIONING_MSG_TYPE, START_PROVISIONING_MSG_TYPE, UPDATE_CREDENTIAL_GET_DATA_TO_UPDATE_MSG_TYPE,
        UPDATE_CREDENTIAL_MSG_TYPE, UPDATE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE,
        UPDATE_CREDENTIAL_SET_PROOF_OF_PROVISIONING_MSG_TYPE,
    },
    store::SystemOfRecord,
    utils::{
        cose::CoseSign1,
        serialization::{cbor_deserialize, cbor_serialize, CborError},
    },
    Result,
};

pub mod certify;
pub mod delete;
pub mod provisioning;
pub mod server_state;
pub mod static_auth;
pub mod update;

use certify::CertifyAuthKeysState;
use delete::DeleteCredentialState;
use provisioning::ProvisioningState;
use server_state::{SessionId, SessionRegistry, CLEANUP_INTERVAL_SECONDS};
use update::UpdateCredentialState;

/// Challenges are fresh random byte strings of this length, minted per
/// session and bound into the proofs the wallet signs.
pub const CHALLENGE_LENGTH: usize = 16;

pub const PROOF_OF_OWNERSHIP_LABEL: &str = "ProofOfOwnership";
pub const PROOF_OF_DELETION_LABEL: &str = "ProofOfDeletion";

/// Errors on which the session is terminated with an `EndSessionMessage`
/// carrying `reason: "Failed"`.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("invalid {message_type} message: {error}")]
    InvalidMessage { message_type: String, error: String },
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("message {message_type} not expected in the current session state")]
    UnexpectedState { message_type: String },
    #[error("provisioning code has already been used")]
    ProvisioningCodeConsumed,
    #[error("malformed proof payload")]
    MalformedProof,
    #[error("proof was issued for another document type")]
    ProofDocTypeMismatch,
    #[error("proof does not answer the session challenge")]
    ProofChallengeMismatch,
}

/// Errors for which there is no session to terminate: the HTTP layer answers
/// with a plain 500.
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("request body is not a CBOR map")]
    InvalidBody,
    #[error("missing messageType")]
    MissingMessageType,
    #[error("unknown messageType {0}")]
    UnknownMessageType(String),
    #[error("missing eSessionId")]
    MissingSessionId,
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("response serialization failed: {0}")]
    Internal(#[from] CborError),
}

/// The per-flow state held by a live session.
#[derive(Debug)]
pub enum SessionData {
    Provisioning(ProvisioningState),
    CertifyAuthKeys(CertifyAuthKeysState),
    Update(UpdateCredentialState),
    Delete(DeleteCredentialState),
}

/// The outcome of one state transition. `Finish` destroys the session; with
/// no response of its own, the dispatcher answers with an `EndSessionMessage`
/// of reason `"Success"`.
pub enum Transition {
    Continue { next: SessionData, response: Vec<u8> },
    Finish { response: Option<Vec<u8>> },
}

pub(crate) fn parse_message<T: DeserializeOwned>(message_type: &str, envelope: &Value) -> Result<T> {
    envelope.deserialized().map_err(|error| {
        ProtocolError::InvalidMessage {
            message_type: message_type.to_string(),
            error: error.to_string(),
        }
        .into()
    })
}

/// Verifies a wallet-signed proof (`ProofOfOwnership` or `ProofOfDeletion`):
/// the COSE_Sign1 must verify under the CredentialKey, and its payload must be
/// a CBOR array `[label, docType, challenge, …]` answering the session's
/// outstanding challenge.
pub(crate) fn verify_proof_of_ownership(
    expected_label: &str,
    signature: &CoseSign1,
    credential_key: &VerifyingKey,
    doc_type: &str,
    challenge: &[u8],
) -> Result<()> {
    let payload = signature.payload()?;
    signature.verify(credential_key, payload)?;

    let proof: Value = cbor_deserialize(payload)?;
    let elements = proof.as_array().ok_or(ProtocolError::MalformedProof)?;
    if elements.len() < 3 {
        return Err(ProtocolError::MalformedProof.into());
    }
    if elements[0].as_text() != Some(expected_label) {
        return Err(ProtocolError::MalformedProof.into());
    }
    if elements[1].as_text() != Some(doc_type) {
        return Err(ProtocolError::ProofDocTypeMismatch.into());
    }
    if elements[2].as_bytes().map(Vec::as_slice) != Some(challenge) {
        return Err(ProtocolError::ProofChallengeMismatch.into());
    }
    Ok(())
}

/// The issuing server: catalog plus live sessions. `process_message` decodes
/// one inbound envelope, routes it to the session's flow, and encodes the
/// response. Every in-session failure is converted into an
/// `EndSessionMessage`; only envelope-level problems surface as
/// [`RequestError`].
pub struct IssuanceServer<S> {
    store: S,
    sessions: Arc<SessionRegistry>,
    cleanup_task: JoinHandle<()>,
}

impl<S> Drop for IssuanceServer<S> {
    fn drop(&mut self) {
        // Stop the task at the next .await
        self.cleanup_task.abort();
    }
}

impl<S> IssuanceServer<S>
where
    S: SystemOfRecord + Sync,
{
    pub fn new(store: S) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        IssuanceServer {
            store,
            cleanup_task: Arc::clone(&sessions).start_cleanup_task(Duration::from_secs(CLEANUP_INTERVAL_SECONDS)),
            sessions,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn process_message(&self, body: &[u8]) -> std::result::Result<Vec<u8>, RequestError> {
        let envelope: Value = cbor_deserialize(body).map_err(|_| RequestError::InvalidBody)?;
        let message_type = envelope_text(&envelope, "messageType").ok_or(RequestError::MissingMessageType)?;

        if message_type == REQUEST_END_SESSION_MSG_TYPE {
            let session_id = envelope_session_id(&envelope).ok_or(RequestError::MissingSessionId)?;
            self.sessions
                .remove(&session_id)
                .ok_or_else(|| RequestError::UnknownSession(session_id.clone()))?;
            info!("Session({session_id}): ended at client request");
            return Ok(end_session_message(&session_id, END_SESSION_REASON_SUCCESS, None)?);
        }

        let session_id = match initial_session_data(&message_type) {
            Some(data) => {
                let session_id = self.sessions.create(data);
                info!("Session({session_id}): created for {message_type}");
                session_id
            }
            None => {
                if !is_continuation_message_type(&message_type) {
                    warn!("unknown message with type '{message_type}'");
                    return Err(RequestError::UnknownMessageType(message_type));
                }
                envelope_session_id(&envelope).ok_or(RequestError::MissingSessionId)?
            }
        };

        let state = self
            .sessions
            .take(&session_id)
            .ok_or_else(|| RequestError::UnknownSession(session_id.clone()))?;

        match self.transition(&session_id, state.data, &message_type, &envelope).await {
            Ok(Transition::Continue { next, response }) => {
                self.sessions.put(session_id, next);
                Ok(response)
            }
            Ok(Transition::Finish { response }) => match response {
                Some(response) => Ok(response),
                None => Ok(end_session_message(&session_id, END_SESSION_REASON_SUCCESS, None)?),
            },
            Err(error) => {
                warn!("Session({session_id}): terminating: {error}");
                Ok(end_session_message(
                    &session_id,
                    END_SESSION_REASON_FAILED,
                    Some(error.to_string()),
                )?)
            }
        }
    }

    async fn transition(
        &self,
        session_id: &SessionId,
        data: SessionData,
        message_type: &str,
        envelope: &Value,
    ) -> Result<Transition> {
        match data {
            SessionData::Provisioning(state) => {
                provisioning::handle(&self.store, session_id, state, message_type, envelope).await
            }
            SessionData::CertifyAuthKeys(state) => {
                certify::handle(&self.store, session_id, state, message_type, envelope).await
            }
            SessionData::Update(state) => update::handle(&self.store, session_id, state, message_type, envelope).await,
            SessionData::Delete(state) => delete::handle(&self.store, session_id, state, message_type, envelope).await,
        }
    }
}

fn initial_session_data(message_type: &str) -> Option<SessionData> {
    match message_type {
        START_PROVISIONING_MSG_TYPE => Some(SessionData::Provisioning(ProvisioningState::New)),
        CERTIFY_AUTH_KEYS_MSG_TYPE => Some(SessionData::CertifyAuthKeys(CertifyAuthKeysState::New)),
        UPDATE_CREDENTIAL_MSG_TYPE => Some(SessionData::Update(UpdateCredentialState::New)),
        DELETE_CREDENTIAL_MSG_TYPE => Some(SessionData::Delete(DeleteCredentialState::New)),
        _ => None,
    }
}

fn is_continuation_message_type(message_type: &str) -> bool {
    matches!(
        message_type,
        PROVISIONING_REQUEST_MSG_TYPE
            | SET_CERTIFICATE_CHAIN_MSG_TYPE
            | SET_PROOF_OF_PROVISIONING_MSG_TYPE
            | CERTIFY_AUTH_KEYS_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE
            | CERTIFY_AUTH_KEYS_SEND_CERTS_MSG_TYPE
            | UPDATE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE
            | UPDATE_CREDENTIAL_GET_DATA_TO_UPDATE_MSG_TYPE
            | UPDATE_CREDENTIAL_SET_PROOF_OF_PROVISIONING_MSG_TYPE
            | DELETE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE
            | DELETE_CREDENTIAL_DELETED_MSG_TYPE
    )
}

fn envelope_text(envelope: &Value, key: &str) -> Option<String> {
    envelope
        .as_map()?
        .iter()
        .find(|(entry_key, _)| entry_key.as_text() == Some(key))
        .and_then(|(_, entry_value)| entry_value.as_text())
        .map(str::to_string)
}

fn envelope_session_id(envelope: &Value) -> Option<SessionId> {
    envelope_text(envelope, "eSessionId").map(SessionId::from)
}

fn end_session_message(
    session_id: &SessionId,
    reason: &str,
    detail: Option<String>,
) -> std::result::Result<Vec<u8>, CborError> {
    cbor_serialize(&EndSessionMessage {
        e_session_id: session_id.clone(),
        reason: reason.to_string(),
        detail,
    })
}
