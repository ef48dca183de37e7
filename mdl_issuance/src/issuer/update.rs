//! The update flow: after proof of ownership, the issuer decides whether this
//! wallet instance must delete its copy, has the current data already, or
//! should fetch and re-provision the new version.

use chrono::Utc;
use ciborium::value::Value;
use p256::ecdsa::VerifyingKey;
use tracing::info;

use crate::{
    iso::issuance::{
        UpdateCredentialDataToProvisionMessage, UpdateCredentialGetDataToUpdateMessage, UpdateCredentialMessage,
        UpdateCredentialProveOwnershipMessage, UpdateCredentialProveOwnershipResponseMessage,
        UpdateCredentialResponseMessage, UpdateCredentialResult, UpdateCredentialSetProofOfProvisioningMessage,
        UPDATE_CREDENTIAL_GET_DATA_TO_UPDATE_MSG_TYPE, UPDATE_CREDENTIAL_MSG_TYPE,
        UPDATE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, UPDATE_CREDENTIAL_SET_PROOF_OF_PROVISIONING_MSG_TYPE,
    },
    store::{epoch_seconds, ConfiguredDocument, Document, SystemOfRecord, CONFIGURED_DOCUMENT_STATUS_TO_DELETE},
    utils::{
        crypto::random_bytes,
        serialization::{cbor_deserialize, cbor_serialize},
        x509::certificate_public_key,
    },
    Result,
};

use super::{
    parse_message, verify_proof_of_ownership, ProtocolError, SessionData, SessionId, Transition, CHALLENGE_LENGTH,
    PROOF_OF_OWNERSHIP_LABEL,
};

#[derive(Debug)]
pub enum UpdateCredentialState {
    New,
    Started {
        configured_document: ConfiguredDocument,
        document: Document,
        credential_key: VerifyingKey,
        challenge: Vec<u8>,
    },
    Updating {
        configured_document: ConfiguredDocument,
        document: Document,
        credential_key: VerifyingKey,
    },
    DataSent {
        configured_document: ConfiguredDocument,
        document: Document,
        credential_key: VerifyingKey,
    },
}

pub(super) async fn handle<S: SystemOfRecord + Sync>(
    store: &S,
    session_id: &SessionId,
    state: UpdateCredentialState,
    message_type: &str,
    envelope: &Value,
) -> Result<Transition> {
    match (message_type, state) {
        (UPDATE_CREDENTIAL_MSG_TYPE, UpdateCredentialState::New) => {
            let msg: UpdateCredentialMessage = parse_message(message_type, envelope)?;
            let presented_key = VerifyingKey::try_from(&msg.credential_key)?;

            let configured_document = store
                .lookup_configured_document_by_credential_key(&presented_key)
                .await?;
            let credential_key = certificate_public_key(&configured_document.credential_key_x509_cert_chain)?;
            let issued_document = store
                .lookup_issued_document(configured_document.issued_document_id)
                .await?;
            let document = store.lookup_document(issued_document.document_id).await?;
            info!(
                "Session({session_id}): update check for configured document {}",
                configured_document.configured_document_id
            );

            let challenge = random_bytes(CHALLENGE_LENGTH);
            let response = cbor_serialize(&UpdateCredentialProveOwnershipMessage {
                e_session_id: session_id.clone(),
                challenge: challenge.clone().into(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::Update(UpdateCredentialState::Started {
                    configured_document,
                    document,
                    credential_key,
                    challenge,
                }),
                response,
            })
        }

        (UPDATE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, UpdateCredentialState::Started {
            configured_document,
            document,
            credential_key,
            challenge,
        }) => {
            let msg: UpdateCredentialProveOwnershipResponseMessage = parse_message(message_type, envelope)?;
            verify_proof_of_ownership(
                PROOF_OF_OWNERSHIP_LABEL,
                &msg.proof_of_ownership_signature,
                &credential_key,
                &document.doc_type,
                &challenge,
            )?;

            let result = if configured_document.status.as_deref() == Some(CONFIGURED_DOCUMENT_STATUS_TO_DELETE) {
                UpdateCredentialResult::Delete
            } else if document.data_timestamp == configured_document.data_timestamp {
                UpdateCredentialResult::NoUpdate
            } else {
                UpdateCredentialResult::Update
            };
            info!("Session({session_id}): update decision {result:?}");

            let response = cbor_serialize(&UpdateCredentialResponseMessage {
                e_session_id: session_id.clone(),
                update_credential_result: result,
            })?;
            match result {
                UpdateCredentialResult::Update => Ok(Transition::Continue {
                    next: SessionData::Update(UpdateCredentialState::Updating {
                        configured_document,
                        document,
                        credential_key,
                    }),
                    response,
                }),
                UpdateCredentialResult::NoUpdate | UpdateCredentialResult::Delete => Ok(Transition::Finish {
                    response: Some(response),
                }),
            }
        }

        (UPDATE_CREDENTIAL_GET_DATA_TO_UPDATE_MSG_TYPE, UpdateCredentialState::Updating {
            configured_document,
            document,
            credential_key,
        }) => {
            let _: UpdateCredentialGetDataToUpdateMessage = parse_message(message_type, envelope)?;

            let response = cbor_serialize(&UpdateCredentialDataToProvisionMessage {
                e_session_id: session_id.clone(),
                access_control_profiles: cbor_deserialize(&document.access_control_profiles)?,
                name_spaces: cbor_deserialize(&document.name_spaces)?,
            })?;
            Ok(Transition::Continue {
                next: SessionData::Update(UpdateCredentialState::DataSent {
                    configured_document,
                    document,
                    credential_key,
                }),
                response,
            })
        }

        (UPDATE_CREDENTIAL_SET_PROOF_OF_PROVISIONING_MSG_TYPE, UpdateCredentialState::DataSent {
            configured_document,
            document,
            credential_key,
        }) => {
            let msg: UpdateCredentialSetProofOfProvisioningMessage = parse_message(message_type, envelope)?;
            let signature = msg.proof_of_provisioning_signature;
            let proof_of_provisioning = signature.payload()?.to_vec();
            signature.verify(&credential_key, &proof_of_provisioning)?;

            store
                .update_configured_document(
                    configured_document.configured_document_id,
                    &proof_of_provisioning,
                    epoch_seconds(Utc::now()),
                    document.data_timestamp,
                )
                .await?;
            info!(
                "Session({session_id}): updated configured document {}",
                configured_document.configured_document_id
            );

            Ok(Transition::Finish { response: None })
        }

        (message_type, _) => Err(ProtocolError::UnexpectedState {
            message_type: message_type.to_string(),
        }
        .into()),
    }
}
