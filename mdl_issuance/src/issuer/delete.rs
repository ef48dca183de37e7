//! The delete flow: proof of ownership, then proof of deletion, after which
//! the configured document is removed from the catalog. The parent issued
//! document is left in place.

use ciborium::value::Value;
use p256::ecdsa::VerifyingKey;
use tracing::info;

use crate::{
    iso::issuance::{
        DeleteCredentialDeletedMessage, DeleteCredentialMessage, DeleteCredentialProveOwnershipMessage,
        DeleteCredentialProveOwnershipResponseMessage, DeleteCredentialReadyForDeletionMessage,
        DELETE_CREDENTIAL_DELETED_MSG_TYPE, DELETE_CREDENTIAL_MSG_TYPE,
        DELETE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE,
    },
    store::{ConfiguredDocument, Document, SystemOfRecord},
    utils::{crypto::random_bytes, serialization::cbor_serialize, x509::certificate_public_key},
    Result,
};

use super::{
    parse_message, verify_proof_of_ownership, ProtocolError, SessionData, SessionId, Transition, CHALLENGE_LENGTH,
    PROOF_OF_DELETION_LABEL, PROOF_OF_OWNERSHIP_LABEL,
};

#[derive(Debug)]
pub enum DeleteCredentialState {
    New,
    Started {
        configured_document: ConfiguredDocument,
        document: Document,
        credential_key: VerifyingKey,
        challenge: Vec<u8>,
    },
    OwnershipProved {
        configured_document: ConfiguredDocument,
        document: Document,
        credential_key: VerifyingKey,
        delete_challenge: Vec<u8>,
    },
}

pub(super) async fn handle<S: SystemOfRecord + Sync>(
    store: &S,
    session_id: &SessionId,
    state: DeleteCredentialState,
    message_type: &str,
    envelope: &Value,
) -> Result<Transition> {
    match (message_type, state) {
        (DELETE_CREDENTIAL_MSG_TYPE, DeleteCredentialState::New) => {
            let msg: DeleteCredentialMessage = parse_message(message_type, envelope)?;
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
                "Session({session_id}): deletion requested for configured document {}",
                configured_document.configured_document_id
            );

            let challenge = random_bytes(CHALLENGE_LENGTH);
            let response = cbor_serialize(&DeleteCredentialProveOwnershipMessage {
                e_session_id: session_id.clone(),
                challenge: challenge.clone().into(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::Delete(DeleteCredentialState::Started {
                    configured_document,
                    document,
                    credential_key,
                    challenge,
                }),
                response,
            })
        }

        (DELETE_CREDENTIAL_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, DeleteCredentialState::Started {
            configured_document,
            document,
            credential_key,
            challenge,
        }) => {
            let msg: DeleteCredentialProveOwnershipResponseMessage = parse_message(message_type, envelope)?;
            verify_proof_of_ownership(
                PROOF_OF_OWNERSHIP_LABEL,
                &msg.proof_of_ownership_signature,
                &credential_key,
                &document.doc_type,
                &challenge,
            )?;

            let delete_challenge = random_bytes(CHALLENGE_LENGTH);
            let response = cbor_serialize(&DeleteCredentialReadyForDeletionMessage {
                e_session_id: session_id.clone(),
                challenge: delete_challenge.clone().into(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::Delete(DeleteCredentialState::OwnershipProved {
                    configured_document,
                    document,
                    credential_key,
                    delete_challenge,
                }),
                response,
            })
        }

        (DELETE_CREDENTIAL_DELETED_MSG_TYPE, DeleteCredentialState::OwnershipProved {
            configured_document,
            document,
            credential_key,
            delete_challenge,
        }) => {
            let msg: DeleteCredentialDeletedMessage = parse_message(message_type, envelope)?;
            verify_proof_of_ownership(
                PROOF_OF_DELETION_LABEL,
                &msg.proof_of_deletion_signature,
                &credential_key,
                &document.doc_type,
                &delete_challenge,
            )?;

            store
                .delete_configured_document(configured_document.configured_document_id)
                .await?;
            info!(
                "Session({session_id}): deleted configured document {}",
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
