//! The provisioning flow: a wallet redeems a provisioning code, proves it
//! generated a CredentialKey, receives the document data, and finally proves
//! it stored that data.

use chrono::Utc;
use ciborium::value::Value;
use p256::ecdsa::VerifyingKey;
use tracing::info;

use crate::{
    iso::issuance::{
        DataToProvisionMessage, ProvisioningResponseMessage, ReadyToProvisionMessage, SetCertificateChainMessage,
        SetProofOfProvisioningMessage, StartProvisioningMessage, PROVISIONING_REQUEST_MSG_TYPE,
        SET_CERTIFICATE_CHAIN_MSG_TYPE, SET_PROOF_OF_PROVISIONING_MSG_TYPE, START_PROVISIONING_MSG_TYPE,
    },
    store::{epoch_seconds, Document, IssuedDocument, SystemOfRecord},
    utils::{
        crypto::random_bytes,
        serialization::{cbor_deserialize, cbor_serialize},
        x509::{certificate_public_key, validate_credential_key_certificate_chain},
    },
    Result,
};

use super::{parse_message, ProtocolError, SessionData, SessionId, Transition, CHALLENGE_LENGTH};

#[derive(Debug)]
pub enum ProvisioningState {
    New,
    Started {
        issued_document: IssuedDocument,
        document: Document,
    },
    ChallengeSent {
        issued_document: IssuedDocument,
        document: Document,
        challenge: Vec<u8>,
    },
    CertificateChainSet {
        issued_document: IssuedDocument,
        document: Document,
        credential_key_x509_cert_chain: Vec<u8>,
        credential_key: VerifyingKey,
    },
}

pub(super) async fn handle<S: SystemOfRecord + Sync>(
    store: &S,
    session_id: &SessionId,
    state: ProvisioningState,
    message_type: &str,
    envelope: &Value,
) -> Result<Transition> {
    match (message_type, state) {
        (START_PROVISIONING_MSG_TYPE, ProvisioningState::New) => {
            let msg: StartProvisioningMessage = parse_message(message_type, envelope)?;
            let provisioning_code = msg
                .provisioning_code
                .ok_or(ProtocolError::MissingField("provisioningCode"))?;

            let issued_document = store
                .lookup_issued_document_by_provisioning_code(&provisioning_code)
                .await?;
            if issued_document.consumed_at_timestamp.is_some() {
                return Err(ProtocolError::ProvisioningCodeConsumed.into());
            }
            let document = store.lookup_document(issued_document.document_id).await?;
            info!("Session({session_id}): provisioning issued document {}", issued_document.issued_document_id);

            let response = cbor_serialize(&ReadyToProvisionMessage {
                e_session_id: session_id.clone(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::Provisioning(ProvisioningState::Started {
                    issued_document,
                    document,
                }),
                response,
            })
        }

        (PROVISIONING_REQUEST_MSG_TYPE, ProvisioningState::Started {
            issued_document,
            document,
        }) => {
            let challenge = random_bytes(CHALLENGE_LENGTH);
            let response = cbor_serialize(&ProvisioningResponseMessage {
                e_session_id: session_id.clone(),
                challenge: challenge.clone().into(),
                doc_type: document.doc_type.clone(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::Provisioning(ProvisioningState::ChallengeSent {
                    issued_document,
                    document,
                    challenge,
                }),
                response,
            })
        }

        (SET_CERTIFICATE_CHAIN_MSG_TYPE, ProvisioningState::ChallengeSent {
            issued_document,
            document,
            challenge,
        }) => {
            let msg: SetCertificateChainMessage = parse_message(message_type, envelope)?;
            let cert_chain = msg.credential_key_certificate_chain.into_vec();
            validate_credential_key_certificate_chain(&cert_chain, &challenge)?;
            let credential_key = certificate_public_key(&cert_chain)?;

            let response = cbor_serialize(&DataToProvisionMessage {
                e_session_id: session_id.clone(),
                access_control_profiles: cbor_deserialize(&document.access_control_profiles)?,
                name_spaces: cbor_deserialize(&document.name_spaces)?,
            })?;
            Ok(Transition::Continue {
                next: SessionData::Provisioning(ProvisioningState::CertificateChainSet {
                    issued_document,
                    document,
                    credential_key_x509_cert_chain: cert_chain,
                    credential_key,
                }),
                response,
            })
        }

        (SET_PROOF_OF_PROVISIONING_MSG_TYPE, ProvisioningState::CertificateChainSet {
            issued_document,
            document,
            credential_key_x509_cert_chain,
            credential_key,
        }) => {
            let msg: SetProofOfProvisioningMessage = parse_message(message_type, envelope)?;
            let signature = msg.proof_of_provisioning_signature;
            let proof_of_provisioning = signature.payload()?.to_vec();
            signature.verify(&credential_key, &proof_of_provisioning)?;

            let configured_document_id = store
                .insert_configured_document(
                    issued_document.issued_document_id,
                    &credential_key_x509_cert_chain,
                    &proof_of_provisioning,
                    epoch_seconds(Utc::now()),
                    document.data_timestamp,
                )
                .await?;
            info!("Session({session_id}): provisioned configured document {configured_document_id}");

            Ok(Transition::Finish { response: None })
        }

        (message_type, _) => Err(ProtocolError::UnexpectedState {
            message_type: message_type.to_string(),
        }
        .into()),
    }
}
