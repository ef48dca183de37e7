//! The authentication-key certification flow: a wallet identifies itself by
//! its CredentialKey, proves it still holds it, and submits AuthKey
//! certificates to be turned into issuer-signed StaticAuthData.

use ciborium::value::Value;
use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tracing::info;

use crate::{
    iso::issuance::{
        CertifyAuthKeysMessage, CertifyAuthKeysProveOwnershipMessage,
        CertifyAuthKeysProveOwnershipResponseMessage, CertifyAuthKeysReadyMessage, CertifyAuthKeysResponseMessage,
        CertifyAuthKeysSendCertsMessage, CERTIFY_AUTH_KEYS_MSG_TYPE,
        CERTIFY_AUTH_KEYS_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, CERTIFY_AUTH_KEYS_SEND_CERTS_MSG_TYPE,
    },
    store::{ConfiguredDocument, Document, SystemOfRecord},
    utils::{
        crypto::{random_bytes, sha256},
        serialization::{cbor_deserialize, cbor_serialize},
        x509::{certificate_public_key, generate_issuer_auth_certificate, validate_auth_key_certificate},
    },
    Result,
};

use super::{
    parse_message, static_auth::generate_static_auth_data, verify_proof_of_ownership, ProtocolError, SessionData,
    SessionId, Transition, CHALLENGE_LENGTH, PROOF_OF_OWNERSHIP_LABEL,
};

#[derive(Debug)]
pub enum CertifyAuthKeysState {
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
    },
}

pub(super) async fn handle<S: SystemOfRecord + Sync>(
    store: &S,
    session_id: &SessionId,
    state: CertifyAuthKeysState,
    message_type: &str,
    envelope: &Value,
) -> Result<Transition> {
    match (message_type, state) {
        (CERTIFY_AUTH_KEYS_MSG_TYPE, CertifyAuthKeysState::New) => {
            let msg: CertifyAuthKeysMessage = parse_message(message_type, envelope)?;
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
                "Session({session_id}): certifying auth keys for configured document {}",
                configured_document.configured_document_id
            );

            let challenge = random_bytes(CHALLENGE_LENGTH);
            let response = cbor_serialize(&CertifyAuthKeysProveOwnershipMessage {
                e_session_id: session_id.clone(),
                challenge: challenge.clone().into(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::CertifyAuthKeys(CertifyAuthKeysState::Started {
                    configured_document,
                    document,
                    credential_key,
                    challenge,
                }),
                response,
            })
        }

        (CERTIFY_AUTH_KEYS_PROVE_OWNERSHIP_RESPONSE_MSG_TYPE, CertifyAuthKeysState::Started {
            configured_document,
            document,
            credential_key,
            challenge,
        }) => {
            let msg: CertifyAuthKeysProveOwnershipResponseMessage = parse_message(message_type, envelope)?;
            verify_proof_of_ownership(
                PROOF_OF_OWNERSHIP_LABEL,
                &msg.proof_of_ownership_signature,
                &credential_key,
                &document.doc_type,
                &challenge,
            )?;

            let response = cbor_serialize(&CertifyAuthKeysReadyMessage {
                e_session_id: session_id.clone(),
            })?;
            Ok(Transition::Continue {
                next: SessionData::CertifyAuthKeys(CertifyAuthKeysState::OwnershipProved {
                    configured_document,
                    document,
                    credential_key,
                }),
                response,
            })
        }

        (CERTIFY_AUTH_KEYS_SEND_CERTS_MSG_TYPE, CertifyAuthKeysState::OwnershipProved {
            configured_document,
            document,
            credential_key,
        }) => {
            let msg: CertifyAuthKeysSendCertsMessage = parse_message(message_type, envelope)?;
            if msg.auth_key_certs.is_empty() {
                return Err(ProtocolError::MissingField("authKeyCerts").into());
            }

            // The signing identity is minted per request; each response is
            // self-consistent through the certificate in the IssuerAuth header.
            let issuer_key = SigningKey::random(&mut OsRng);
            let issuer_cert = generate_issuer_auth_certificate(&issuer_key)?;

            let name_spaces = cbor_deserialize(&document.name_spaces)?;
            let pop_sha256 = sha256(&configured_document.proof_of_provisioning);

            let mut static_auth_datas = Vec::with_capacity(msg.auth_key_certs.len());
            for cert in &msg.auth_key_certs {
                let auth_key = validate_auth_key_certificate(cert, &credential_key, &pop_sha256)?;
                let static_auth_data =
                    generate_static_auth_data(&document.doc_type, &name_spaces, &auth_key, &issuer_key, &issuer_cert)?;
                static_auth_datas.push(static_auth_data.into());
            }
            info!(
                "Session({session_id}): certified {} auth key(s)",
                static_auth_datas.len()
            );

            let response = cbor_serialize(&CertifyAuthKeysResponseMessage {
                e_session_id: session_id.clone(),
                static_auth_datas,
            })?;
            Ok(Transition::Finish {
                response: Some(response),
            })
        }

        (message_type, _) => Err(ProtocolError::UnexpectedState {
            message_type: message_type.to_string(),
        }
        .into()),
    }
}
