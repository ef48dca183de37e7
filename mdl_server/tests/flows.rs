//! Drives the four lifecycle flows end-to-end through
//! `IssuanceServer::process_message` against a SQLite catalog seeded with the
//! demo records, playing the wallet side with locally generated keys.

use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{de::DeserializeOwned, Serialize};
use serde_bytes::ByteBuf;

use mdl_issuance::{
    iso::issuance::*,
    iso::mdocs::{AccessControlProfiles, MobileSecurityObjectBytes, ProvisionedNameSpaces, StaticAuthData},
    issuer::{IssuanceServer, PROOF_OF_DELETION_LABEL, PROOF_OF_OWNERSHIP_LABEL},
    store::SystemOfRecord,
    utils::{
        cose::{CoseKey, CoseSign1},
        crypto::sha256,
        serialization::{cbor_deserialize, cbor_serialize},
        x509::{generate_auth_key_certificate, generate_credential_key_certificate},
    },
};
use mdl_server::{
    store::{DatabaseSystemOfRecord, IN_MEMORY_DATABASE_URL},
    testdata,
};

const MDL_DOC_TYPE: &str = "org.iso.18013.5.1.mDL";

async fn seeded_server() -> IssuanceServer<DatabaseSystemOfRecord> {
    let store = DatabaseSystemOfRecord::open(IN_MEMORY_DATABASE_URL).await.unwrap();
    testdata::seed(&store).await.unwrap();
    IssuanceServer::new(store)
}

async fn post<Req: Serialize, Resp: DeserializeOwned>(
    server: &IssuanceServer<DatabaseSystemOfRecord>,
    message: &Req,
) -> Resp {
    let response = server
        .process_message(&cbor_serialize(message).unwrap())
        .await
        .unwrap();
    cbor_deserialize(&response).unwrap()
}

/// The wallet's view of a provisioned credential.
struct WalletCredential {
    credential_key: SigningKey,
    proof_of_provisioning: Vec<u8>,
}

impl WalletCredential {
    fn cose_credential_key(&self) -> CoseKey {
        CoseKey::try_from(self.credential_key.verifying_key()).unwrap()
    }

    fn sign_proof(&self, label: &str, challenge: &[u8]) -> CoseSign1 {
        let payload = cbor_serialize(&(label, MDL_DOC_TYPE, ByteBuf::from(challenge.to_vec()), false)).unwrap();
        CoseSign1::sign(&self.credential_key, payload, None, false)
    }
}

fn proof_of_provisioning_payload(profiles: &AccessControlProfiles, name_spaces: &ProvisionedNameSpaces) -> Vec<u8> {
    cbor_serialize(&("ProofOfProvisioning", MDL_DOC_TYPE, profiles, name_spaces, false)).unwrap()
}

/// Runs the whole provisioning flow for the given provisioning code.
async fn provision(server: &IssuanceServer<DatabaseSystemOfRecord>, provisioning_code: &str) -> WalletCredential {
    let ready: ReadyToProvisionMessage = post(
        server,
        &StartProvisioningMessage {
            provisioning_code: Some(provisioning_code.to_string()),
        },
    )
    .await;
    let session_id = ready.e_session_id;

    let provisioning: ProvisioningResponseMessage = post(
        server,
        &ProvisioningRequestMessage {
            e_session_id: session_id.clone(),
        },
    )
    .await;
    assert_eq!(provisioning.doc_type, MDL_DOC_TYPE);
    assert!(!provisioning.challenge.is_empty());

    let credential_key = SigningKey::random(&mut OsRng);
    let cert_chain = generate_credential_key_certificate(&credential_key).unwrap();
    let data: DataToProvisionMessage = post(
        server,
        &SetCertificateChainMessage {
            e_session_id: session_id.clone(),
            credential_key_certificate_chain: ByteBuf::from(cert_chain),
        },
    )
    .await;

    let proof_of_provisioning = proof_of_provisioning_payload(&data.access_control_profiles, &data.name_spaces);
    let end: EndSessionMessage = post(
        server,
        &SetProofOfProvisioningMessage {
            e_session_id: session_id,
            proof_of_provisioning_signature: CoseSign1::sign(
                &credential_key,
                proof_of_provisioning.clone(),
                None,
                false,
            ),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_SUCCESS);

    WalletCredential {
        credential_key,
        proof_of_provisioning,
    }
}

/// Runs the update flow up to the issuer's decision; returns the decision and,
/// for `"update"`, the open session id.
async fn update_decision(
    server: &IssuanceServer<DatabaseSystemOfRecord>,
    credential: &WalletCredential,
) -> (UpdateCredentialResponseMessage, mdl_issuance::issuer::server_state::SessionId) {
    let prove: UpdateCredentialProveOwnershipMessage = post(
        server,
        &UpdateCredentialMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;
    let session_id = prove.e_session_id.clone();

    let response: UpdateCredentialResponseMessage = post(
        server,
        &UpdateCredentialProveOwnershipResponseMessage {
            e_session_id: session_id.clone(),
            proof_of_ownership_signature: credential.sign_proof(PROOF_OF_OWNERSHIP_LABEL, &prove.challenge),
        },
    )
    .await;
    (response, session_id)
}

#[tokio::test]
async fn happy_provisioning() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let configured = server
        .store()
        .lookup_configured_document_by_credential_key(credential.credential_key.verifying_key())
        .await
        .unwrap();
    assert_eq!(configured.issued_document_id, 12);
    assert_eq!(configured.proof_of_provisioning, credential.proof_of_provisioning);
    assert_eq!(
        server.store().lookup_configured_documents_by_issued(12).await.unwrap(),
        vec![configured.configured_document_id]
    );

    // The configured document's data version matches the document's
    let document = server.store().lookup_document(11).await.unwrap();
    assert_eq!(configured.data_timestamp, document.data_timestamp);
    assert!(configured.status.is_none());
}

#[tokio::test]
async fn provisioning_code_is_single_use() {
    let server = seeded_server().await;
    provision(&server, "1001").await;

    let end: EndSessionMessage = post(
        &server,
        &StartProvisioningMessage {
            provisioning_code: Some("1001".to_string()),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_FAILED);
    assert!(end.detail.unwrap().contains("already been used"));
}

#[tokio::test]
async fn credential_key_reuse_across_documents_fails() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    // Walk John's provisioning flow with Erika's CredentialKey; the final
    // insert must fail on the key's uniqueness.
    let ready: ReadyToProvisionMessage = post(
        &server,
        &StartProvisioningMessage {
            provisioning_code: Some("2001".to_string()),
        },
    )
    .await;
    let session_id = ready.e_session_id;
    let _: ProvisioningResponseMessage = post(
        &server,
        &ProvisioningRequestMessage {
            e_session_id: session_id.clone(),
        },
    )
    .await;
    let cert_chain = generate_credential_key_certificate(&credential.credential_key).unwrap();
    let data: DataToProvisionMessage = post(
        &server,
        &SetCertificateChainMessage {
            e_session_id: session_id.clone(),
            credential_key_certificate_chain: ByteBuf::from(cert_chain),
        },
    )
    .await;
    let proof = proof_of_provisioning_payload(&data.access_control_profiles, &data.name_spaces);
    let end: EndSessionMessage = post(
        &server,
        &SetProofOfProvisioningMessage {
            e_session_id: session_id,
            proof_of_provisioning_signature: CoseSign1::sign(&credential.credential_key, proof, None, false),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_FAILED);
    assert!(end.detail.unwrap().contains("already configured"));
}

#[tokio::test]
async fn certify_auth_keys() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let prove: CertifyAuthKeysProveOwnershipMessage = post(
        &server,
        &CertifyAuthKeysMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;
    let session_id = prove.e_session_id.clone();
    assert!(!prove.challenge.is_empty());

    let ready: CertifyAuthKeysReadyMessage = post(
        &server,
        &CertifyAuthKeysProveOwnershipResponseMessage {
            e_session_id: session_id.clone(),
            proof_of_ownership_signature: credential.sign_proof(PROOF_OF_OWNERSHIP_LABEL, &prove.challenge),
        },
    )
    .await;
    assert_eq!(ready.e_session_id, session_id);

    let pop_sha256 = sha256(&credential.proof_of_provisioning);
    let auth_keys: Vec<SigningKey> = (0..3).map(|_| SigningKey::random(&mut OsRng)).collect();
    let auth_key_certs = auth_keys
        .iter()
        .map(|auth_key| {
            ByteBuf::from(generate_auth_key_certificate(auth_key, &credential.credential_key, &pop_sha256).unwrap())
        })
        .collect();

    let response: CertifyAuthKeysResponseMessage = post(
        &server,
        &CertifyAuthKeysSendCertsMessage {
            e_session_id: session_id,
            auth_key_certs,
        },
    )
    .await;
    assert_eq!(response.static_auth_datas.len(), 3);

    for (encoded, auth_key) in response.static_auth_datas.iter().zip(&auth_keys) {
        let static_auth_data: StaticAuthData = cbor_deserialize(encoded).unwrap();

        // IssuerAuth carries its signing certificate and verifies
        let issuer_cert = static_auth_data.issuer_auth.unprotected_certificate().unwrap();
        let issuer_key = mdl_issuance::utils::x509::certificate_public_key(issuer_cert).unwrap();
        let mso_bytes = static_auth_data.issuer_auth.payload().unwrap();
        static_auth_data.issuer_auth.verify(&issuer_key, mso_bytes).unwrap();

        // The MSO certifies this AuthKey for the mDL doc type
        let mso: MobileSecurityObjectBytes = cbor_deserialize(mso_bytes).unwrap();
        let mso = mso.0;
        assert_eq!(mso.doc_type, MDL_DOC_TYPE);
        assert_eq!(
            VerifyingKey::try_from(&mso.device_key_info.device_key).unwrap(),
            *auth_key.verifying_key()
        );
        assert!(mso.value_digests.0.contains_key("org.iso.18013.5.1"));
        assert!(mso.value_digests.0.contains_key("org.aamva.18013.5.1"));
    }
}

#[tokio::test]
async fn certify_auth_keys_rejects_foreign_binding() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let prove: CertifyAuthKeysProveOwnershipMessage = post(
        &server,
        &CertifyAuthKeysMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;
    let session_id = prove.e_session_id.clone();
    let _: CertifyAuthKeysReadyMessage = post(
        &server,
        &CertifyAuthKeysProveOwnershipResponseMessage {
            e_session_id: session_id.clone(),
            proof_of_ownership_signature: credential.sign_proof(PROOF_OF_OWNERSHIP_LABEL, &prove.challenge),
        },
    )
    .await;

    // ProofOfBinding over the wrong proof of provisioning fails the request
    let auth_key = SigningKey::random(&mut OsRng);
    let bad_cert =
        generate_auth_key_certificate(&auth_key, &credential.credential_key, &sha256(b"wrong proof")).unwrap();
    let end: EndSessionMessage = post(
        &server,
        &CertifyAuthKeysSendCertsMessage {
            e_session_id: session_id,
            auth_key_certs: vec![ByteBuf::from(bad_cert)],
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_FAILED);
}

#[tokio::test]
async fn update_flow_reports_no_update_when_unchanged() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    // Twice in a row, and storage stays untouched
    for _ in 0..2 {
        let (response, _) = update_decision(&server, &credential).await;
        assert_eq!(response.update_credential_result, UpdateCredentialResult::NoUpdate);
    }

    let configured = server
        .store()
        .lookup_configured_document_by_credential_key(credential.credential_key.verifying_key())
        .await
        .unwrap();
    assert_eq!(configured.proof_of_provisioning, credential.proof_of_provisioning);
}

#[tokio::test]
async fn update_flow_delivers_new_data() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    // The admin plane refreshes Erika's document
    testdata::refresh_document(server.store(), 11).await.unwrap();

    let (response, session_id) = update_decision(&server, &credential).await;
    assert_eq!(response.update_credential_result, UpdateCredentialResult::Update);

    let data: UpdateCredentialDataToProvisionMessage = post(
        &server,
        &UpdateCredentialGetDataToUpdateMessage {
            e_session_id: session_id.clone(),
        },
    )
    .await;
    let family_name = &data.name_spaces["org.iso.18013.5.1"]
        .iter()
        .find(|entry| entry.name == "family_name")
        .unwrap()
        .value;
    assert!(family_name.as_text().unwrap().starts_with("Mustermann "));

    let new_proof = proof_of_provisioning_payload(&data.access_control_profiles, &data.name_spaces);
    let end: EndSessionMessage = post(
        &server,
        &UpdateCredentialSetProofOfProvisioningMessage {
            e_session_id: session_id,
            proof_of_provisioning_signature: CoseSign1::sign(&credential.credential_key, new_proof.clone(), None, false),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_SUCCESS);

    // The configured document now tracks the new document version
    let document = server.store().lookup_document(11).await.unwrap();
    let configured = server
        .store()
        .lookup_configured_document_by_credential_key(credential.credential_key.verifying_key())
        .await
        .unwrap();
    assert_eq!(configured.data_timestamp, document.data_timestamp);
    assert_eq!(configured.proof_of_provisioning, new_proof);

    // And the next update flow is a no-op again
    let (response, _) = update_decision(&server, &credential).await;
    assert_eq!(response.update_credential_result, UpdateCredentialResult::NoUpdate);
}

#[tokio::test]
async fn update_flow_reports_delete_when_marked() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let configured = server
        .store()
        .lookup_configured_document_by_credential_key(credential.credential_key.verifying_key())
        .await
        .unwrap();
    server
        .store()
        .update_configured_status(configured.configured_document_id, "TO_DELETE")
        .await
        .unwrap();

    let (response, _) = update_decision(&server, &credential).await;
    assert_eq!(response.update_credential_result, UpdateCredentialResult::Delete);
}

#[tokio::test]
async fn delete_flow_removes_the_configured_document() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let prove: DeleteCredentialProveOwnershipMessage = post(
        &server,
        &DeleteCredentialMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;
    let session_id = prove.e_session_id.clone();

    let ready: DeleteCredentialReadyForDeletionMessage = post(
        &server,
        &DeleteCredentialProveOwnershipResponseMessage {
            e_session_id: session_id.clone(),
            proof_of_ownership_signature: credential.sign_proof(PROOF_OF_OWNERSHIP_LABEL, &prove.challenge),
        },
    )
    .await;
    assert_ne!(ready.challenge, prove.challenge);

    let end: EndSessionMessage = post(
        &server,
        &DeleteCredentialDeletedMessage {
            e_session_id: session_id,
            proof_of_deletion_signature: credential.sign_proof(PROOF_OF_DELETION_LABEL, &ready.challenge),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_SUCCESS);

    // The row is gone, so the next update flow fails its lookup
    let end: EndSessionMessage = post(
        &server,
        &UpdateCredentialMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_FAILED);
    assert!(end.detail.unwrap().contains("no configured document"));

    // While the parent issued document survives
    server.store().lookup_issued_document(12).await.unwrap();
}

#[tokio::test]
async fn proof_of_ownership_must_answer_the_challenge() {
    let server = seeded_server().await;
    let credential = provision(&server, "1001").await;

    let prove: UpdateCredentialProveOwnershipMessage = post(
        &server,
        &UpdateCredentialMessage {
            credential_key: credential.cose_credential_key(),
        },
    )
    .await;

    let end: EndSessionMessage = post(
        &server,
        &UpdateCredentialProveOwnershipResponseMessage {
            e_session_id: prove.e_session_id,
            proof_of_ownership_signature: credential.sign_proof(PROOF_OF_OWNERSHIP_LABEL, b"not the challenge"),
        },
    )
    .await;
    assert_eq!(end.reason, END_SESSION_REASON_FAILED);
    assert!(end.detail.unwrap().contains("challenge"));
}
