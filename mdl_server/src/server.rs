//! The HTTP surface: one POST endpoint speaking the CBOR session protocol,
//! plus a small JSON admin plane over the catalog.

use std::{net::IpAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use mdl_issuance::{
    issuer::IssuanceServer,
    store::{StoreError, SystemOfRecord, UnixTimestamp, CONFIGURED_DOCUMENT_STATUS_TO_DELETE},
};

use crate::testdata;

pub async fn serve<S>(ip: IpAddr, port: u16, store: S) -> Result<()>
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    let issuer = Arc::new(IssuanceServer::new(store));

    let app = Router::new()
        .route("/mdlServer", post(mdl_server::<S>))
        .route("/admin/persons", get(list_persons::<S>))
        .route("/admin/persons/:person_id/documents", get(list_documents::<S>))
        .route("/admin/documents/:document_id/refresh", post(refresh_document::<S>))
        .route(
            "/admin/issued_documents/:issued_document_id/configured_documents",
            get(list_configured_documents::<S>),
        )
        .route(
            "/admin/configured_documents/:configured_document_id/mark_delete",
            post(mark_delete::<S>),
        )
        .with_state(issuer);

    let listener = tokio::net::TcpListener::bind((ip, port)).await?;
    info!("listening on {}:{}", ip, port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn mdl_server<S>(State(issuer): State<Arc<IssuanceServer<S>>>, body: Bytes) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    match issuer.process_message(&body).await {
        Ok(response) => response.into_response(),
        Err(error) => {
            warn!("request failed outside of a session: {error}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn store_error_response(error: StoreError) -> Response {
    match error {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, error.to_string()).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct PersonSummary {
    person_id: i64,
    name: String,
}

async fn list_persons<S>(State(issuer): State<Arc<IssuanceServer<S>>>) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    match issuer.store().list_persons().await {
        Ok(persons) => Json(
            persons
                .into_iter()
                .map(|person| PersonSummary {
                    person_id: person.person_id,
                    name: person.name,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(error) => store_error_response(error),
    }
}

#[derive(Serialize)]
struct DocumentSummary {
    document_id: i64,
    doc_type: String,
    data_timestamp: UnixTimestamp,
}

async fn list_documents<S>(
    State(issuer): State<Arc<IssuanceServer<S>>>,
    Path(person_id): Path<i64>,
) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    let store = issuer.store();
    let result: Result<Vec<DocumentSummary>, StoreError> = async {
        store.lookup_person(person_id).await?;
        let mut summaries = Vec::new();
        for document_id in store.lookup_documents_by_person(person_id).await? {
            let document = store.lookup_document(document_id).await?;
            summaries.push(DocumentSummary {
                document_id,
                doc_type: document.doc_type,
                data_timestamp: document.data_timestamp,
            });
        }
        Ok(summaries)
    }
    .await;

    match result {
        Ok(summaries) => Json(summaries).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn list_configured_documents<S>(
    State(issuer): State<Arc<IssuanceServer<S>>>,
    Path(issued_document_id): Path<i64>,
) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    let store = issuer.store();
    let result: Result<Vec<i64>, StoreError> = async {
        store.lookup_issued_document(issued_document_id).await?;
        store.lookup_configured_documents_by_issued(issued_document_id).await
    }
    .await;

    match result {
        Ok(configured_document_ids) => Json(configured_document_ids).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn refresh_document<S>(
    State(issuer): State<Arc<IssuanceServer<S>>>,
    Path(document_id): Path<i64>,
) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    if let Err(error) = issuer.store().lookup_document(document_id).await {
        return store_error_response(error);
    }
    match testdata::refresh_document(issuer.store(), document_id).await {
        Ok(()) => {
            info!("admin: refreshed document {document_id}");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response(),
    }
}

async fn mark_delete<S>(
    State(issuer): State<Arc<IssuanceServer<S>>>,
    Path(configured_document_id): Path<i64>,
) -> Response
where
    S: SystemOfRecord + Send + Sync + 'static,
{
    match issuer
        .store()
        .update_configured_status(configured_document_id, CONFIGURED_DOCUMENT_STATUS_TO_DELETE)
        .await
    {
        Ok(()) => {
            info!("admin: marked configured document {configured_document_id} for deletion");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => store_error_response(error),
    }
}
