//! HTTP surface over the ledger engine.
//!
//! | Method | Path      | Input                                | Output        |
//! |--------|-----------|--------------------------------------|---------------|
//! | GET    | `/`       | `?id=`                               | `{id,balance}`|
//! | GET    | `/logs`   | `?id=&sort=`                         | records       |
//! | POST   | `/`       | `{id, sum, description?}`            | `{id,balance}`|
//! | PUT    | `/`       | `{fromID, toID, sum, description?}`  | `{from,to}`   |
//! | GET    | `/health` |                                      | `ok`          |

pub mod dto;
mod error;

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::Ledger;
use crate::domain::TransactionRecord;

pub use error::{ApiError, status_for};

use dto::{
    AccountQuery, BalanceResponse, LogQuery, TransferRequest, TransferResponse,
    UpdateBalanceRequest,
};

pub fn router(ledger: Ledger) -> Router {
    Router::new()
        .route(
            "/",
            get(get_balance).post(update_balance).put(transfer_balance),
        )
        .route("/logs", get(get_log))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(ledger: Ledger, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "balance ledger listening");

    axum::serve(listener, router(ledger.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    ledger.repository().close().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "could not listen for ctrl-c; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn get_balance(
    State(ledger): State<Ledger>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Query(query) = query?;
    let balance = ledger.get_balance(query.id).await?;
    Ok(Json(BalanceResponse {
        id: query.id,
        balance,
    }))
}

async fn get_log(
    State(ledger): State<Ledger>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    let Query(query) = query?;
    let records = ledger.get_log(query.id, query.sort.as_deref()).await?;
    Ok(Json(records))
}

async fn update_balance(
    State(ledger): State<Ledger>,
    body: Result<Json<UpdateBalanceRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(req) = body?;
    let balance = ledger
        .update_balance(req.id, req.sum, req.description)
        .await?;
    Ok(Json(BalanceResponse {
        id: req.id,
        balance,
    }))
}

async fn transfer_balance(
    State(ledger): State<Ledger>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    let Json(req) = body?;
    let receipt = ledger
        .transfer(req.from_id, req.to_id, req.amount(), req.description.clone())
        .await?;
    Ok(Json(receipt.into()))
}
