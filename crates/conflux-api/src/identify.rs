//! Handler for `POST /identify`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/identify` | Body: `{"email"?: string, "phoneNumber"?: string}` |
//!
//! Success: `200` with `{"contact": {...}}`. A body with neither field is a
//! `400`; integrity and storage failures are `500`.

use std::sync::Arc;

use axum::{Json, extract::State};
use conflux_core::{
  record::Fragment, store::IdentityStore, view::ConsolidatedIdentity,
};
use serde::Serialize;

use crate::error::ApiError;

/// Success envelope: the consolidated identity under a `contact` key, as the
/// original service shaped it.
#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
  pub contact: ConsolidatedIdentity,
}

/// `POST /identify`
pub async fn handler<S>(
  State(store): State<Arc<S>>,
  Json(fragment): Json<Fragment>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: IdentityStore,
{
  let contact = store.identify(fragment).await?;
  Ok(Json(IdentifyResponse { contact }))
}
