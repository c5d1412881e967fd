//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use membership_core::{
    AccessDecision, ContentId, MembershipId, PriceReference, SubscriberId, SubscriptionRecord,
    evaluate, visible_items,
};
use membership_payments::{
    CheckoutOrder, CheckoutSessionDetail, CustomerRef, NewMembershipPrice, PaymentError,
    ReconcileOutcome,
};

use crate::state::{AppState, Billing};

/// Header set by the identity proxy in front of this service
pub const VIEWER_HEADER: &str = "x-viewer-id";

const SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub billing_provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub subscriber_id: SubscriberId,
    pub name: String,
    pub owner_id: SubscriberId,
    pub membership_id: MembershipId,
    /// `"new"` for a first purchase, otherwise the billing customer id
    pub customer: String,
    #[serde(default)]
    pub email: String,
    pub price_reference: PriceReference,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub subscriber_id: SubscriberId,
}

#[derive(Debug, Deserialize)]
pub struct MembershipPriceRequest {
    pub title: String,
    pub price: i64,
    pub owner_id: SubscriberId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MembershipPriceResponse {
    pub price_reference: PriceReference,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveCheckoutRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub content_id: ContentId,
    pub granted: bool,
    pub decision: AccessDecision,
}

#[derive(Debug, Serialize)]
pub struct FeedEntry {
    pub content_id: ContentId,
    pub gating_membership_id: Option<MembershipId>,
    pub granted: bool,
    pub decision: AccessDecision,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn payment_error(e: &PaymentError, code: &str) -> ApiError {
    let status = match e {
        PaymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PaymentError::NoBillingIdentity => StatusCode::CONFLICT,
        PaymentError::Stripe(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = match e {
        PaymentError::NoBillingIdentity => "NO_BILLING_IDENTITY",
        PaymentError::InvalidRequest(_) => "INVALID_REQUEST",
        _ => code,
    };
    error(status, e.user_message(), code)
}

fn viewer(headers: &HeaderMap) -> Result<Option<SubscriberId>, ApiError> {
    headers
        .get(VIEWER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.parse::<SubscriberId>().map_err(|_| {
                error(StatusCode::BAD_REQUEST, "Invalid viewer id", "INVALID_VIEWER")
            })
        })
        .transpose()
}

/// The viewer's full subscription snapshot; anonymous viewers hold none
async fn subscriptions(
    state: &AppState,
    viewer: Option<&SubscriberId>,
) -> Result<Vec<SubscriptionRecord>, ApiError> {
    let Some(id) = viewer else {
        return Ok(Vec::new());
    };

    state.ledger.find_by_subscriber(id).await.map_err(|e| {
        tracing::error!("Ledger error: {}", e);
        error(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", "LEDGER_ERROR")
    })
}

fn billing(state: &AppState) -> Result<&Arc<Billing>, ApiError> {
    state.billing.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.billing.is_some(),
        billing_provider: state.billing.as_ref().map(|b| b.provider.clone()),
    })
}

/// Create a subscription checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<RedirectResponse>, ApiError> {
    let billing = billing(&state)?;

    let customer = CustomerRef::from_wire(&payload.customer, &payload.email)
        .map_err(|e| payment_error(&e, "CHECKOUT_ERROR"))?;

    let tier = state
        .catalog
        .get_membership(&payload.membership_id)
        .await
        .map_err(|e| {
            tracing::error!("Catalog error: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", "CATALOG_ERROR")
        })?
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "Membership not found",
                "MEMBERSHIP_NOT_FOUND",
            )
        })?;

    if tier.price_reference != payload.price_reference {
        tracing::warn!(
            membership_id = %tier.id,
            expected = %tier.price_reference,
            requested = %payload.price_reference,
            "Checkout price does not match membership"
        );
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Price does not belong to this membership",
            "PRICE_MISMATCH",
        ));
    }

    let order = CheckoutOrder {
        subscriber_id: payload.subscriber_id,
        subscriber_name: payload.name,
        content_owner_id: payload.owner_id,
        membership_id: payload.membership_id,
        price_reference: payload.price_reference,
        customer,
    };

    let redirect = billing.checkout.create_checkout(order).await.map_err(|e| {
        tracing::error!("Checkout error: {}", e);
        payment_error(&e, "CHECKOUT_ERROR")
    })?;

    Ok(Json(RedirectResponse {
        redirect_url: redirect.url,
    }))
}

/// Open the billing portal for a subscriber
pub async fn customer_portal(
    State(state): State<AppState>,
    Json(payload): Json<PortalRequest>,
) -> Result<Json<RedirectResponse>, ApiError> {
    let billing = billing(&state)?;

    let profile = state
        .profiles
        .get_profile(&payload.subscriber_id)
        .await
        .map_err(|e| {
            tracing::error!("Profile lookup error: {}", e);
            payment_error(&PaymentError::Ledger(e), "PORTAL_ERROR")
        })?;

    let customer_id = profile.and_then(|p| p.billing_customer_id);

    let portal = billing
        .checkout
        .create_portal_session(customer_id.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(subscriber_id = %payload.subscriber_id, "Portal error: {}", e);
            payment_error(&e, "PORTAL_ERROR")
        })?;

    Ok(Json(RedirectResponse {
        redirect_url: portal.url,
    }))
}

/// Register a monthly price for a new membership tier
pub async fn create_membership_price(
    State(state): State<AppState>,
    Json(payload): Json<MembershipPriceRequest>,
) -> Result<Json<MembershipPriceResponse>, ApiError> {
    let billing = billing(&state)?;

    let price_reference = billing
        .checkout
        .create_membership_price(NewMembershipPrice {
            title: payload.title,
            amount: payload.price,
            owner_id: payload.owner_id,
            owner_name: payload.name,
        })
        .await
        .map_err(|e| {
            tracing::error!("Membership price error: {}", e);
            payment_error(&e, "PRICE_ERROR")
        })?;

    Ok(Json(MembershipPriceResponse { price_reference }))
}

/// Checkout session detail for the result page
pub async fn retrieve_checkout(
    State(state): State<AppState>,
    Json(payload): Json<RetrieveCheckoutRequest>,
) -> Result<Json<CheckoutSessionDetail>, ApiError> {
    let billing = billing(&state)?;

    let detail = billing
        .checkout
        .retrieve_checkout_session(&payload.session_id)
        .await
        .map_err(|e| {
            tracing::warn!("Checkout retrieval error: {}", e);
            payment_error(&e, "RETRIEVE_ERROR")
        })?;

    Ok(Json(detail))
}

/// Decide whether the calling viewer may see a content item
pub async fn content_access(
    State(state): State<AppState>,
    Path(content_id): Path<ContentId>,
    headers: HeaderMap,
) -> Result<Json<AccessResponse>, ApiError> {
    let viewer = viewer(&headers)?;

    let item = state
        .catalog
        .get_content(&content_id)
        .await
        .map_err(|e| {
            tracing::error!("Catalog error: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", "CATALOG_ERROR")
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Content not found", "NOT_FOUND"))?;

    let subscriptions = subscriptions(&state, viewer.as_ref()).await?;

    let decision = evaluate(viewer.as_ref(), &item, &subscriptions, Utc::now());

    Ok(Json(AccessResponse {
        content_id,
        granted: decision.is_granted(),
        decision,
    }))
}

/// A member page: the owner's posts with a decision for each
pub async fn member_feed(
    State(state): State<AppState>,
    Path(owner_id): Path<SubscriberId>,
    headers: HeaderMap,
) -> Result<Json<Vec<FeedEntry>>, ApiError> {
    let viewer = viewer(&headers)?;

    let items = state.catalog.content_by_owner(&owner_id).await.map_err(|e| {
        tracing::error!("Catalog error: {}", e);
        error(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", "CATALOG_ERROR")
    })?;

    let subscriptions = subscriptions(&state, viewer.as_ref()).await?;

    let entries = visible_items(viewer.as_ref(), &items, &subscriptions, Utc::now())
        .into_iter()
        .map(|(item, decision)| FeedEntry {
            content_id: item.id,
            gating_membership_id: item.gating_membership_id,
            granted: decision.is_granted(),
            decision,
        })
        .collect();

    Ok(Json(entries))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let billing = billing(&state)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    // 400 only for a bad signature; parse failures answer 500 so the provider redelivers.
    let event = billing.reconciler.verify(&body, signature).map_err(|e| match e {
        PaymentError::WebhookSignature(_) => {
            tracing::warn!("Webhook verification failed: {}", e);
            error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        }
        _ => {
            tracing::error!("Webhook payload rejected: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed",
                "WEBHOOK_ERROR",
            )
        }
    })?;

    // Run to completion even if the provider hangs up mid-request.
    let reconciler = billing.reconciler.clone();
    let event_id = event.id.clone();
    let outcome = tokio::spawn(async move { reconciler.reconcile(&event).await })
        .await
        .map_err(|e| {
            tracing::error!(event_id = %event_id, "Webhook task failed: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed",
                "WEBHOOK_ERROR",
            )
        })?;

    match outcome {
        Ok(ReconcileOutcome::Ignored { event_type }) => {
            tracing::debug!(event_id = %event_id, event_type = %event_type, "Webhook ignored");
            Ok(StatusCode::OK)
        }
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!(
                event_id = %event_id,
                retryable = e.is_retryable(),
                "Webhook processing error: {}",
                e
            );
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed",
                "WEBHOOK_ERROR",
            ))
        }
    }
}
