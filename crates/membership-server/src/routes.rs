//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    content_access, create_checkout, create_membership_price, customer_portal, health_check,
    member_feed, retrieve_checkout, stripe_webhook,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Access
        .route("/api/content/{content_id}/access", get(content_access))
        .route("/api/members/{owner_id}/content", get(member_feed))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/api/checkout/retrieve", post(retrieve_checkout))
        .route("/api/customer-portal", post(customer_portal))
        .route("/api/memberships/price", post(create_membership_price))
        .route("/webhook/stripe", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    use membership_core::{
        ContentId, ContentItem, MembershipId, MembershipTier, MemoryCatalog, MemoryLedger,
        ProfileStore, SubscriberId, SubscriberProfile, SubscriptionLedger, SubscriptionRecord,
    };
    use membership_payments::{
        BillingEvent, CheckoutMetadata, CheckoutSessionDetail, MockBillingProvider,
        SubscriptionSnapshot, VerifiedEvent,
    };

    use crate::handlers::VIEWER_HEADER;
    use crate::state::Billing;

    struct TestApp {
        ledger: Arc<MemoryLedger>,
        catalog: Arc<MemoryCatalog>,
        provider: Arc<MockBillingProvider>,
        state: AppState,
    }

    fn app(with_billing: bool) -> TestApp {
        let ledger = Arc::new(MemoryLedger::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let provider = Arc::new(MockBillingProvider::new());

        let billing = with_billing.then(|| {
            Arc::new(Billing::new(
                provider.clone(),
                ledger.clone(),
                ledger.clone(),
                "https://members.example.com",
            ))
        });

        let state = AppState {
            ledger: ledger.clone(),
            profiles: ledger.clone(),
            catalog: catalog.clone(),
            billing,
        };

        TestApp {
            ledger,
            catalog,
            provider,
            state,
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn membership(t: &TestApp, price_reference: &str) -> MembershipTier {
        let tier = MembershipTier {
            id: MembershipId::new(),
            owner_id: SubscriberId::new(),
            price_reference: price_reference.into(),
            title: "Gold".into(),
        };
        t.catalog.insert_membership(tier.clone()).await;
        tier
    }

    fn checkout_body(tier: &MembershipTier, customer: &str, price_reference: &str) -> Value {
        json!({
            "subscriber_id": SubscriberId::new(),
            "name": "Reader",
            "owner_id": tier.owner_id,
            "membership_id": tier.id,
            "customer": customer,
            "email": "reader@example.com",
            "price_reference": price_reference,
        })
    }

    fn webhook(body: String, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/webhook/stripe");
        if let Some(sig) = signature {
            builder = builder.header("Stripe-Signature", sig);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_billing() {
        let t = app(true);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&t.state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stripe_configured"], true);
        assert_eq!(body["billing_provider"], "mock");
    }

    #[tokio::test]
    async fn test_payments_disabled_without_provider() {
        let t = app(false);
        let (status, body) = send(&t.state, webhook("{}".into(), Some("sig"))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PAYMENTS_DISABLED");
    }

    #[tokio::test]
    async fn test_checkout_new_customer() {
        let t = app(true);
        let tier = membership(&t, "price_gold").await;
        let request = checkout_body(&tier, "new", "price_gold");

        let (status, body) = send(&t.state, post_json("/api/checkout", &request)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(
            body["redirect_url"]
                .as_str()
                .unwrap()
                .starts_with("https://checkout.mock/")
        );
        assert_eq!(t.provider.checkout_requests().await.len(), 1);
        assert_eq!(t.ledger.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_checkout_unknown_membership() {
        let t = app(true);
        let request = json!({
            "subscriber_id": SubscriberId::new(),
            "name": "Reader",
            "owner_id": SubscriberId::new(),
            "membership_id": MembershipId::new(),
            "customer": "new",
            "email": "reader@example.com",
            "price_reference": "price_gold",
        });

        let (status, body) = send(&t.state, post_json("/api/checkout", &request)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "MEMBERSHIP_NOT_FOUND");
        assert!(t.provider.checkout_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_price_must_match_membership() {
        let t = app(true);
        let tier = membership(&t, "price_gold").await;
        let request = checkout_body(&tier, "new", "price_other");

        let (status, body) = send(&t.state, post_json("/api/checkout", &request)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "PRICE_MISMATCH");
        assert!(t.provider.checkout_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_provider_failure() {
        let t = app(true);
        t.provider.set_failing(true);
        let tier = membership(&t, "price_gold").await;
        let request = checkout_body(&tier, "cus_1", "price_gold");

        let (status, body) = send(&t.state, post_json("/api/checkout", &request)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "CHECKOUT_ERROR");
    }

    #[tokio::test]
    async fn test_portal_without_purchase() {
        let t = app(true);
        let subscriber = SubscriberId::new();
        t.ledger.register_profile(SubscriberProfile::new(subscriber)).await;

        let (status, body) = send(
            &t.state,
            post_json("/api/customer-portal", &json!({ "subscriber_id": subscriber })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NO_BILLING_IDENTITY");
    }

    #[tokio::test]
    async fn test_membership_price_below_minimum() {
        let t = app(true);
        let request = json!({
            "title": "Bronze",
            "price": 100,
            "owner_id": SubscriberId::new(),
            "name": "Author",
        });

        let (status, body) = send(&t.state, post_json("/api/memberships/price", &request)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_webhook_signature_checks() {
        let t = app(true);

        let (status, body) = send(&t.state, webhook("{}".into(), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_SIGNATURE");

        let (status, body) = send(&t.state, webhook("{}".into(), Some("forged"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn test_retrieve_checkout_session() {
        let t = app(true);
        let membership = MembershipId::new();
        t.provider
            .put_checkout_session(CheckoutSessionDetail {
                session_id: "cs_test_7".into(),
                status: Some("complete".into()),
                payment_status: "paid".into(),
                customer_id: Some("cus_1".into()),
                customer_email: Some("reader@example.com".into()),
                subscription_id: Some("sub_1".into()),
                membership_id: Some(membership),
            })
            .await;

        let (status, body) = send(
            &t.state,
            post_json("/api/checkout/retrieve", &json!({ "session_id": "cs_test_7" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment_status"], "paid");
        assert_eq!(body["customer_id"], "cus_1");
        assert_eq!(body["subscription_id"], "sub_1");
        assert_eq!(body["membership_id"], membership.to_string());

        let (status, body) = send(
            &t.state,
            post_json("/api/checkout/retrieve", &json!({ "session_id": "pi_1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_webhook_unparseable_payload_is_retried() {
        let t = app(true);
        let (status, body) = send(
            &t.state,
            webhook(
                r#"{"id":"evt_1","event":{"kind":"checkout_completed"}}"#.into(),
                Some(MockBillingProvider::SIGNATURE),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "WEBHOOK_ERROR");
        assert_eq!(t.provider.subscription_lookups(), 0);
    }

    #[tokio::test]
    async fn test_webhook_completion_then_access() {
        let t = app(true);
        let subscriber = SubscriberId::new();
        let owner = SubscriberId::new();
        let membership = MembershipId::new();
        t.ledger.register_profile(SubscriberProfile::new(subscriber)).await;

        let post = ContentItem::gated(owner, membership);
        t.catalog.insert_content(post.clone()).await;

        t.provider
            .put_subscription(SubscriptionSnapshot {
                subscription_id: "sub_1".into(),
                customer_id: "cus_1".into(),
                price_reference: "price_1".into(),
                current_period_end: (Utc::now() + Duration::days(30)).timestamp(),
            })
            .await;

        let access_uri = format!("/api/content/{}/access", post.id);
        let access = || {
            Request::get(&access_uri)
                .header(VIEWER_HEADER, subscriber.to_string())
                .body(Body::empty())
                .unwrap()
        };

        let (_, body) = send(&t.state, access()).await;
        assert_eq!(body["granted"], false);

        let event = VerifiedEvent {
            id: "evt_1".into(),
            event: BillingEvent::CheckoutCompleted {
                session_id: "cs_1".into(),
                subscription_id: "sub_1".into(),
                metadata: CheckoutMetadata {
                    subscriber_id: subscriber,
                    subscriber_name: "Reader".into(),
                    membership_id: membership,
                },
            },
        };
        let payload = MockBillingProvider::webhook_body(&event).unwrap();
        let (status, _) = send(
            &t.state,
            webhook(payload, Some(MockBillingProvider::SIGNATURE)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&t.state, access()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["granted"], true);
        assert_eq!(body["decision"]["reason"], "subscribed");

        let profile = t.ledger.get_profile(&subscriber).await.unwrap().unwrap();
        assert_eq!(profile.billing_customer_id, Some("cus_1".into()));
    }

    #[tokio::test]
    async fn test_webhook_renewal_for_unknown_subscription_fails() {
        let t = app(true);
        let event = VerifiedEvent {
            id: "evt_2".into(),
            event: BillingEvent::InvoicePaymentSucceeded {
                subscription_id: "sub_unknown".into(),
            },
        };
        let payload = MockBillingProvider::webhook_body(&event).unwrap();

        let (status, body) = send(
            &t.state,
            webhook(payload, Some(MockBillingProvider::SIGNATURE)),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "WEBHOOK_ERROR");
        assert_eq!(t.ledger.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_access_for_anonymous_and_expired() {
        let t = app(false);
        let owner = SubscriberId::new();
        let viewer = SubscriberId::new();
        let membership = MembershipId::new();

        let public = ContentItem::public(owner);
        let gated = ContentItem::gated(owner, membership);
        t.catalog.insert_content(public.clone()).await;
        t.catalog.insert_content(gated.clone()).await;

        t.ledger
            .upsert_subscription(SubscriptionRecord {
                subscription_id: "sub_old".into(),
                subscriber_id: viewer,
                membership_id: membership,
                price_reference: "price_1".into(),
                billing_customer_id: "cus_1".into(),
                current_period_end: Some(Utc::now() - Duration::days(1)),
                created_at: Utc::now() - Duration::days(31),
            })
            .await
            .unwrap();

        let uri = |id: ContentId| format!("/api/content/{id}/access");

        let request = Request::get(uri(public.id)).body(Body::empty()).unwrap();
        let (_, body) = send(&t.state, request).await;
        assert_eq!(body["decision"]["reason"], "public");

        let request = Request::get(uri(gated.id)).body(Body::empty()).unwrap();
        let (_, body) = send(&t.state, request).await;
        assert_eq!(body["granted"], false);

        let request = Request::get(uri(gated.id))
            .header(VIEWER_HEADER, viewer.to_string())
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(&t.state, request).await;
        assert_eq!(body["decision"]["reason"], "denied");

        let request = Request::get(uri(gated.id))
            .header(VIEWER_HEADER, owner.to_string())
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(&t.state, request).await;
        assert_eq!(body["decision"]["reason"], "owner");
    }

    #[tokio::test]
    async fn test_member_feed_marks_gated_posts() {
        let t = app(false);
        let owner = SubscriberId::new();
        let viewer = SubscriberId::new();
        let paid = MembershipId::new();
        let unpaid = MembershipId::new();

        let mut public = ContentItem::public(owner);
        public.created_at = Utc::now() - Duration::days(3);
        let mut paid_post = ContentItem::gated(owner, paid);
        paid_post.created_at = Utc::now() - Duration::days(2);
        let mut unpaid_post = ContentItem::gated(owner, unpaid);
        unpaid_post.created_at = Utc::now() - Duration::days(1);
        for item in [&public, &paid_post, &unpaid_post] {
            t.catalog.insert_content(item.clone()).await;
        }
        t.catalog.insert_content(ContentItem::public(viewer)).await;

        t.ledger
            .upsert_subscription(SubscriptionRecord {
                subscription_id: "sub_feed".into(),
                subscriber_id: viewer,
                membership_id: paid,
                price_reference: "price_1".into(),
                billing_customer_id: "cus_1".into(),
                current_period_end: Some(Utc::now() + Duration::days(10)),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let request = Request::get(format!("/api/members/{owner}/content"))
            .header(VIEWER_HEADER, viewer.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&t.state, request).await;

        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["content_id"], unpaid_post.id.to_string());
        assert_eq!(entries[0]["granted"], false);
        assert_eq!(entries[1]["decision"]["reason"], "subscribed");
        assert_eq!(entries[2]["decision"]["reason"], "public");

        let request = Request::get(format!("/api/members/{owner}/content"))
            .header(VIEWER_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&t.state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_VIEWER");
    }

    #[tokio::test]
    async fn test_access_unknown_content() {
        let t = app(false);
        let request = Request::get(format!("/api/content/{}/access", SubscriberId::new()))
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(&t.state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
