//! Stripe Integration
//!
//! `BillingProvider` backed by Stripe Checkout (hosted), the billing portal and
//! signed webhooks.

use async_trait::async_trait;
use std::collections::HashMap;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionBillingAddressCollection,
    CheckoutSessionMode, Client, CreateBillingPortalSession, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreatePrice, CreatePriceRecurring,
    CreatePriceRecurringInterval, CreateProduct, Currency, CustomerId, Event, EventObject,
    EventType, IdOrCreate, Price, Product, Subscription, Webhook, WebhookError,
};

use membership_core::{
    BillingCustomerId, CheckoutSessionId, MembershipId, PriceReference, SubscriptionId,
};

use crate::error::{PaymentError, Result};
use crate::provider::{
    BillingEvent, BillingProvider, CheckoutMetadata, CheckoutRedirect, CheckoutSessionDetail,
    CheckoutSessionRequest, CustomerRef, META_MEMBERSHIP_ID, NewMembershipPrice, PortalRedirect,
    SubscriptionSnapshot, VerifiedEvent,
};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }
}

fn stripe_error(e: stripe::StripeError) -> PaymentError {
    PaymentError::Stripe(e.to_string())
}

fn parse_customer_id(id: &BillingCustomerId) -> Result<CustomerId> {
    id.as_str()
        .parse::<CustomerId>()
        .map_err(|e| PaymentError::InvalidRequest(format!("Invalid customer ID: {e}")))
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutRedirect> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.billing_address_collection = Some(CheckoutSessionBillingAddressCollection::Auto);
        params.metadata = Some(request.metadata.to_map());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_reference.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);

        match &request.customer {
            CustomerRef::New { email } => params.customer_email = Some(email.as_str()),
            CustomerRef::Existing { customer_id } => {
                params.customer = Some(parse_customer_id(customer_id)?);
            }
        }

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(
            session_id = %session.id,
            subscriber_id = %request.metadata.subscriber_id,
            membership_id = %request.metadata.membership_id,
            "Created checkout session"
        );

        Ok(CheckoutRedirect {
            session_id: CheckoutSessionId::new(session.id.to_string()),
            url,
        })
    }

    async fn create_membership_price(
        &self,
        request: &NewMembershipPrice,
    ) -> Result<PriceReference> {
        let mut product_params = CreateProduct::new(&request.title);
        product_params.metadata = Some(HashMap::from([
            ("owner_id".to_string(), request.owner_id.to_string()),
            ("owner_name".to_string(), request.owner_name.clone()),
        ]));

        let product = Product::create(&self.client, product_params)
            .await
            .map_err(stripe_error)?;

        let mut price_params = CreatePrice::new(Currency::JPY);
        price_params.product = Some(IdOrCreate::Id(product.id.as_str()));
        price_params.unit_amount = Some(request.amount);
        price_params.recurring = Some(CreatePriceRecurring {
            interval: CreatePriceRecurringInterval::Month,
            interval_count: None,
            aggregate_usage: None,
            trial_period_days: None,
            usage_type: None,
        });

        let price = Price::create(&self.client, price_params)
            .await
            .map_err(stripe_error)?;

        tracing::info!(
            owner_id = %request.owner_id,
            product_id = %product.id,
            price_id = %price.id,
            amount = request.amount,
            "Created membership price"
        );

        Ok(PriceReference::new(price.id.to_string()))
    }

    async fn create_portal_session(
        &self,
        customer_id: &BillingCustomerId,
        return_url: &str,
    ) -> Result<PortalRedirect> {
        let mut params = CreateBillingPortalSession::new(parse_customer_id(customer_id)?);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        tracing::info!(customer_id = %session.customer, "Created billing portal session");

        Ok(PortalRedirect { url: session.url })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<CheckoutSessionDetail> {
        let id = session_id
            .as_str()
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| PaymentError::InvalidRequest(format!("Invalid session ID: {e}")))?;

        let session = CheckoutSession::retrieve(&self.client, &id, &["customer"])
            .await
            .map_err(stripe_error)?;

        let customer_email = session.customer_email.clone().or_else(|| {
            session
                .customer_details
                .as_ref()
                .and_then(|details| details.email.clone())
        });

        let membership_id = session
            .metadata
            .as_ref()
            .and_then(|m| m.get(META_MEMBERSHIP_ID))
            .and_then(|raw| raw.parse::<MembershipId>().ok());

        Ok(CheckoutSessionDetail {
            session_id: session_id.clone(),
            status: session.status.map(|s| s.to_string()),
            payment_status: session.payment_status.to_string(),
            customer_id: session
                .customer
                .as_ref()
                .map(|c| BillingCustomerId::new(c.id().to_string())),
            customer_email,
            subscription_id: session
                .subscription
                .as_ref()
                .map(|s| SubscriptionId::new(s.id().to_string())),
            membership_id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<SubscriptionSnapshot> {
        let id = subscription_id
            .as_str()
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| PaymentError::WebhookParse(format!("Invalid subscription ID: {e}")))?;

        let subscription = Subscription::retrieve(&self.client, &id, &[])
            .await
            .map_err(stripe_error)?;

        let price_reference = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| PriceReference::new(price.id.to_string()))
            .ok_or_else(|| {
                PaymentError::Stripe(format!("Subscription {subscription_id} has no price"))
            })?;

        Ok(SubscriptionSnapshot {
            subscription_id: SubscriptionId::new(subscription.id.to_string()),
            customer_id: BillingCustomerId::new(subscription.customer.id().to_string()),
            price_reference,
            current_period_end: subscription.current_period_end,
        })
    }

    fn verify_and_parse_webhook(&self, payload: &str, signature: &str) -> Result<VerifiedEvent> {
        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| match e {
                WebhookError::BadParse(err) => PaymentError::WebhookParse(err.to_string()),
                other => PaymentError::WebhookSignature(other.to_string()),
            })?;

        parse_event(&event)
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

/// Map a verified Stripe event onto the closed set of billing events
fn parse_event(event: &Event) -> Result<VerifiedEvent> {
    let parsed = match event.type_ {
        EventType::CheckoutSessionCompleted => {
            let EventObject::CheckoutSession(session) = &event.data.object else {
                return Err(PaymentError::WebhookParse(
                    "Invalid checkout session data".into(),
                ));
            };

            match &session.subscription {
                Some(subscription) => {
                    let metadata = session.metadata.as_ref().ok_or_else(|| {
                        PaymentError::WebhookParse("checkout session has no metadata".into())
                    })?;

                    BillingEvent::CheckoutCompleted {
                        session_id: CheckoutSessionId::new(session.id.to_string()),
                        subscription_id: SubscriptionId::new(subscription.id().to_string()),
                        metadata: CheckoutMetadata::from_map(metadata)?,
                    }
                }
                // One-off payment sessions carry no membership
                None => BillingEvent::Ignored {
                    event_type: "checkout.session.completed (no subscription)".into(),
                },
            }
        }

        EventType::InvoicePaymentSucceeded => {
            let EventObject::Invoice(invoice) = &event.data.object else {
                return Err(PaymentError::WebhookParse("Invalid invoice data".into()));
            };

            match &invoice.subscription {
                Some(subscription) => BillingEvent::InvoicePaymentSucceeded {
                    subscription_id: SubscriptionId::new(subscription.id().to_string()),
                },
                None => BillingEvent::Ignored {
                    event_type: "invoice.payment_succeeded (no subscription)".into(),
                },
            }
        }

        _ => BillingEvent::Ignored {
            event_type: format!("{:?}", event.type_),
        },
    };

    Ok(VerifiedEvent {
        id: event.id.to_string(),
        event: parsed,
    })
}
