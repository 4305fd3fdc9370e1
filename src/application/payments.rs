use crate::domain::{Order, Tier, User};
use crate::infrastructure::{
    CustomerDetails, GatewayError, GatewayOrderRequest, OrderMeta, OrderRepository, PaymentGateway,
    RepositoryError, UserRepository, WebhookVerifier,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

const DEFAULT_CUSTOMER_NAME: &str = "AskShot User";
const DEFAULT_CUSTOMER_PHONE: &str = "9999999999";
const ORDER_NOTE: &str = "AskShot Premium Subscription";
const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Order ID is required")]
    MissingOrderId,
    #[error("You already have a premium subscription")]
    AlreadyPremium,
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Gateway response had no payment session id")]
    MissingSessionId,
    #[error("Invalid webhook payload: {0}")]
    InvalidWebhook(String),
    #[error("Webhook signature missing or invalid")]
    InvalidSignature,
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub amount: f64,
    pub currency: String,
    pub public_base_url: String,
    pub paid_max_credits: i32,
    pub require_signature: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub session_id: String,
}

/// Gateway notification reduced to the fields the upgrade needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub order_id: String,
    pub status: String,
    pub reference_id: Option<String>,
    pub amount: Option<f64>,
}

impl WebhookEvent {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Signature headers sent alongside a webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookSignature {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upgraded,
    AlreadyProcessed,
    NotSuccessful,
    UnknownOrder,
}

pub struct PaymentService<U, O>
where
    U: UserRepository,
    O: OrderRepository,
{
    user_repo: Arc<U>,
    order_repo: Arc<O>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    settings: PaymentSettings,
}

impl<U, O> PaymentService<U, O>
where
    U: UserRepository,
    O: OrderRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        order_repo: Arc<O>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            user_repo,
            order_repo,
            gateway,
            verifier,
            settings,
        }
    }

    pub async fn create_order(&self, user: &User) -> Result<CreatedOrder, PaymentError> {
        if user.tier == Tier::Paid {
            return Err(PaymentError::AlreadyPremium);
        }

        let mut order = Order::new(
            user.id,
            self.settings.amount,
            self.settings.currency.clone(),
            Utc::now(),
        );

        let request = GatewayOrderRequest {
            order_id: order.id.clone(),
            order_amount: order.amount,
            order_currency: order.currency.clone(),
            customer_details: CustomerDetails {
                customer_id: user.id.to_string(),
                customer_name: user
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
                customer_email: user.email.clone(),
                customer_phone: DEFAULT_CUSTOMER_PHONE.to_string(),
            },
            order_meta: OrderMeta {
                return_url: format!(
                    "{}/payment/status?order_id={}",
                    self.settings.public_base_url.trim_end_matches('/'),
                    order.id
                ),
            },
            order_note: ORDER_NOTE.to_string(),
        };

        let created = self.gateway.create_order(&request).await?;
        let session_id = created
            .payment_session_id
            .filter(|s| !s.is_empty())
            .ok_or(PaymentError::MissingSessionId)?;

        order.payment_session_id = Some(session_id.clone());
        self.order_repo.create(&order).await?;

        info!(user_id = %user.id, order_id = %order.id, "Payment order created");

        Ok(CreatedOrder {
            order_id: order.id,
            session_id,
        })
    }

    /// Asks the gateway whether the caller's order was paid, upgrading on success.
    pub async fn verify_payment(&self, user: &User, order_id: &str) -> Result<bool, PaymentError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(PaymentError::MissingOrderId);
        }

        let order = match self.order_repo.get_by_id(order_id).await? {
            Some(order) if order.user_id == user.id => order,
            _ => return Err(PaymentError::OrderNotFound(order_id.to_string())),
        };

        if order.is_paid() {
            self.ensure_owner_upgraded(&order).await?;
            return Ok(true);
        }

        let payments = self.gateway.order_payments(order_id).await?;
        let paid = payments.first().is_some_and(|p| p.is_success());
        if !paid {
            info!(user_id = %user.id, order_id = %order_id, "Payment not confirmed by gateway");
            return Ok(false);
        }

        self.complete_order(&order, None).await?;
        Ok(true)
    }

    pub async fn handle_webhook(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        signature: &WebhookSignature,
    ) -> Result<WebhookOutcome, PaymentError> {
        self.check_signature(body, signature)?;
        let event = parse_webhook(body, content_type)?;

        if !event.is_success() {
            info!(order_id = %event.order_id, status = %event.status, "Ignoring non-success webhook");
            return Ok(WebhookOutcome::NotSuccessful);
        }

        let Some(order) = self.order_repo.get_by_id(&event.order_id).await? else {
            warn!(order_id = %event.order_id, "Webhook for unknown order ignored");
            return Ok(WebhookOutcome::UnknownOrder);
        };

        if let Some(amount) = event.amount {
            if (amount - order.amount).abs() > f64::EPSILON {
                warn!(
                    order_id = %order.id,
                    expected = order.amount,
                    received = amount,
                    "Webhook amount differs from order"
                );
            }
        }

        if self.complete_order(&order, event.reference_id).await? {
            Ok(WebhookOutcome::Upgraded)
        } else {
            Ok(WebhookOutcome::AlreadyProcessed)
        }
    }

    fn check_signature(&self, body: &[u8], headers: &WebhookSignature) -> Result<(), PaymentError> {
        match (headers.signature.as_deref(), headers.timestamp.as_deref()) {
            (Some(signature), Some(timestamp)) => {
                if self.verifier.verify(timestamp, body, signature) {
                    Ok(())
                } else {
                    Err(PaymentError::InvalidSignature)
                }
            }
            _ if self.settings.require_signature => Err(PaymentError::InvalidSignature),
            _ => Ok(()),
        }
    }

    /// Marks the order paid and upgrades its owner. Returns `true` when this call
    /// upgraded the owner, `false` when the order was already complete.
    async fn complete_order(&self, order: &Order, reference_id: Option<String>) -> Result<bool, PaymentError> {
        if !self.order_repo.mark_paid(&order.id, reference_id, Utc::now()).await? {
            info!(order_id = %order.id, "Order already paid");
            return self.ensure_owner_upgraded(order).await;
        }

        self.upgrade_owner(order).await?;
        info!(order_id = %order.id, user_id = %order.user_id, "Order paid, user upgraded");
        Ok(true)
    }

    /// A paid order whose owner is still on the free tier had its upgrade fail
    /// after the order was marked paid. Gateway retries and verify calls land
    /// here and re-apply it.
    async fn ensure_owner_upgraded(&self, order: &Order) -> Result<bool, PaymentError> {
        let owner = self.user_repo.get_by_id(order.user_id).await?;
        if owner.tier == Tier::Paid {
            return Ok(false);
        }

        warn!(order_id = %order.id, user_id = %order.user_id, "Paid order owner still free, re-applying upgrade");
        self.upgrade_owner(order).await?;
        Ok(true)
    }

    async fn upgrade_owner(&self, order: &Order) -> Result<(), PaymentError> {
        self.user_repo
            .upgrade_tier(order.user_id, Tier::Paid, self.settings.paid_max_credits)
            .await
            .map_err(|e| {
                error!(order_id = %order.id, user_id = %order.user_id, error = %e, "Order paid but upgrade failed");
                PaymentError::from(e)
            })
    }
}

/// Normalizes a webhook body. Accepts JSON or form encoding, in either the
/// legacy flat shape (`orderId`, `txStatus`) or the nested `data.order` /
/// `data.payment` shape.
pub fn parse_webhook(body: &[u8], content_type: Option<&str>) -> Result<WebhookEvent, PaymentError> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let value = if is_form {
        form_to_value(body)?
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(v) => v,
            Err(_) if content_type.is_none() => form_to_value(body)?,
            Err(e) => return Err(PaymentError::InvalidWebhook(e.to_string())),
        }
    };

    event_from_value(&value)
}

fn form_to_value(body: &[u8]) -> Result<Value, PaymentError> {
    let fields: HashMap<String, String> = serde_urlencoded::from_bytes(body)
        .map_err(|e| PaymentError::InvalidWebhook(e.to_string()))?;
    serde_json::to_value(fields).map_err(|e| PaymentError::InvalidWebhook(e.to_string()))
}

fn event_from_value(value: &Value) -> Result<WebhookEvent, PaymentError> {
    let order_id = text(&value["orderId"]).or_else(|| text(&value["data"]["order"]["order_id"]));
    let status = text(&value["txStatus"]).or_else(|| text(&value["data"]["payment"]["payment_status"]));

    let order_id = order_id.ok_or_else(|| PaymentError::InvalidWebhook("missing order id".to_string()))?;
    let status = status.ok_or_else(|| PaymentError::InvalidWebhook("missing payment status".to_string()))?;

    Ok(WebhookEvent {
        order_id,
        status: status.to_uppercase(),
        reference_id: text(&value["referenceId"])
            .or_else(|| text(&value["data"]["payment"]["cf_payment_id"])),
        amount: number(&value["orderAmount"]).or_else(|| number(&value["data"]["order"]["order_amount"])),
    })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreditPolicy, OrderStatus};
    use crate::infrastructure::{
        GatewayOrder, GatewayPayment, MockOrderRepository, MockPaymentGateway, MockUserRepository,
    };
    use mockall::predicate::eq;

    fn settings(require_signature: bool) -> PaymentSettings {
        PaymentSettings {
            amount: 1.0,
            currency: "INR".to_string(),
            public_base_url: "https://askshot.test/".to_string(),
            paid_max_credits: 20,
            require_signature,
        }
    }

    fn free_user() -> User {
        User::new(
            "ada@example.com".to_string(),
            None,
            None,
            &CreditPolicy::default(),
            Utc::now(),
        )
    }

    fn service(
        users: MockUserRepository,
        orders: MockOrderRepository,
        gateway: MockPaymentGateway,
        require_signature: bool,
    ) -> PaymentService<MockUserRepository, MockOrderRepository> {
        PaymentService::new(
            Arc::new(users),
            Arc::new(orders),
            Arc::new(gateway),
            WebhookVerifier::new("gateway-secret".to_string()),
            settings(require_signature),
        )
    }

    #[test]
    fn parses_legacy_json_and_form_bodies() {
        let json = br#"{"orderId":"order_1_u","orderAmount":"1.00","referenceId":"ref-9","txStatus":"SUCCESS"}"#;
        let event = parse_webhook(json, Some("application/json")).unwrap();
        assert_eq!(event.order_id, "order_1_u");
        assert_eq!(event.reference_id.as_deref(), Some("ref-9"));
        assert_eq!(event.amount, Some(1.0));
        assert!(event.is_success());

        let form = b"orderId=order_2_u&orderAmount=1&referenceId=77&txStatus=FAILED";
        let event = parse_webhook(form, Some("application/x-www-form-urlencoded")).unwrap();
        assert_eq!(event.order_id, "order_2_u");
        assert!(!event.is_success());
    }

    #[test]
    fn parses_nested_payload() {
        let body = br#"{"data":{"order":{"order_id":"order_3_u","order_amount":1},
            "payment":{"cf_payment_id":12345,"payment_status":"SUCCESS"}},"type":"PAYMENT_SUCCESS_WEBHOOK"}"#;
        let event = parse_webhook(body, None).unwrap();

        assert_eq!(event.order_id, "order_3_u");
        assert_eq!(event.reference_id.as_deref(), Some("12345"));
        assert!(event.is_success());
    }

    #[test]
    fn rejects_body_without_order_id() {
        assert!(matches!(
            parse_webhook(br#"{"txStatus":"SUCCESS"}"#, Some("application/json")),
            Err(PaymentError::InvalidWebhook(_))
        ));
        assert!(matches!(
            parse_webhook(b"{not json", Some("application/json")),
            Err(PaymentError::InvalidWebhook(_))
        ));
    }

    #[tokio::test]
    async fn paid_user_cannot_create_order() {
        let mut user = free_user();
        user.tier = Tier::Paid;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().never();

        let svc = service(MockUserRepository::new(), MockOrderRepository::new(), gateway, false);
        assert!(matches!(svc.create_order(&user).await, Err(PaymentError::AlreadyPremium)));
    }

    #[tokio::test]
    async fn create_order_persists_session_id() {
        let user = free_user();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .withf(|r| {
                r.customer_details.customer_name == "AskShot User"
                    && r.order_meta.return_url.starts_with("https://askshot.test/payment/status?order_id=order_")
            })
            .returning(|r| {
                Ok(GatewayOrder {
                    order_id: Some(r.order_id.clone()),
                    payment_session_id: Some("session_abc".to_string()),
                    order_status: Some("ACTIVE".to_string()),
                })
            });

        let mut orders = MockOrderRepository::new();
        orders
            .expect_create()
            .withf(|o| o.status == OrderStatus::Created && o.payment_session_id.as_deref() == Some("session_abc"))
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(MockUserRepository::new(), orders, gateway, false);
        let created = svc.create_order(&user).await.unwrap();

        assert_eq!(created.session_id, "session_abc");
        assert!(created.order_id.ends_with(&user.id.to_string()));
    }

    #[tokio::test]
    async fn missing_session_id_is_an_error_and_nothing_is_stored() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().returning(|_| {
            Ok(GatewayOrder {
                order_id: None,
                payment_session_id: None,
                order_status: None,
            })
        });
        let mut orders = MockOrderRepository::new();
        orders.expect_create().never();

        let svc = service(MockUserRepository::new(), orders, gateway, false);
        assert!(matches!(
            svc.create_order(&free_user()).await,
            Err(PaymentError::MissingSessionId)
        ));
    }

    #[tokio::test]
    async fn verify_upgrades_on_successful_payment() {
        let user = free_user();
        let order = Order::new(user.id, 1.0, "INR".to_string(), Utc::now());
        let order_id = order.id.clone();

        let mut orders = MockOrderRepository::new();
        orders
            .expect_get_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        orders.expect_mark_paid().times(1).returning(|_, _, _| Ok(true));

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_order_payments().returning(|_| {
            Ok(vec![GatewayPayment {
                payment_status: "SUCCESS".to_string(),
                payment_amount: Some(1.0),
            }])
        });

        let mut users = MockUserRepository::new();
        users
            .expect_upgrade_tier()
            .with(eq(user.id), eq(Tier::Paid), eq(20))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let svc = service(users, orders, gateway, false);
        assert!(svc.verify_payment(&user, &order_id).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_missing_and_foreign_orders() {
        let order = Order::new(uuid::Uuid::new_v4(), 1.0, "INR".to_string(), Utc::now());
        let order_id = order.id.clone();

        let mut orders = MockOrderRepository::new();
        orders
            .expect_get_by_id()
            .returning(move |_| Ok(Some(order.clone())));

        let svc = service(MockUserRepository::new(), orders, MockPaymentGateway::new(), false);
        let user = free_user();

        assert!(matches!(
            svc.verify_payment(&user, " ").await,
            Err(PaymentError::MissingOrderId)
        ));
        assert!(matches!(
            svc.verify_payment(&user, &order_id).await,
            Err(PaymentError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn webhook_for_unknown_order_is_acknowledged() {
        let mut orders = MockOrderRepository::new();
        orders.expect_get_by_id().returning(|_| Ok(None));
        orders.expect_mark_paid().never();

        let svc = service(MockUserRepository::new(), orders, MockPaymentGateway::new(), false);
        let outcome = svc
            .handle_webhook(
                br#"{"orderId":"order_9_x","txStatus":"SUCCESS"}"#,
                Some("application/json"),
                &WebhookSignature::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::UnknownOrder);
    }

    #[tokio::test]
    async fn webhook_retry_repairs_failed_upgrade() {
        let user = free_user();
        let user_id = user.id;
        let order = Order::new(user_id, 1.0, "INR".to_string(), Utc::now());
        let body = format!(r#"{{"orderId":"{}","txStatus":"SUCCESS"}}"#, order.id);

        let mut orders = MockOrderRepository::new();
        orders
            .expect_get_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        let mut marked = false;
        orders.expect_mark_paid().times(2).returning(move |_, _, _| {
            let first = !marked;
            marked = true;
            Ok(first)
        });

        let mut users = MockUserRepository::new();
        let mut upgrade_calls = 0;
        users
            .expect_upgrade_tier()
            .with(eq(user_id), eq(Tier::Paid), eq(20))
            .times(2)
            .returning(move |_, _, _| {
                upgrade_calls += 1;
                if upgrade_calls == 1 {
                    Err(RepositoryError::InvalidData("transient db error".to_string()))
                } else {
                    Ok(())
                }
            });
        users
            .expect_get_by_id()
            .with(eq(user_id))
            .times(1)
            .returning(move |_| Ok(user.clone()));

        let svc = service(users, orders, MockPaymentGateway::new(), false);

        let first = svc
            .handle_webhook(body.as_bytes(), Some("application/json"), &WebhookSignature::default())
            .await;
        assert!(matches!(first, Err(PaymentError::Repository(_))));

        let retry = svc
            .handle_webhook(body.as_bytes(), Some("application/json"), &WebhookSignature::default())
            .await
            .unwrap();
        assert_eq!(retry, WebhookOutcome::Upgraded);
    }

    #[tokio::test]
    async fn verify_on_paid_order_upgrades_owner_left_on_free_tier() {
        let user = free_user();
        let mut order = Order::new(user.id, 1.0, "INR".to_string(), Utc::now());
        order.status = OrderStatus::Paid;
        let order_id = order.id.clone();

        let mut orders = MockOrderRepository::new();
        orders
            .expect_get_by_id()
            .returning(move |_| Ok(Some(order.clone())));
        orders.expect_mark_paid().never();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_order_payments().never();

        let stored = user.clone();
        let mut users = MockUserRepository::new();
        users.expect_get_by_id().returning(move |_| Ok(stored.clone()));
        users.expect_upgrade_tier().times(1).returning(|_, _, _| Ok(()));

        let svc = service(users, orders, gateway, false);
        assert!(svc.verify_payment(&user, &order_id).await.unwrap());
    }

    #[tokio::test]
    async fn webhook_signature_is_enforced() {
        let body = br#"{"orderId":"order_9_x","txStatus":"SUCCESS"}"#;
        let svc = service(
            MockUserRepository::new(),
            MockOrderRepository::new(),
            MockPaymentGateway::new(),
            true,
        );

        let missing = svc.handle_webhook(body, None, &WebhookSignature::default()).await;
        assert!(matches!(missing, Err(PaymentError::InvalidSignature)));

        let forged = WebhookSignature {
            signature: Some(WebhookVerifier::new("wrong".to_string()).sign("1700000000", body)),
            timestamp: Some("1700000000".to_string()),
        };
        let result = svc.handle_webhook(body, None, &forged).await;
        assert!(matches!(result, Err(PaymentError::InvalidSignature)));
    }
}
