//! HTTP clients for the remote payment, inventory and shipping services.
//!
//! Non-2xx answers become [`ServiceError::rejected`] carrying the remote
//! status and its `detail` message; transport failures and timeouts become
//! [`ServiceError::unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use common::{LineItem, OrderId, ShippingAddress};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::inventory::{InventoryService, ReleaseResult, ReservationResult};
use super::payment::{PaymentResult, PaymentService, RefundResult};
use super::shipping::{CancellationResult, ShipmentResult, ShippingService};
use crate::error::{Result as SagaResult, ServiceError};

/// Per-request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct ServiceClient {
    service: &'static str,
    base_url: String,
    client: reqwest::Client,
}

impl ServiceClient {
    fn new(
        service: &'static str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> SagaResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            service,
            base_url: base_url.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn post_empty<R: DeserializeOwned>(&self, path: &str) -> Result<R, ServiceError> {
        self.send(self.client.post(self.url(path))).await
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, ServiceError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(service = self.service, error = %e, "request failed");
            ServiceError::unavailable(self.service, e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<R>().await.map_err(|e| {
                ServiceError::unavailable(self.service, format!("invalid response: {e}"))
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::unavailable(self.service, e.to_string()))?;
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("detail")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());

        tracing::warn!(service = self.service, status = status.as_u16(), %message, "request rejected");
        Err(ServiceError::rejected(self.service, status.as_u16(), message))
    }
}

/// Line item as the remote services read it.
#[derive(Serialize)]
struct WireItem<'a> {
    product_id: &'a str,
    name: &'a str,
    price: f64,
    quantity: u32,
}

fn wire_items(items: &[LineItem]) -> Vec<WireItem<'_>> {
    items
        .iter()
        .map(|item| WireItem {
            product_id: item.product_id.as_str(),
            name: &item.name,
            price: item.price.as_dollars(),
            quantity: item.quantity,
        })
        .collect()
}

/// Payment service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    inner: ServiceClient,
}

impl HttpPaymentService {
    /// Creates a client targeting `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> SagaResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request is aborted once `timeout` elapses.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SagaResult<Self> {
        Ok(Self {
            inner: ServiceClient::new("payment", base_url, timeout)?,
        })
    }
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    order_id: String,
    amount: f64,
    payment_method: &'a str,
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: common::Money,
        payment_method: &str,
    ) -> Result<PaymentResult, ServiceError> {
        tracing::info!(%order_id, %amount, "processing payment");
        let request = PaymentRequest {
            order_id: order_id.to_string(),
            amount: amount.as_dollars(),
            payment_method,
        };
        self.inner.post_json("/payments", &request).await
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<RefundResult, ServiceError> {
        tracing::info!(payment_id, "refunding payment");
        self.inner
            .post_empty(&format!("/payments/{payment_id}/refund"))
            .await
    }
}

/// Inventory service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpInventoryService {
    inner: ServiceClient,
}

impl HttpInventoryService {
    pub fn new(base_url: impl Into<String>) -> SagaResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request is aborted once `timeout` elapses.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SagaResult<Self> {
        Ok(Self {
            inner: ServiceClient::new("inventory", base_url, timeout)?,
        })
    }
}

#[derive(Serialize)]
struct ReservationRequest<'a> {
    order_id: String,
    items: Vec<WireItem<'a>>,
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<ReservationResult, ServiceError> {
        tracing::info!(%order_id, items = items.len(), "reserving inventory");
        let request = ReservationRequest {
            order_id: order_id.to_string(),
            items: wire_items(items),
        };
        self.inner.post_json("/inventory/reserve", &request).await
    }

    async fn release(&self, reservation_id: &str) -> Result<ReleaseResult, ServiceError> {
        tracing::info!(reservation_id, "releasing inventory");
        self.inner
            .post_empty(&format!("/inventory/release/{reservation_id}"))
            .await
    }
}

/// Shipping service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpShippingService {
    inner: ServiceClient,
}

impl HttpShippingService {
    pub fn new(base_url: impl Into<String>) -> SagaResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request is aborted once `timeout` elapses.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SagaResult<Self> {
        Ok(Self {
            inner: ServiceClient::new("shipping", base_url, timeout)?,
        })
    }
}

#[derive(Serialize)]
struct ShipmentRequest<'a> {
    order_id: String,
    items: Vec<WireItem<'a>>,
    address: &'a ShippingAddress,
}

#[async_trait]
impl ShippingService for HttpShippingService {
    async fn create_shipment(
        &self,
        order_id: OrderId,
        items: &[LineItem],
        address: &ShippingAddress,
    ) -> Result<ShipmentResult, ServiceError> {
        tracing::info!(%order_id, "creating shipment");
        let request = ShipmentRequest {
            order_id: order_id.to_string(),
            items: wire_items(items),
            address,
        };
        self.inner.post_json("/shipments", &request).await
    }

    async fn cancel_shipment(
        &self,
        shipment_id: &str,
    ) -> Result<CancellationResult, ServiceError> {
        tracing::info!(shipment_id, "cancelling shipment");
        self.inner
            .post_empty(&format!("/shipments/{shipment_id}/cancel"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use common::Money;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "123 Main St".to_string(),
            city: "Cityville".to_string(),
            state: "Stateland".to_string(),
            postal_code: "12345".to_string(),
            country: "Country".to_string(),
        }
    }

    fn items(product: &str, quantity: u32) -> Vec<LineItem> {
        vec![LineItem::new(product, "Product", Money::from_cents(1000), quantity)]
    }

    #[tokio::test]
    async fn payment_charge_and_refund() {
        let client = HttpPaymentService::new(spawn(mock_services::payment_router()).await).unwrap();

        let payment = client
            .process_payment(OrderId::new(), Money::from_cents(3500), "credit_card")
            .await
            .unwrap();
        assert!(!payment.payment_id.is_empty());
        assert!(!payment.transaction_id.is_empty());

        let refund = client.refund_payment(&payment.payment_id).await.unwrap();
        assert_eq!(refund.status, "completed");

        let again = client.refund_payment(&payment.payment_id).await.unwrap_err();
        assert_eq!(again.status, 400);
        assert_eq!(again.message, "Payment already refunded");
    }

    #[tokio::test]
    async fn payment_rejection_carries_detail() {
        let client = HttpPaymentService::new(spawn(mock_services::payment_router()).await).unwrap();

        let err = client
            .process_payment(OrderId::new(), Money::from_dollars(1500), "credit_card")
            .await
            .unwrap_err();
        assert_eq!(err.service, "payment");
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "Insufficient funds");
    }

    #[tokio::test]
    async fn inventory_reserve_and_release() {
        let client = HttpInventoryService::new(spawn(mock_services::inventory_router()).await).unwrap();

        let reservation = client
            .reserve(OrderId::new(), &items("product1", 2))
            .await
            .unwrap();
        assert_eq!(reservation.status, "reserved");

        let released = client.release(&reservation.reservation_id).await.unwrap();
        assert_eq!(released.status, "released");
    }

    #[tokio::test]
    async fn inventory_out_of_stock() {
        let client = HttpInventoryService::new(spawn(mock_services::inventory_router()).await).unwrap();

        let err = client
            .reserve(OrderId::new(), &items("product3", 1))
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.message.starts_with("Insufficient stock for product3"));

        let err = client
            .reserve(OrderId::new(), &items("missing", 1))
            .await
            .unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[tokio::test]
    async fn shipping_create_and_cancel() {
        let client = HttpShippingService::new(spawn(mock_services::shipping_router()).await).unwrap();

        let shipment = client
            .create_shipment(OrderId::new(), &items("product1", 1), &address())
            .await
            .unwrap();
        assert!(shipment.tracking_number.is_some());

        let cancelled = client.cancel_shipment(&shipment.shipment_id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
    }

    #[tokio::test]
    async fn shipping_invalid_postal_code() {
        let client = HttpShippingService::new(spawn(mock_services::shipping_router()).await).unwrap();
        let mut invalid = address();
        invalid.postal_code = "00000".to_string();

        let err = client
            .create_shipment(OrderId::new(), &items("product1", 1), &invalid)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Invalid postal code");
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpPaymentService::with_timeout(
            format!("http://{addr}"),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.refund_payment("pay_1").await.unwrap_err();
        assert_eq!(err.status, crate::error::UNAVAILABLE_STATUS);
        assert!(err.message.starts_with("service unavailable"));
    }

    #[tokio::test]
    async fn plain_text_error_body_is_used_verbatim() {
        use axum::http::StatusCode;
        use axum::routing::post;

        let app = Router::new().route(
            "/payments/{id}/refund",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let client = HttpPaymentService::new(spawn(app).await).unwrap();

        let err = client.refund_payment("pay_1").await.unwrap_err();
        assert_eq!(err.status, 502);
        assert_eq!(err.message, "upstream down");
    }

    #[tokio::test]
    async fn slow_service_is_cut_off_by_timeout() {
        use axum::routing::post;

        let app = Router::new().route(
            "/payments/{id}/refund",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        );
        let client =
            HttpPaymentService::with_timeout(spawn(app).await, Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let err = client.refund_payment("pay_1").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.status, crate::error::UNAVAILABLE_STATUS);
        assert!(err.message.starts_with("service unavailable"));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client =
            ServiceClient::new("payment", "http://localhost:8001/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.url("/payments"), "http://localhost:8001/payments");
    }
}
