//! Integration tests for the saga coordinator and the checkout saga.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{CustomerId, LineItem, Money, OrderId, ShippingAddress};
use order_store::{
    FailureKind, InMemoryOrderStore, NewOrder, Order, OrderStatus, OrderStore, StepId,
    StepRecord, StepStatus, StepUpdate, StoreError,
};
use saga::error::{Result, ServiceError};
use saga::services::{PaymentResult, RefundResult, ReleaseResult, ReservationResult};
use saga::{
    CheckoutServices, InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService,
    InventoryService, PaymentService, SagaBuilder, SagaContext, SagaError, Step,
    StepTracker, keys, run_checkout,
};

type CallLog = Arc<Mutex<Vec<String>>>;

fn address(postal_code: &str) -> ShippingAddress {
    ShippingAddress {
        street: "123 Main St".to_string(),
        city: "Cityville".to_string(),
        state: "Stateland".to_string(),
        postal_code: postal_code.to_string(),
        country: "Country".to_string(),
    }
}

fn new_order(postal_code: &str) -> NewOrder {
    NewOrder {
        customer_id: CustomerId::new("cust123"),
        items: vec![
            LineItem::new("product1", "Product 1", Money::from_cents(1000), 2),
            LineItem::new("product2", "Product 2", Money::from_cents(1500), 1),
        ],
        shipping_address: address(postal_code),
        payment_method: "credit_card".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Coordinator properties with scripted steps
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Script {
    Succeed,
    FailForward,
    FailCompensation,
}

struct ScriptedStep {
    tracker: StepTracker,
    script: Script,
    log: CallLog,
}

impl ScriptedStep {
    fn new(name: &'static str, store: Arc<dyn OrderStore>, script: Script, log: &CallLog) -> Self {
        Self {
            tracker: StepTracker::new(name, store),
            script,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StepTracker {
        &mut self.tracker
    }

    async fn execute(&self, context: SagaContext) -> Result<SagaContext> {
        self.log
            .lock()
            .unwrap()
            .push(format!("execute:{}", self.name()));

        if self.script == Script::FailForward {
            let error = ServiceError::rejected("scripted", 400, "rejected");
            self.tracker
                .transition(StepUpdate::failed(error.to_string()))
                .await?;
            return Err(SagaError::step_execution(self.name(), error));
        }

        let reference = format!("{}-ref", self.name());
        self.tracker
            .transition(StepUpdate::completed(reference.clone()))
            .await?;
        Ok(context.with(self.name(), reference))
    }

    async fn compensate(&self, context: SagaContext) -> SagaContext {
        if context.get_str(self.name()).is_none() {
            return context;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("compensate:{}", self.name()));

        let update = match self.script {
            Script::FailCompensation => StepUpdate::compensation_failed("undo rejected"),
            _ => StepUpdate::compensated(),
        };
        let _ = self.tracker.transition(update).await;
        context
    }
}

async fn scripted_saga(
    scripts: &[(&'static str, Script)],
) -> (Arc<dyn OrderStore>, saga::SagaCoordinator, CallLog) {
    let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let order = store.create_order(new_order("12345")).await.unwrap();
    let log = CallLog::default();

    let mut builder = SagaBuilder::new(store.clone());
    for (name, script) in scripts {
        builder = builder.step(ScriptedStep::new(*name, store.clone(), *script, &log));
    }
    let saga = builder.build(order.id).await.unwrap();
    (store, saga, log)
}

async fn load(store: &Arc<dyn OrderStore>, order_id: OrderId) -> Order {
    store.get_order(order_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_all_steps_succeed() {
    let (store, saga, log) = scripted_saga(&[
        ("a", Script::Succeed),
        ("b", Script::Succeed),
        ("c", Script::Succeed),
        ("d", Script::Succeed),
    ])
    .await;

    let context = saga.execute(SagaContext::new()).await.unwrap();
    assert_eq!(context.get_str("d"), Some("d-ref"));

    let order = load(&store, saga.order_id()).await;
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(
        order
            .steps
            .iter()
            .map(|s| (s.execution_order, s.status))
            .collect::<Vec<_>>(),
        vec![
            (1, StepStatus::Completed),
            (2, StepStatus::Completed),
            (3, StepStatus::Completed),
            (4, StepStatus::Completed),
        ]
    );
    assert!(!log.lock().unwrap().iter().any(|c| c.starts_with("compensate")));
}

#[tokio::test]
async fn test_failure_short_circuits_and_compensates_in_reverse() {
    let (store, saga, log) = scripted_saga(&[
        ("a", Script::Succeed),
        ("b", Script::Succeed),
        ("c", Script::FailForward),
        ("d", Script::Succeed),
    ])
    .await;

    let err = saga.execute(SagaContext::new()).await.unwrap_err();
    assert!(matches!(err, SagaError::StepExecution { ref step, .. } if step == "c"));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "execute:a",
            "execute:b",
            "execute:c",
            "compensate:b",
            "compensate:a"
        ]
    );

    let order = load(&store, saga.order_id()).await;
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.step("a").unwrap().status, StepStatus::Compensated);
    assert_eq!(order.step("b").unwrap().status, StepStatus::Compensated);
    assert_eq!(order.step("c").unwrap().status, StepStatus::Failed);
    assert_eq!(order.step("d").unwrap().status, StepStatus::Pending);
}

#[tokio::test]
async fn test_compensation_failure_does_not_stop_the_sweep() {
    let (store, saga, log) = scripted_saga(&[
        ("a", Script::Succeed),
        ("b", Script::FailCompensation),
        ("c", Script::FailForward),
    ])
    .await;

    let err = saga.execute(SagaContext::new()).await.unwrap_err();
    assert!(matches!(err, SagaError::StepExecution { ref step, .. } if step == "c"));
    assert!(log.lock().unwrap().contains(&"compensate:a".to_string()));

    let order = load(&store, saga.order_id()).await;
    assert_eq!(order.status, OrderStatus::Failed);

    let b = order.step("b").unwrap();
    assert_eq!(b.status, StepStatus::Failed);
    assert_eq!(b.failure_kind, Some(FailureKind::Compensation));
    assert_eq!(b.error_message.as_deref(), Some("Compensation failed: undo rejected"));

    let c = order.step("c").unwrap();
    assert_eq!(c.failure_kind, Some(FailureKind::Forward));
    assert_eq!(order.step("a").unwrap().status, StepStatus::Compensated);
}

#[tokio::test]
async fn test_first_step_failure_compensates_nothing() {
    let (store, saga, log) =
        scripted_saga(&[("a", Script::FailForward), ("b", Script::Succeed)]).await;

    assert!(saga.execute(SagaContext::new()).await.is_err());
    assert_eq!(*log.lock().unwrap(), vec!["execute:a"]);

    let order = load(&store, saga.order_id()).await;
    assert_eq!(order.step("a").unwrap().status, StepStatus::Failed);
    assert_eq!(order.step("b").unwrap().status, StepStatus::Pending);
}

#[tokio::test]
async fn test_compensating_unreached_step_is_noop() {
    let (store, saga, log) = scripted_saga(&[("a", Script::Succeed), ("b", Script::Succeed)]).await;

    let context = saga.compensate_all(SagaContext::new()).await;
    assert!(context.is_empty());
    assert!(log.lock().unwrap().is_empty());

    let order = load(&store, saga.order_id()).await;
    assert!(order.steps.iter().all(|s| s.status == StepStatus::Pending));
}

// ---------------------------------------------------------------------------
// Checkout scenarios
// ---------------------------------------------------------------------------

/// Decorators that log every compensating call before delegating.
struct LoggedPayment(InMemoryPaymentService, CallLog);
struct LoggedInventory(InMemoryInventoryService, CallLog);

#[async_trait]
impl PaymentService for LoggedPayment {
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        payment_method: &str,
    ) -> std::result::Result<PaymentResult, ServiceError> {
        self.0.process_payment(order_id, amount, payment_method).await
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
    ) -> std::result::Result<RefundResult, ServiceError> {
        self.1.lock().unwrap().push("payment".to_string());
        self.0.refund_payment(payment_id).await
    }
}

#[async_trait]
impl InventoryService for LoggedInventory {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> std::result::Result<ReservationResult, ServiceError> {
        self.0.reserve(order_id, items).await
    }

    async fn release(
        &self,
        reservation_id: &str,
    ) -> std::result::Result<ReleaseResult, ServiceError> {
        self.1.lock().unwrap().push("inventory".to_string());
        self.0.release(reservation_id).await
    }
}

struct CheckoutHarness {
    store: Arc<dyn OrderStore>,
    services: CheckoutServices,
    payment: InMemoryPaymentService,
    inventory: InMemoryInventoryService,
    shipping: InMemoryShippingService,
    compensations: CallLog,
}

impl CheckoutHarness {
    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryOrderStore::new()))
    }

    fn with_store(store: Arc<dyn OrderStore>) -> Self {
        let payment = InMemoryPaymentService::new();
        let inventory = InMemoryInventoryService::new();
        let shipping = InMemoryShippingService::new();
        let compensations = CallLog::default();

        let services = CheckoutServices::new(
            Arc::new(LoggedPayment(payment.clone(), compensations.clone())),
            Arc::new(LoggedInventory(inventory.clone(), compensations.clone())),
            Arc::new(shipping.clone()),
        );

        Self {
            store,
            services,
            payment,
            inventory,
            shipping,
            compensations,
        }
    }

    async fn checkout(&self, order: NewOrder) -> (Order, Result<SagaContext>) {
        let order = self.store.create_order(order).await.unwrap();
        let result = run_checkout(self.store.clone(), &self.services, &order).await;
        let order = load(&self.store, order.id).await;
        (order, result)
    }
}

fn statuses(order: &Order) -> Vec<(&str, u32, StepStatus)> {
    order
        .steps
        .iter()
        .map(|s| (s.step_name.as_str(), s.execution_order, s.status))
        .collect()
}

#[tokio::test]
async fn test_scenario_successful_checkout() {
    let h = CheckoutHarness::new();

    let (order, result) = h.checkout(new_order("12345")).await;
    let context = result.unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.total_amount, Money::from_cents(3500));
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Completed),
            ("inventory", 2, StepStatus::Completed),
            ("shipping", 3, StepStatus::Completed),
        ]
    );

    assert_eq!(order.payment_id.as_deref(), context.get_str(keys::PAYMENT_ID));
    assert!(context.get_str(keys::RESERVATION_ID).is_some());
    assert!(context.get_str(keys::TRACKING_NUMBER).is_some());
    assert!(h.compensations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_payment_rejected() {
    let h = CheckoutHarness::new();
    h.payment.set_charge_limit(Money::from_dollars(1000)).await;

    let mut expensive = new_order("12345");
    expensive.items = vec![LineItem::new(
        "product1",
        "Product 1",
        Money::from_dollars(1500),
        1,
    )];
    let (order, result) = h.checkout(expensive).await;

    let err = result.unwrap_err();
    assert_eq!(
        err.service_error().map(|e| e.message.as_str()),
        Some("Insufficient funds")
    );
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Failed),
            ("inventory", 2, StepStatus::Pending),
            ("shipping", 3, StepStatus::Pending),
        ]
    );
    assert_eq!(h.inventory.reserve_calls().await, 0);
    assert_eq!(h.shipping.create_calls().await, 0);
    assert!(h.compensations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_inventory_rejected_refunds_payment() {
    let h = CheckoutHarness::new();
    h.inventory.set_stock("product1", 100).await;
    h.inventory.set_stock("product2", 0).await;

    let (order, result) = h.checkout(new_order("12345")).await;

    assert!(matches!(
        result,
        Err(SagaError::StepExecution { ref step, .. }) if step == "inventory"
    ));
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Compensated),
            ("inventory", 2, StepStatus::Failed),
            ("shipping", 3, StepStatus::Pending),
        ]
    );

    let payment_id = order.step("payment").unwrap().reference_id.clone().unwrap();
    assert_eq!(h.payment.refund_calls().await, vec![payment_id]);
    assert_eq!(h.payment.active_payment_count().await, 0);
    assert_eq!(h.shipping.create_calls().await, 0);
}

#[tokio::test]
async fn test_scenario_shipping_rejected_compensates_in_reverse() {
    let h = CheckoutHarness::new();

    let (order, result) = h.checkout(new_order("00000")).await;

    let err = result.unwrap_err();
    assert_eq!(
        err.service_error().map(|e| e.message.as_str()),
        Some("Invalid postal code")
    );
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Compensated),
            ("inventory", 2, StepStatus::Compensated),
            ("shipping", 3, StepStatus::Failed),
        ]
    );

    let payment_id = order.step("payment").unwrap().reference_id.clone().unwrap();
    let reservation_id = order
        .step("inventory")
        .unwrap()
        .reference_id
        .clone()
        .unwrap();
    assert_eq!(h.payment.refund_calls().await, vec![payment_id]);
    assert_eq!(h.inventory.release_calls().await, vec![reservation_id]);
    assert_eq!(*h.compensations.lock().unwrap(), vec!["inventory", "payment"]);
    assert_eq!(h.inventory.active_reservation_count().await, 0);
}

#[tokio::test]
async fn test_refund_failure_still_releases_inventory() {
    let h = CheckoutHarness::new();
    h.payment.set_fail_on_refund(true).await;

    let (order, result) = h.checkout(new_order("00000")).await;

    assert!(result.is_err());
    let payment = order.step("payment").unwrap();
    assert_eq!(payment.status, StepStatus::Failed);
    assert_eq!(payment.failure_kind, Some(FailureKind::Compensation));
    assert_eq!(
        order.step("inventory").unwrap().status,
        StepStatus::Compensated
    );
    assert_eq!(*h.compensations.lock().unwrap(), vec!["inventory", "payment"]);
}

// ---------------------------------------------------------------------------
// Order store faults
// ---------------------------------------------------------------------------

/// In-memory store with switchable write failures.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryOrderStore,
    fail_record_payment: AtomicBool,
    fail_completion_of: Mutex<Option<&'static str>>,
    fail_compensated: AtomicBool,
    fail_order_failed: AtomicBool,
}

fn injected(operation: &str) -> StoreError {
    StoreError::InvalidData(format!("disk full during {operation}"))
}

#[async_trait]
impl OrderStore for FaultyStore {
    async fn create_order(&self, order: NewOrder) -> order_store::Result<Order> {
        self.inner.create_order(order).await
    }

    async fn create_step(
        &self,
        order_id: OrderId,
        step_name: &str,
        execution_order: u32,
    ) -> order_store::Result<StepRecord> {
        self.inner
            .create_step(order_id, step_name, execution_order)
            .await
    }

    async fn update_step(
        &self,
        step_id: StepId,
        update: StepUpdate,
    ) -> order_store::Result<StepRecord> {
        if update.status == StepStatus::Compensated && self.fail_compensated.load(Ordering::SeqCst)
        {
            return Err(injected("update_step"));
        }
        let failing_step = *self.fail_completion_of.lock().unwrap();
        if let Some(name) = failing_step {
            let record = self.inner.get_step(step_id).await?;
            if update.status == StepStatus::Completed
                && record.is_some_and(|r| r.step_name == name)
            {
                return Err(injected("update_step"));
            }
        }
        self.inner.update_step(step_id, update).await
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> order_store::Result<()> {
        if status == OrderStatus::Failed && self.fail_order_failed.load(Ordering::SeqCst) {
            return Err(injected("update_order_status"));
        }
        self.inner.update_order_status(order_id, status).await
    }

    async fn record_payment(
        &self,
        order_id: OrderId,
        payment_id: &str,
        transaction_id: &str,
    ) -> order_store::Result<()> {
        if self.fail_record_payment.load(Ordering::SeqCst) {
            return Err(injected("record_payment"));
        }
        self.inner
            .record_payment(order_id, payment_id, transaction_id)
            .await
    }

    async fn get_order(&self, order_id: OrderId) -> order_store::Result<Option<Order>> {
        self.inner.get_order(order_id).await
    }

    async fn get_step(&self, step_id: StepId) -> order_store::Result<Option<StepRecord>> {
        self.inner.get_step(step_id).await
    }

    async fn list_orders(&self) -> order_store::Result<Vec<Order>> {
        self.inner.list_orders().await
    }
}

fn faulty_harness() -> (Arc<FaultyStore>, CheckoutHarness) {
    let store = Arc::new(FaultyStore::default());
    let harness = CheckoutHarness::with_store(store.clone());
    (store, harness)
}

#[tokio::test]
async fn test_payment_info_write_failure_does_not_leak_or_fail_checkout() {
    let (store, h) = faulty_harness();
    store.fail_record_payment.store(true, Ordering::SeqCst);

    let (order, result) = h.checkout(new_order("12345")).await;

    let context = result.unwrap();
    assert!(context.get_str(keys::PAYMENT_ID).is_some());
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_id, None);
    assert_eq!(
        order.step("payment").unwrap().reference_id.as_deref(),
        context.get_str(keys::PAYMENT_ID)
    );
    assert!(h.payment.refund_calls().await.is_empty());
}

#[tokio::test]
async fn test_unrecorded_payment_completion_refunds_the_charge() {
    let (store, h) = faulty_harness();
    *store.fail_completion_of.lock().unwrap() = Some("payment");

    let (order, result) = h.checkout(new_order("12345")).await;

    assert!(matches!(result, Err(SagaError::Store(_))));
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Failed),
            ("inventory", 2, StepStatus::Pending),
            ("shipping", 3, StepStatus::Pending),
        ]
    );
    assert_eq!(
        order.step("payment").unwrap().failure_kind,
        Some(FailureKind::Forward)
    );
    assert_eq!(h.payment.refund_calls().await.len(), 1);
    assert_eq!(h.payment.active_payment_count().await, 0);
    assert_eq!(h.inventory.reserve_calls().await, 0);
}

#[tokio::test]
async fn test_unrecorded_reservation_is_released_and_payment_refunded() {
    let (store, h) = faulty_harness();
    *store.fail_completion_of.lock().unwrap() = Some("inventory");

    let (order, result) = h.checkout(new_order("12345")).await;

    assert!(matches!(result, Err(SagaError::Store(_))));
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Compensated),
            ("inventory", 2, StepStatus::Failed),
            ("shipping", 3, StepStatus::Pending),
        ]
    );
    assert_eq!(h.inventory.release_calls().await.len(), 1);
    assert_eq!(h.inventory.active_reservation_count().await, 0);
    assert_eq!(h.payment.active_payment_count().await, 0);
    assert_eq!(h.shipping.create_calls().await, 0);
}

#[tokio::test]
async fn test_store_faults_during_sweep_do_not_stop_it() {
    let (store, h) = faulty_harness();
    store.fail_compensated.store(true, Ordering::SeqCst);
    store.fail_order_failed.store(true, Ordering::SeqCst);

    let (order, result) = h.checkout(new_order("00000")).await;

    assert!(matches!(
        result,
        Err(SagaError::StepExecution { ref step, .. }) if step == "shipping"
    ));
    assert_eq!(*h.compensations.lock().unwrap(), vec!["inventory", "payment"]);
    assert_eq!(h.inventory.active_reservation_count().await, 0);
    assert_eq!(h.payment.active_payment_count().await, 0);

    // Only the writes that were injected to fail are missing.
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(
        statuses(&order),
        vec![
            ("payment", 1, StepStatus::Completed),
            ("inventory", 2, StepStatus::Completed),
            ("shipping", 3, StepStatus::Failed),
        ]
    );
}
