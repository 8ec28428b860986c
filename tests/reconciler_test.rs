mod common;

use cartflow::application::reconciler::{CONFIRMATION_TEMPLATE, GENERIC_CONFIRMATION_TEMPLATE};
use cartflow::domain::cart::{Cart, CartStatus};
use cartflow::domain::gateway::TransactionDetail;
use cartflow::domain::item::ItemFields;
use cartflow::domain::money::Money;
use cartflow::domain::reference::DomainRef;
use cartflow::domain::session::FormArgs;
use cartflow::domain::view::View;
use cartflow::error::CartError;
use common::{Harness, RecordingOrder, config, ctx, harness, stored_cart};
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Checks out one mug with the sandbox gateway and returns the stored cart.
async fn checked_out(h: &Harness, session: &str) -> Cart {
    let s = ctx(session);
    h.app.carts.set_item(&s, ItemFields::for_product("mug", 1)).await.unwrap();
    let cart = h.app.carts.get_or_create_cart(&s).await.unwrap();
    h.app
        .carts
        .checkout(&s, Some("sandbox".into()), FormArgs::new())
        .await
        .unwrap();
    stored_cart(h, &cart).await
}

async fn notify(h: &Harness, cart: &Cart, status: &str, fee: Option<Money>) -> String {
    let checkout_code = cart.checkout_code.as_deref().expect("cart should be checked out");
    let code = h
        .sandbox
        .publish_for_checkout(checkout_code, status, fee)
        .await
        .expect("checkout should exist");
    h.app.reconciler.notification("sandbox", &code).await
}

#[tokio::test]
async fn test_confirmed_notification_is_idempotent() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;
    assert_eq!(cart.checkout_code.as_deref(), Some("CHK-1"));

    let code = h.sandbox.publish_for_checkout("CHK-1", "3", None).await.unwrap();
    let first = h.app.reconciler.notification("sandbox", &code).await;
    let second = h.app.reconciler.notification("sandbox", &code).await;
    assert_eq!(first, second);
    assert!(first.contains("is confirmed (transaction TX-1)"));

    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.status, CartStatus::Confirmed);
    assert_eq!(cart.transaction_code.as_deref(), Some("TX-1"));
    assert_eq!(cart.payments.len(), 1);
    let payment = &cart.payments[0];
    assert_eq!(payment.uid, "TX-1");
    assert_eq!(payment.payment_system, "sandbox");
    assert_eq!(payment.status, "3");
    assert_eq!(payment.value, Some(Money::new(dec!(10))));
    assert!(payment.confirmed_at.is_some());
}

#[tokio::test]
async fn test_fee_is_recorded_as_tax() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "3", Some(Money::new(dec!(0.40)))).await;

    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.tax, Money::new(dec!(0.40)));
    assert_eq!(cart.payments[0].extra_value, Some(Money::new(dec!(0.40))));
}

#[tokio::test]
async fn test_fee_below_a_cent_is_not_rounded() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "3", Some(Money::new(dec!(0.125)))).await;

    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.tax, Money::new(dec!(0.125)));
}

#[tokio::test]
async fn test_status_progression_records_each_payment_state() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "2", None).await;
    assert_eq!(stored_cart(&h, &cart).await.status, CartStatus::Analysing);
    notify(&h, &cart, "3", None).await;
    notify(&h, &cart, "4", None).await;
    notify(&h, &cart, "6", None).await;

    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.status, CartStatus::Refunded);
    let statuses: Vec<_> = cart.payments.iter().map(|p| p.status.as_str()).collect();
    assert_eq!(statuses, vec!["2", "3", "4", "6"]);
}

#[tokio::test]
async fn test_cancelled_cart_does_not_regress() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "7", None).await;
    assert_eq!(stored_cart(&h, &cart).await.status, CartStatus::Cancelled);

    notify(&h, &cart, "3", None).await;
    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.status, CartStatus::Cancelled);
    assert!(cart.log.iter().any(|l| l.contains("ignored gateway status confirmed")));
    assert_eq!(cart.payments.len(), 2);
}

#[tokio::test]
async fn test_terminal_regression_can_be_allowed() {
    let mut config = config();
    config.allow_terminal_regression = true;
    let h = harness(config).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "7", None).await;
    notify(&h, &cart, "3", None).await;

    assert_eq!(stored_cart(&h, &cart).await.status, CartStatus::Confirmed);
}

#[tokio::test]
async fn test_unmapped_status_leaves_cart_status() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    notify(&h, &cart, "99", None).await;

    let cart = stored_cart(&h, &cart).await;
    assert_eq!(cart.status, CartStatus::CheckedOut);
    assert_eq!(cart.transaction_code.as_deref(), Some("TX-1"));
    assert!(cart.log.iter().any(|l| l.contains("left the status unchanged")));
}

#[tokio::test]
async fn test_unknown_notification_changes_nothing() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;

    let diagnostic = h.app.reconciler.notification("sandbox", "NOTIF-404").await;
    assert!(diagnostic.contains("not applied"));
    let diagnostic = h.app.reconciler.notification("ghost", "NOTIF-1").await;
    assert!(diagnostic.contains("not applied"));

    let after = stored_cart(&h, &cart).await;
    assert_eq!(after.status, CartStatus::CheckedOut);
    assert!(after.payments.is_empty());
    assert_eq!(after.transaction_code, None);
}

#[tokio::test]
async fn test_confirmation_renders_page_with_status() {
    let h = harness(config()).await;
    let cart = checked_out(&h, "s1").await;
    h.sandbox.publish_for_checkout("CHK-1", "3", None).await.unwrap();

    let view = h.app.reconciler.confirmation("sandbox", Some("TX-1")).await;
    let View::Render { template, context } = view else {
        panic!("expected the confirmation page");
    };
    assert_eq!(template, CONFIRMATION_TEMPLATE);
    assert_eq!(context["status"], "confirmed");
    assert_eq!(context["transaction_code"], "TX-1");
    assert_eq!(stored_cart(&h, &cart).await.status, CartStatus::Confirmed);
}

#[tokio::test]
async fn test_confirmation_without_usable_code_is_generic() {
    let h = harness(config()).await;
    checked_out(&h, "s1").await;

    let view = h.app.reconciler.confirmation("sandbox", None).await;
    assert_eq!(view.template(), Some(GENERIC_CONFIRMATION_TEMPLATE));
    let view = h.app.reconciler.confirmation("sandbox", Some("  ")).await;
    assert_eq!(view.template(), Some(GENERIC_CONFIRMATION_TEMPLATE));
    let view = h.app.reconciler.confirmation("sandbox", Some("TX-404")).await;
    assert_eq!(view.template(), Some(GENERIC_CONFIRMATION_TEMPLATE));
}

#[tokio::test]
async fn test_reference_hooks_receive_status_and_response() {
    let h = harness(config()).await;
    let order = Arc::new(RecordingOrder::new("order-7"));
    h.catalog.insert(DomainRef::new("order", "7"), order.clone()).await;

    let s = ctx("s1");
    let mut cart = h.app.carts.get_or_create_cart(&s).await.unwrap();
    cart.reference = Some(DomainRef::new("order", "7"));
    cart.reference_code = None;
    h.app.carts.carts().store(cart.clone()).await.unwrap();
    let cart = checked_out(&h, "s1").await;
    assert_eq!(cart.reference_code.as_deref(), Some("order-7"));
    assert_eq!(h.sandbox.checkouts().await[0].request.reference, "SHOP-order-7");

    let diagnostic = notify(&h, &cart, "3", None).await;
    assert!(diagnostic.contains("is confirmed"));

    assert_eq!(order.last_status(), Some(CartStatus::Confirmed));
    let responses = order.responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0["code"], "TX-1");
    assert_eq!(responses[0].1, "sandbox");
}

#[tokio::test]
async fn test_apply_requires_a_known_reference() {
    let h = harness(config()).await;
    checked_out(&h, "s1").await;
    let processors = h.app.carts.processors();
    let record = processors.find_by_identifier("sandbox").await.unwrap().unwrap();
    let instance = processors.instance(&record, None, FormArgs::new()).unwrap();

    let mut detail = TransactionDetail {
        code: "TX-9".into(),
        reference: None,
        status: "3".into(),
        payment_method: None,
        gross_amount: None,
        fee_amount: None,
        date: None,
    };
    let result = h.app.reconciler.apply(instance.as_ref(), &detail).await;
    assert!(matches!(result, Err(CartError::ReconciliationError(_))));

    detail.reference = Some("SHOP-nothing-here".into());
    let result = h.app.reconciler.apply(instance.as_ref(), &detail).await;
    assert!(matches!(result, Err(CartError::ReconciliationError(_))));
}
