//! An order-fulfillment saga: reserve inventory, charge payment, then
//! arrange shipping only for physical orders. If payment fails after
//! inventory was reserved, the reservation compensation runs
//! automatically.

use sagaflow::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Order {
    id: String,
    digital: bool,
    inventory_reserved: bool,
    paid: bool,
    shipment_scheduled: bool,
}

impl FlowState for Order {
    fn flow_id(&self) -> &str {
        &self.id
    }
}

fn build_flow(payments: Arc<Mutex<PaymentGateway>>) -> Flow<Order> {
    FlowBuilder::<Order>::new("order-fulfillment")
        .step("reserve-inventory", |order: &mut Order, _cancel| {
            Box::pin(async move {
                order.inventory_reserved = true;
                println!("reserved inventory for {}", order.id);
                Ok(true)
            })
        })
        .with_compensation(|order: &mut Order, _cancel| {
            Box::pin(async move {
                order.inventory_reserved = false;
                println!("released inventory for {}", order.id);
                Ok(())
            })
        })
        .step("charge-payment", move |order: &mut Order, _cancel| {
            let payments = payments.clone();
            Box::pin(async move {
                payments.lock().unwrap().charge(&order.id)?;
                order.paid = true;
                println!("charged payment for {}", order.id);
                Ok(true)
            })
        })
        .with_compensation(|order: &mut Order, _cancel| {
            Box::pin(async move {
                order.paid = false;
                println!("refunded payment for {}", order.id);
                Ok(())
            })
        })
        .if_(|order: &Order| !order.digital)
        .step("schedule-shipping", |order: &mut Order, _cancel| {
            Box::pin(async move {
                order.shipment_scheduled = true;
                println!("scheduled shipping for {}", order.id);
                Ok(true)
            })
        })
        .with_compensation(|order: &mut Order, _cancel| {
            Box::pin(async move {
                order.shipment_scheduled = false;
                println!("cancelled shipment for {}", order.id);
                Ok(())
            })
        })
        .end_if()
        .build()
        .expect("flow is statically valid")
}

/// Stands in for a real payment processor: fails for a specific order id
/// to demonstrate compensation.
struct PaymentGateway {
    fail_for: Option<String>,
}

impl PaymentGateway {
    fn charge(&mut self, order_id: &str) -> anyhow::Result<()> {
        if self.fail_for.as_deref() == Some(order_id) {
            anyhow::bail!("card declined for order {order_id}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let executor = Executor::<Order>::new(None);

    // Happy path: digital order, no shipping step entered.
    let gateway = Arc::new(Mutex::new(PaymentGateway { fail_for: None }));
    let flow = build_flow(gateway);
    let order = Order {
        id: "order-1".into(),
        digital: true,
        inventory_reserved: false,
        paid: false,
        shipment_scheduled: false,
    };
    let result = executor.execute(&flow, order, CancellationToken::new()).await;
    println!("order-1 succeeded: {}", result.is_success);
    assert!(result.is_success);
    assert!(result.state.paid);
    assert!(!result.state.shipment_scheduled);

    // Failure path: physical order whose payment is declined after
    // inventory was reserved. Both compensations should run.
    let gateway = Arc::new(Mutex::new(PaymentGateway { fail_for: Some("order-2".into()) }));
    let flow = build_flow(gateway);
    let order = Order {
        id: "order-2".into(),
        digital: false,
        inventory_reserved: false,
        paid: false,
        shipment_scheduled: false,
    };
    let result = executor.execute(&flow, order, CancellationToken::new()).await;
    println!("order-2 succeeded: {}", result.is_success);
    assert!(!result.is_success);
    assert!(!result.state.inventory_reserved);
    assert!(!result.state.paid);
}
