use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::domain::DispatchEvent;
use courier_core::ports::EventSink;
use courier_core::{
    Batch, BoxError, Context, DispatchError, Envelope, Handler, Message, MessageKey, Registry,
    RegistryBuilder, Reply, RpcBinder, batch, handler_fn,
};
use serde::{Deserialize, Serialize};

mod orders {
    use super::*;

    #[derive(Debug, Default)]
    pub struct Place {
        pub sku: String,
        pub result: Option<u64>,
    }
    impl Message for Place {}
}

mod invoices {
    use super::*;

    #[derive(Debug, Default)]
    pub struct Place {
        pub amount: u64,
        pub result: Option<u64>,
    }
    impl Message for Place {}
}

struct OrderHandler {
    next_id: Mutex<u64>,
}

#[async_trait]
impl Handler<orders::Place> for OrderHandler {
    async fn handle(&self, ctx: &Context, order: &mut orders::Place) -> Result<(), BoxError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if order.sku.is_empty() {
            return Err("empty sku".into());
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        order.result = Some(*next);
        Ok(())
    }
}

#[tokio::test]
async fn same_local_name_in_different_modules_routes_separately() {
    let registry = Registry::new();
    registry.register(OrderHandler { next_id: Mutex::new(0) });
    registry.register(handler_fn(|_ctx, invoice: &mut invoices::Place| {
        invoice.result = Some(invoice.amount * 2);
        Ok(())
    }));

    let order_key = MessageKey::of::<orders::Place>().unwrap();
    let invoice_key = MessageKey::of::<invoices::Place>().unwrap();
    assert_ne!(order_key, invoice_key);
    assert_eq!(order_key.local_name(), invoice_key.local_name());

    let mut order = orders::Place { sku: "A-1".into(), ..Default::default() };
    let mut invoice = invoices::Place { amount: 21, ..Default::default() };
    registry
        .dispatch(&Context::background(), batch![&mut order, &mut invoice])
        .await
        .unwrap();

    assert_eq!(order.result, Some(1));
    assert_eq!(invoice.result, Some(42));
}

#[tokio::test]
async fn handler_sees_the_callers_context() {
    let registry = Registry::new();
    registry.register(OrderHandler { next_id: Mutex::new(0) });
    let (ctx, cancel) = Context::with_cancel(&Context::background());
    cancel.cancel();

    let mut order = orders::Place { sku: "A-1".into(), ..Default::default() };
    let err = registry.send(&ctx, &mut order).await.unwrap_err();

    assert_eq!(err.to_string(), "context canceled");
    assert_eq!(order.result, None);
}

#[tokio::test]
async fn batch_built_incrementally_matches_macro() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    let log = Arc::clone(&seen);
    registry.register(handler_fn(move |_ctx, order: &mut orders::Place| {
        log.lock().unwrap().push(order.sku.clone());
        Ok(())
    }));

    let mut first = orders::Place { sku: "1".into(), ..Default::default() };
    let mut inner = Batch::new();
    inner.push_owned(orders::Place { sku: "2".into(), ..Default::default() });
    inner.push_owned(orders::Place { sku: "3".into(), ..Default::default() });
    let messages: Batch<'_> = [Envelope::from(&mut first), Envelope::from(inner)]
        .into_iter()
        .collect();

    registry.dispatch(&Context::background(), messages).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn unbound_message_reports_its_key() {
    let registry = Registry::new();
    let mut invoice = invoices::Place::default();

    let err = registry
        .send(&Context::background(), &mut invoice)
        .await
        .unwrap_err();

    match err {
        DispatchError::HandlerNotFound(key) => {
            assert_eq!(key, MessageKey::of::<invoices::Place>().unwrap());
            assert_eq!(key.local_name(), "Place");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<DispatchEvent>>,
}

struct SharedRecorder(Arc<Recorder>);

impl EventSink for SharedRecorder {
    fn emit(&self, event: &DispatchEvent) {
        self.0.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn builder_wires_event_sink_and_validates() {
    let recorder = Arc::new(Recorder::default());
    let registry = RegistryBuilder::new()
        .register(OrderHandler { next_id: Mutex::new(0) })
        .expect::<orders::Place>()
        .event_sink(SharedRecorder(Arc::clone(&recorder)))
        .build()
        .unwrap();

    let _ = registry
        .send(&Context::background(), &mut invoices::Place::default())
        .await;

    let events = recorder.events.lock().unwrap();
    assert!(matches!(events[0], DispatchEvent::Registered { .. }));
    assert_eq!(
        events[1],
        DispatchEvent::Dispatching {
            key: MessageKey::of::<invoices::Place>().unwrap()
        }
    );

    let missing = RegistryBuilder::new().expect::<invoices::Place>().build();
    assert!(missing.is_err());
}

#[derive(Debug, Default, Deserialize)]
struct Echo {
    text: String,
    #[serde(skip)]
    result: EchoReply,
}
impl Message for Echo {}

#[derive(Debug, Default, Serialize, PartialEq)]
struct EchoReply {
    text: String,
    length: usize,
}

impl Reply for Echo {
    type Output = EchoReply;

    fn reply(&self) -> &EchoReply {
        &self.result
    }
}

#[tokio::test]
async fn default_registry_backs_free_functions_and_default_binder() {
    courier_core::register(handler_fn(|_ctx, echo: &mut Echo| {
        echo.result = EchoReply {
            text: echo.text.to_uppercase(),
            length: echo.text.len(),
        };
        Ok(())
    }));

    let mut echo = Echo { text: "hi".into(), ..Default::default() };
    courier_core::send(&Context::background(), &mut echo).await.unwrap();
    assert_eq!(echo.result.text, "HI");

    let mut binder = RpcBinder::default();
    binder.bind::<Echo>("/echo");
    let body = binder
        .call(&Context::background(), "/echo", br#"{"text":"abc"}"#)
        .await
        .unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply, serde_json::json!({ "text": "ABC", "length": 3 }));

    assert!(courier_core::default_registry().contains::<Echo>());
}
