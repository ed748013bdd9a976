//! courier demo
//!
//! Registry の基本的な使い方を順に実行します。
//! 1. Handler 登録（RegistryBuilder + 起動時検証）
//! 2. 単発 send と結果の書き戻し
//! 3. ネストした batch の dispatch と fail-fast
//! 4. 遅延 dispatch とキャンセル
//! 5. RpcBinder 経由の JSON 呼び出し

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::Layer;

use cli::{Cli, LogFormat};
use courier_core::{
    BoxError, Context, DispatchError, Envelope, Handler, Message, Registry, RegistryBuilder, Reply,
    RpcBinder, batch, handler_fn,
};

#[derive(Debug, Default, Deserialize)]
struct Greet {
    name: String,
    #[serde(skip)]
    result: Greeting,
}
impl Message for Greet {}

#[derive(Debug, Default, Serialize)]
struct Greeting {
    text: String,
}

impl Reply for Greet {
    type Output = Greeting;

    fn reply(&self) -> &Greeting {
        &self.result
    }
}

#[derive(Debug)]
struct Charge {
    amount: u32,
}
impl Message for Charge {}

/// 残高を持つ Handler。内部状態は自前で守る。
struct ChargeHandler {
    balance: AtomicU32,
}

#[async_trait]
impl Handler<Charge> for ChargeHandler {
    async fn handle(&self, _ctx: &Context, charge: &mut Charge) -> Result<(), BoxError> {
        let amount = charge.amount;
        let before = self
            .balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| balance.checked_sub(amount))
            .map_err(|balance| format!("insufficient balance: have {balance}, need {amount}"))?;
        info!(amount, left = before - amount, "charged");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "courier demo starting");

    let result = run(&cli).await;
    if let Err(ref e) = result {
        tracing::error!(error = %e, "demo failed");
    }
    result
}

async fn run(cli: &Cli) -> Result<()> {
    // (A) Handler を登録して起動時に検証
    let registry = RegistryBuilder::new()
        .register(handler_fn(|_ctx, greet: &mut Greet| {
            greet.result.text = format!("hello, {}", greet.name);
            Ok(())
        }))
        .register(ChargeHandler {
            balance: AtomicU32::new(100),
        })
        .expect::<Greet>()
        .expect::<Charge>()
        .build()
        .context("build registry")?;
    info!(keys = ?registry.registered_keys(), "registry ready");

    let ctx = Context::background();

    // (B) 単発 send: Handler の書き込みが呼び出し元に見える
    let mut greet = Greet {
        name: "courier".into(),
        ..Default::default()
    };
    registry.send(&ctx, &mut greet).await?;
    info!(text = %greet.result.text, "greeted");

    // (C) batch: 3 件目で残高不足になり、4 件目は実行されない
    let (mut c1, mut c2, mut c3, mut c4) = (
        Charge { amount: 30 },
        Charge { amount: 30 },
        Charge { amount: 50 },
        Charge { amount: 10 },
    );
    match registry
        .dispatch(&ctx, batch![&mut c1, batch![&mut c2, &mut c3], &mut c4])
        .await
    {
        Ok(()) => info!("batch completed"),
        Err(e) => warn!(error = %e, "batch stopped"),
    }

    // (D) 遅延 dispatch とキャンセル
    deferred(&registry, Duration::from_millis(cli.delay_ms)).await?;

    // (E) RpcBinder 経由で JSON を往復
    let mut binder = RpcBinder::new(registry.clone());
    binder.bind::<Greet>("/greet");
    let response = binder
        .serve(&ctx, "/greet", br#"{"name":"rpc"}"#)
        .await;
    info!(
        status = response.status,
        body = %String::from_utf8_lossy(&response.body),
        "rpc call"
    );
    let response = binder.serve(&ctx, "/missing", b"{}").await;
    info!(status = response.status, "rpc call to unbound path");

    Ok(())
}

async fn deferred(registry: &Registry, delay: Duration) -> Result<()> {
    let ctx = Context::background();

    let (tx, rx) = oneshot::channel();
    registry.dispatch_after(
        &ctx,
        delay,
        Some(Box::new(move |result: Result<(), DispatchError>| {
            let _ = tx.send(result);
        })),
        Envelope::owned(Charge { amount: 5 }),
    );
    info!(delay_ms = delay.as_millis() as u64, "scheduled charge");
    let outcome = rx.await.context("deferred callback dropped")?;
    info!(ok = outcome.is_ok(), "deferred charge finished");

    let (canceled, cancel) = Context::with_cancel(&ctx);
    let (tx, rx) = oneshot::channel();
    registry.dispatch_after(
        &canceled,
        delay,
        Some(Box::new(move |result: Result<(), DispatchError>| {
            let _ = tx.send(result);
        })),
        Envelope::owned(Charge { amount: 5 }),
    );
    cancel.cancel();
    match rx.await.context("deferred callback dropped")? {
        Err(e) => info!(error = %e, "canceled charge never ran"),
        Ok(()) => warn!("canceled charge ran anyway"),
    }
    Ok(())
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        let default_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = match cli.log_format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}
