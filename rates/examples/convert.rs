//! End-to-end wiring: durable store, HTTP source, engine, propagation.
//!
//! Run against an endpoint implementing the batch convert API:
//! `cargo run --example convert -- https://api.example.com/convert`

use std::sync::Arc;

use cambio_common::Currency;
use cambio_rates::{ConvertApiSource, LastRefreshed, RateEngine, RateEngineConfig};
use cambio_store::RateStore;
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cambio_rates=debug".into()),
        )
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/api/convert".to_string());

    let store = RateStore::open("cambio.db").await?;
    let marker = Arc::new(LastRefreshed::new());
    let engine = RateEngine::new(
        Arc::new(ConvertApiSource::new(endpoint)),
        store,
        RateEngineConfig::default(),
    )
    .with_listener(marker.clone());

    let currencies = vec![Currency::usd(), Currency::gbp(), Currency::chf()];
    let mut conversions = engine.get_conversions(&currencies, false).await?;

    for conversion in &conversions {
        println!("{}: rate {:?}", conversion.currency, conversion.rate);
    }

    // Simulate the user typing 100 into the USD field.
    let outcome =
        engine.propagate_amounts(&Currency::usd(), Some(Decimal::from(100)), &mut conversions);
    println!("propagation outcome: {outcome:?}");
    for conversion in &conversions {
        println!("{}: amount {:?}", conversion.currency, conversion.amount);
    }

    if let Some(at) = marker.get() {
        println!("last refreshed: {at}");
    }

    Ok(())
}
