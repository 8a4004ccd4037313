//! Round trips against real PostgreSQL and Redis servers.
//!
//! Each test is skipped unless `TEST_POSTGRES_URL` or `TEST_REDIS_URL`
//! points at a disposable server. Every run works inside a fresh schema or
//! namespace and removes it afterwards.

#![allow(clippy::unwrap_used)]

use anyhow::Result;
use exchange_data_adapter::domain::entities::{Account, Balance, Order, ServiceInfo};
use exchange_data_adapter::domain::queries::{AccountQuery, BalanceQuery};
use exchange_data_adapter::domain::value_objects::{
    AccountStatus, AccountType, KycStatus, OrderSide, OrderStatus,
};
use exchange_data_adapter::infrastructure::cache::CacheValue;
use exchange_data_adapter::infrastructure::discovery::ServiceDiscovery;
use exchange_data_adapter::{AdapterConfig, ExchangeDataAdapter};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::time::Duration;

fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

async fn ledger_adapter(url: &str) -> Result<(ExchangeDataAdapter, sqlx::PgPool, String)> {
    let schema = format!("it_{}", unique_suffix());
    let pool = sqlx::PgPool::connect(url).await?;
    let ddl = include_str!("../sql/schema.sql").replace(":schema", &schema);
    sqlx::raw_sql(&ddl).execute(&pool).await?;

    let adapter = ExchangeDataAdapter::new(
        AdapterConfig::new("exchange-simulator")
            .with_namespace(schema.clone(), format!("it:{schema}"))
            .with_postgres_url(url),
    )?;
    adapter.connect().await?;
    Ok((adapter, pool, schema))
}

async fn drop_schema(pool: &sqlx::PgPool, schema: &str) -> Result<()> {
    sqlx::raw_sql(&format!("DROP SCHEMA {schema} CASCADE"))
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postgres_ledger_round_trip() -> Result<()> {
    let Ok(url) = std::env::var("TEST_POSTGRES_URL") else {
        return Ok(());
    };
    let (adapter, pool, schema) = ledger_adapter(&url).await?;
    let accounts = adapter.account_repository().unwrap();
    let orders = adapter.order_repository().unwrap();
    let balances = adapter.balance_repository().unwrap();

    let account = Account::new("acc-1", "user-1", AccountType::Margin)
        .with_metadata(serde_json::json!({"tier": "vip"}));
    accounts.create(&account).await?;
    assert!(accounts.create(&account).await.unwrap_err().is_conflict());
    accounts
        .update_kyc_status("acc-1", KycStatus::Approved)
        .await?;
    accounts
        .update_status("acc-1", AccountStatus::Suspended)
        .await?;
    let stored = accounts.get_by_id("acc-1").await?;
    assert_eq!(stored.kyc_status, KycStatus::Approved);
    assert_eq!(stored.metadata, account.metadata);
    let found = accounts
        .query(&AccountQuery::new().with_status(AccountStatus::Suspended))
        .await?;
    assert_eq!(found.len(), 1);

    let order = Order::limit("ord-1", "acc-1", "BTC-USDT", OrderSide::Buy, dec(2), dec(100));
    orders.create(&order).await?;
    orders.update_status("ord-1", OrderStatus::Open).await?;
    assert!(
        orders
            .update_status("ord-1", OrderStatus::Rejected)
            .await
            .unwrap_err()
            .is_invalid_state()
    );
    orders.update_filled("ord-1", dec(1), dec(100)).await?;
    assert!(
        orders
            .update_filled("ord-1", dec(3), dec(100))
            .await
            .unwrap_err()
            .is_validation()
    );
    assert!(
        orders
            .update_status("ord-1", OrderStatus::Filled)
            .await
            .unwrap_err()
            .is_invalid_state()
    );
    assert_eq!(orders.get_by_id("ord-1").await?.status, OrderStatus::Open);
    orders.cancel("ord-1").await?;
    let cancelled = orders.get_by_id("ord-1").await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert!(orders.cancel("missing").await.unwrap_err().is_not_found());

    // A pending order filled in one go goes straight to FILLED.
    let quick = Order::limit("ord-2", "acc-1", "BTC-USDT", OrderSide::Sell, dec(3), dec(100));
    orders.create(&quick).await?;
    orders.update_filled("ord-2", dec(3), dec(100)).await?;
    let stored = orders.get_by_id("ord-2").await?;
    let next = stored.status_after_fill(stored.filled_quantity);
    assert_eq!(next, OrderStatus::Filled);
    orders.update_status("ord-2", next).await?;
    let filled = orders.get_by_id("ord-2").await?;
    filled.validate()?;
    orders.update_status("ord-2", OrderStatus::Filled).await?;
    assert_eq!(orders.get_by_id("ord-2").await?.updated_at, filled.updated_at);

    balances
        .upsert(&Balance::new("acc-1", "USDT", dec(1_000), dec(0)))
        .await?;
    let deltas = (0..100).map(|n| {
        let balances = balances.clone();
        async move {
            let locked = if n % 2 == 0 { dec(2) } else { dec(-2) };
            balances.apply_delta("acc-1", "USDT", dec(-1), locked).await
        }
    });
    for result in join_all(deltas).await {
        result?;
    }
    let usdt = balances.get_by_account_and_symbol("acc-1", "USDT").await?;
    assert_eq!(usdt.available_balance, dec(900));
    assert_eq!(usdt.locked_balance, dec(0));
    assert_eq!(usdt.total_balance, dec(900));
    assert!(
        balances
            .apply_delta("acc-1", "DOGE", dec(1), dec(0))
            .await
            .unwrap_err()
            .is_not_found()
    );
    let rich = balances
        .query(&BalanceQuery::new().with_min_balance(dec(500)))
        .await?;
    assert_eq!(rich.len(), 1);

    adapter.health_check().await?;
    adapter.disconnect().await?;
    drop_schema(&pool, &schema).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redis_cache_and_registry_round_trip() -> Result<()> {
    let Ok(url) = std::env::var("TEST_REDIS_URL") else {
        return Ok(());
    };
    let instance = format!("exchange-It{}", unique_suffix());
    let adapter = ExchangeDataAdapter::new(
        AdapterConfig::new("exchange-simulator")
            .with_instance_name(instance)
            .with_redis_url(url)
            .with_service_ttl(Duration::from_secs(2)),
    )?;
    adapter.connect().await?;
    let cache = adapter.cache().unwrap();
    let registry = adapter.service_registry().unwrap();

    let raw = vec![0u8, 255, 1, 254];
    cache
        .set("raw", CacheValue::from(raw.clone()), Some(Duration::from_secs(30)))
        .await?;
    assert_eq!(cache.get("raw").await?.as_bytes(), raw.as_slice());
    let ttl = cache.ttl("raw").await?.unwrap();
    assert!(ttl <= Duration::from_secs(30));
    cache.set("quote:BTC", "1".into(), None).await?;
    cache.set("quote:ETH", "2".into(), None).await?;
    let mut keys = cache.keys("quote:*").await?;
    keys.sort();
    assert_eq!(keys, vec!["quote:BTC", "quote:ETH"]);
    assert_eq!(cache.delete_pattern("quote:*").await?, 2);

    let info = ServiceInfo::new("exchange-simulator", "127.0.0.1", 9000, "1.0.0");
    registry.register(&info).await?;
    assert_eq!(registry.discover("exchange-simulator").await?.len(), 1);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(registry.discover("exchange-simulator").await?.is_empty());
    assert!(registry.heartbeat(&info.service_id).await.unwrap_err().is_not_found());

    cache.delete_pattern("*").await?;
    adapter.health_check().await?;
    adapter.disconnect().await?;
    Ok(())
}
