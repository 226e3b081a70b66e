//! The wired runtime end to end: SQLite-backed store, paper tools and the
//! scheduler, with a scripted decision provider in place of the CLI.
//!
//! Run with:
//! ```bash
//! cargo test -p tradeloop --test runtime_wiring
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tradeloop::agents::test_support::{trading_config, ScriptedDecisions};
use tradeloop::build_runtime_with;
use tradeloop::compaction::compact_call_records;
use tradeloop::gateway::CallContext;
use tradeloop::models::catalog::GET_PORTFOLIO_POSITIONS;
use tradeloop::models::{
    AgentSpec, CycleOutcome, Decision, Quote, StoreConfig, TradeAction, TradeloopConfig,
    ValidationOutcome,
};
use tradeloop::store::QuoteTable;

fn buy_four() -> ScriptedDecisions {
    ScriptedDecisions::always(Decision::trade(
        TradeAction::Buy,
        "AAPL",
        dec!(4),
        None,
        "momentum",
    ))
}

fn config_with_store(store: StoreConfig) -> TradeloopConfig {
    TradeloopConfig {
        store,
        agents: vec![AgentSpec {
            id: "alpha".to_string(),
            name: "Alpha".to_string(),
            autostart: true,
            config: trading_config(&["AAPL"], dec!(0.05), 60_000),
        }],
        ..TradeloopConfig::default()
    }
}

#[test]
fn shipped_config_parses() {
    let config: TradeloopConfig =
        toml::from_str(include_str!("../../../config/tradeloop.toml")).unwrap();
    assert_eq!(config.agents.len(), 2);
    assert!(config.agents[0].autostart);
    assert!(!config.agents[1].autostart);
    assert_eq!(config.paper.starting_cash, dec!(100000));
    assert_eq!(config.agents[1].config.permissions.audit.retention_days, 7);
}

#[tokio::test]
async fn approved_decision_fills_on_paper_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("tradeloop.db");
    let db_path = db_path.to_str().unwrap().to_string();

    // The quotes pipeline writes into the same database file.
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    QuoteTable::open_writable(&db_path)
        .unwrap()
        .upsert(
            "AAPL",
            &Quote {
                price: dec!(187.25),
                volume: None,
                as_of: Utc::now(),
            },
            Duration::from_secs(600),
        )
        .unwrap();

    let config = config_with_store(StoreConfig {
        sqlite_path: Some(db_path),
        ..StoreConfig::default()
    });
    let runtime = build_runtime_with(config, Arc::new(buy_four())).unwrap();
    assert_eq!(runtime.register_agents().await.unwrap(), vec!["alpha".to_string()]);
    assert_eq!(runtime.retention_days(), Some(30));
    runtime.scheduler.start("alpha").await.unwrap();

    let record = runtime.scheduler.run_cycle("alpha").await.unwrap();
    assert_eq!(record.outcome, CycleOutcome::Executed);

    let portfolio = runtime.broker.snapshot("alpha");
    assert_eq!(portfolio.cash, dec!(99251));
    assert_eq!(portfolio.positions["AAPL"].quantity, dec!(4));
    assert_eq!(portfolio.positions["AAPL"].avg_price, dec!(187.25));

    let sqlite = runtime.sqlite.clone().unwrap();
    assert_eq!(sqlite.count_call_records().unwrap(), 1);
    let cycles = sqlite.cycle_records_for_agent("alpha", 10).unwrap();
    assert_eq!(cycles, vec![record]);

    // Positions reach the agent through the gateway as well.
    let positions = runtime
        .gateway
        .execute("alpha", GET_PORTFOLIO_POSITIONS, json!({}), CallContext::default())
        .await
        .unwrap();
    let cash: Decimal = positions.result["cash"].as_str().unwrap().parse().unwrap();
    assert_eq!(cash, dec!(99251));
    assert_eq!(positions.result["positions"][0]["symbol"], "AAPL");

    // Nothing is old enough today; everything is a month from now.
    assert_eq!(compact_call_records(&sqlite, 30, Utc::now()).unwrap(), 0);
    let later = Utc::now() + chrono::Duration::days(31);
    assert_eq!(compact_call_records(&sqlite, 30, later).unwrap(), 2);
    assert_eq!(sqlite.count_call_records().unwrap(), 0);

    runtime.scheduler.shutdown().await;
}

#[tokio::test]
async fn memory_only_runtime_without_quotes_rejects_trades() {
    let config = config_with_store(StoreConfig {
        sqlite_path: None,
        ..StoreConfig::default()
    });
    let runtime = build_runtime_with(config, Arc::new(buy_four())).unwrap();
    assert!(runtime.sqlite.is_none());
    runtime.register_agents().await.unwrap();
    runtime.scheduler.start("alpha").await.unwrap();

    let record = runtime.scheduler.run_cycle("alpha").await.unwrap();
    assert_eq!(record.outcome, CycleOutcome::Rejected);
    assert_eq!(
        record.validation,
        ValidationOutcome::Rejected {
            reasons: vec!["no price available for AAPL".to_string()]
        }
    );
    assert_eq!(runtime.broker.snapshot("alpha").cash, dec!(100000));
}

#[tokio::test]
async fn duplicate_agent_ids_fail_registration() {
    let mut config = config_with_store(StoreConfig {
        sqlite_path: None,
        ..StoreConfig::default()
    });
    config.agents.push(config.agents[0].clone());
    let runtime = build_runtime_with(config, Arc::new(buy_four())).unwrap();

    let err = runtime.register_agents().await.unwrap_err();
    assert!(err.to_string().contains("alpha"));
}
