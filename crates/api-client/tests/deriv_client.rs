//! Drives `DerivClient` against an in-process stand-in for the Deriv API.

use api_client::{ApiError, DerivClient, MarketProvider, TradingProvider};
use configuration::DerivConfig;
use core_types::Position;
use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type RequestLog = Arc<Mutex<Vec<Value>>>;

/// Accepts one connection and answers it with scripted replies, recording
/// every request it receives.
async fn spawn_fake_deriv() -> (DerivConfig, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else { continue };
            let request: Value = serde_json::from_str(&text).unwrap();
            log.lock().unwrap().push(request.clone());
            for reply in replies_to(&request) {
                if ws.send(Message::Text(reply.to_string())).await.is_err() {
                    return;
                }
            }
        }
    });

    let config = DerivConfig {
        app_id: 1089,
        endpoint: format!("ws://{addr}"),
        origin: "https://example.test".to_string(),
    };
    (config, requests)
}

fn replies_to(request: &Value) -> Vec<Value> {
    let req_id = request["req_id"].clone();

    if let Some(token) = request.get("authorize").and_then(Value::as_str) {
        return if token == "good-token" {
            vec![json!({
                "msg_type": "authorize", "req_id": req_id,
                "authorize": {"loginid": "CR900", "currency": "USD"}
            })]
        } else {
            vec![json!({
                "msg_type": "authorize", "req_id": req_id,
                "error": {"code": "InvalidToken", "message": "The token is invalid."}
            })]
        };
    }

    if let Some(symbol) = request.get("ticks").and_then(Value::as_str) {
        if symbol == "UNKNOWN" {
            return vec![json!({
                "msg_type": "tick", "req_id": req_id,
                "error": {"code": "InvalidSymbol", "message": "Symbol UNKNOWN is invalid."}
            })];
        }
        return [100.0, 100.5, 101.2]
            .iter()
            .enumerate()
            .map(|(i, quote)| {
                json!({
                    "msg_type": "tick", "req_id": req_id,
                    "subscription": {"id": "sub-1"},
                    "tick": {
                        "symbol": symbol,
                        "epoch": 1_700_000_000 + i as i64,
                        "quote": quote, "ask": quote + 0.1, "bid": quote - 0.1
                    }
                })
            })
            .collect();
    }

    if request.get("buy").is_some() {
        return vec![json!({
            "msg_type": "buy", "req_id": req_id,
            "buy": {"contract_id": 4242, "buy_price": 10, "transaction_id": 1}
        })];
    }

    if request.get("sell").is_some() {
        return vec![json!({
            "msg_type": "sell", "req_id": req_id,
            "sell": {"sold_for": 10.5, "transaction_id": 2}
        })];
    }

    Vec::new()
}

fn position() -> Position {
    Position {
        symbol: "R_100".to_string(),
        amount: dec!(10),
        leverage: 100,
        price: dec!(100),
        currency: "USD".to_string(),
    }
}

#[tokio::test]
async fn authorize_returns_the_account() {
    let (config, _) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();

    let account = client.authorize("good-token").await.unwrap();
    assert_eq!(account.id, "CR900");
    assert_eq!(account.currency, "USD");

    client.close().await;
}

#[tokio::test]
async fn rejected_token_surfaces_the_api_error() {
    let (config, _) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();

    let err = client.authorize("stolen-token").await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ref code, .. } if code == "InvalidToken"));

    client.close().await;
}

#[tokio::test]
async fn tick_subscription_streams_ticks_in_order_until_close() {
    let (config, requests) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();

    let stream = client.subscribe_to_ticks("R_100").await.unwrap();
    assert_eq!(stream.symbol(), "R_100");
    let mut ticks = stream.subscribe();

    for expected in [dec!(100), dec!(100.5), dec!(101.2)] {
        assert_eq!(ticks.recv().await.unwrap().quote, expected);
    }

    client.close().await;
    assert_eq!(ticks.recv().await, None);
    assert!(stream.is_closed());

    let sent = requests.lock().unwrap();
    assert_eq!(sent[0]["ticks"], "R_100");
    assert_eq!(sent[0]["subscribe"], 1);
    assert!(sent[0]["req_id"].is_u64());
}

#[tokio::test]
async fn failed_subscription_is_an_error() {
    let (config, _) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();

    let err = client.subscribe_to_ticks("UNKNOWN").await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { ref code, .. } if code == "InvalidSymbol"));

    client.close().await;
}

#[tokio::test]
async fn buy_sell_and_close_send_multiplier_contracts() {
    let (config, requests) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();

    let contract_id = client.buy(&position()).await.unwrap();
    assert_eq!(contract_id.get(), 4242);
    client.sell(&position()).await.unwrap();
    client.close_position(contract_id).await.unwrap();

    {
        let sent = requests.lock().unwrap();
        let buy = &sent[0];
        assert_eq!(buy["buy"], "1");
        assert_eq!(buy["parameters"]["contract_type"], "MULTUP");
        assert_eq!(buy["parameters"]["multiplier"], 100);
        assert_eq!(buy["parameters"]["amount"], json!(10.0));
        assert_eq!(buy["parameters"]["currency"], "USD");
        assert_eq!(sent[1]["parameters"]["contract_type"], "MULTDOWN");
        assert_eq!(sent[2]["sell"], 4242);
    }

    client.close().await;
}

#[tokio::test]
async fn requests_after_close_report_disconnected() {
    let (config, _) = spawn_fake_deriv().await;
    let client = DerivClient::connect(&config).await.unwrap();
    client.close().await;

    let err = client.authorize("good-token").await.unwrap_err();
    assert!(matches!(err, ApiError::Disconnected));
}
