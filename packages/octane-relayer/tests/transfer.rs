//! End-to-end tests driving the HTTP router against an in-memory ledger.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use ed25519_dalek::{SigningKey, VerifyingKey};
use octane_relayer::blockhash::BlockhashInfo;
use octane_relayer::config::TokenFee;
use octane_relayer::rpc::{LedgerClient, LedgerError};
use octane_relayer::token;
use octane_relayer::transaction::{
    decode_transaction, Hash, Instruction, Message, Pubkey, Signature, Transaction,
};
use octane_relayer::{create_router, AppState, Config, FeePayerSigner};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const FEE: u64 = 100;

/// Token ledger that applies SPL transfers to balances.
struct FakeLedger {
    blockhash: Hash,
    balances: Mutex<HashMap<Pubkey, u64>>,
    sends: AtomicU32,
    stalled: AtomicBool,
}

impl FakeLedger {
    fn new() -> Self {
        Self {
            blockhash: Hash(rand::random()),
            balances: Mutex::new(HashMap::new()),
            sends: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    fn fund(&self, account: Pubkey, amount: u64) {
        *self.balances.lock().unwrap().entry(account).or_default() += amount;
    }

    fn balance(&self, account: &Pubkey) -> u64 {
        self.balances
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, LedgerError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(BlockhashInfo {
            blockhash: self.blockhash,
            last_valid_block_height: 1_000,
        })
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let rejected = |message: &str| LedgerError::Rejected {
            code: -32002,
            message: message.into(),
        };

        let tx = decode_transaction(wire).map_err(|e| rejected(&e.to_string()))?;
        for (signer, signature) in tx.signer_pairs() {
            let key = VerifyingKey::from_bytes(&signer.0).map_err(|_| rejected("bad signer"))?;
            key.verify_strict(
                tx.message_bytes(),
                &ed25519_dalek::Signature::from_bytes(&signature.0),
            )
            .map_err(|_| rejected("signature verification failed"))?;
        }

        let mut balances = self.balances.lock().unwrap();
        let mut next = balances.clone();
        for ix in &tx.message.instructions {
            if let Some(transfer) = token::parse_transfer(&tx.message, ix) {
                let source = next.entry(*transfer.source).or_default();
                if *source < transfer.amount {
                    return Err(rejected("insufficient funds"));
                }
                *source -= transfer.amount;
                *next.entry(*transfer.destination).or_default() += transfer.amount;
            }
        }
        *balances = next;
        Ok(tx.id())
    }
}

struct Relay {
    app: Router,
    ledger: Arc<FakeLedger>,
    fee_payer: Pubkey,
    fee: TokenFee,
}

fn random_pubkey() -> Pubkey {
    Pubkey(rand::random())
}

fn pubkey_of(key: &SigningKey) -> Pubkey {
    Pubkey(key.verifying_key().to_bytes())
}

fn relay() -> Relay {
    relay_with(|_| {})
}

fn relay_with(configure: impl FnOnce(&mut Config)) -> Relay {
    let relay_key = SigningKey::generate(&mut OsRng);
    let fee = TokenFee {
        mint: random_pubkey(),
        account: random_pubkey(),
        decimals: 6,
        fee: FEE,
    };

    let mut config = Config::default();
    config.rpc_url = "http://127.0.0.1:8899".into();
    config.endpoints.transfer.tokens = vec![fee.clone()];
    configure(&mut config);
    config.validate().unwrap();

    let ledger = Arc::new(FakeLedger::new());
    let state = AppState::with_ledger(
        config,
        FeePayerSigner::Local { key: relay_key },
        ledger.clone(),
    );
    let fee_payer = *state.pipeline.fee_payer();
    Relay {
        app: create_router(Arc::new(state)),
        ledger,
        fee_payer,
        fee,
    }
}

/// A token owner with a funded source account.
struct Client {
    owner: SigningKey,
    source: Pubkey,
}

fn client(relay: &Relay, balance: u64) -> Client {
    let client = Client {
        owner: SigningKey::generate(&mut OsRng),
        source: random_pubkey(),
    };
    relay.ledger.fund(client.source, balance);
    client
}

impl Client {
    fn pay(&self, destination: Pubkey, amount: u64) -> Instruction {
        token::transfer(self.source, destination, pubkey_of(&self.owner), amount)
    }

    /// Signed as owner, base58 encoded, fee payer slot left empty.
    fn sign(&self, relay: &Relay, instructions: &[Instruction], blockhash: Hash) -> String {
        let message = Message::new(&relay.fee_payer, instructions, blockhash).unwrap();
        let mut tx = Transaction::new_unsigned(message);
        tx.partial_sign(&self.owner).unwrap();
        bs58::encode(tx.to_bytes()).into_string()
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_transfer(app: &Router, transaction: &str) -> (StatusCode, Value) {
    let body = json!({ "transaction": transaction }).to_string();
    let request = Request::post("/transfer")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

async fn fetch_blockhash(app: &Router) -> Hash {
    let (status, body) = get(app, "/blockhash").await;
    assert_eq!(status, StatusCode::OK);
    body["blockhash"]["blockhash"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

fn assert_error(body: &Value, needle: &str) {
    assert_eq!(body["status"], "error", "{body}");
    let message = body["message"].as_str().unwrap_or_default();
    assert!(message.contains(needle), "{message:?} lacks {needle:?}");
}

#[tokio::test]
async fn test_end_to_end_transfer() {
    let relay = relay();
    let alice = client(&relay, 1_000);

    let (status, config) = get(&relay.app, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["feePayer"], relay.fee_payer.to_string());
    assert_eq!(
        config["endpoints"]["transfer"]["tokens"][0]["account"],
        relay.fee.account.to_string()
    );
    assert_eq!(config["endpoints"]["transfer"]["tokens"][0]["fee"], FEE);
    assert!(config.get("secretKey").is_none());

    let blockhash = fetch_blockhash(&relay.app).await;
    let tx = alice.sign(&relay, &[alice.pay(relay.fee.account, 100)], blockhash);

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let signature: Signature = body["signature"].as_str().unwrap().parse().unwrap();
    assert!(!signature.is_zero());

    assert_eq!(relay.ledger.balance(&relay.fee.account), 100);
    assert_eq!(relay.ledger.balance(&alice.source), 900);
    assert_eq!(relay.ledger.sends(), 1);
}

#[tokio::test]
async fn test_missing_fee_is_rejected_before_signing() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    let blockhash = fetch_blockhash(&relay.app).await;
    let tx = alice.sign(&relay, &[alice.pay(random_pubkey(), 100)], blockhash);

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "missing fee transfer");
    assert_eq!(relay.ledger.sends(), 0);
}

#[tokio::test]
async fn test_unknown_blockhash_is_expired() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    fetch_blockhash(&relay.app).await;

    let stale = Hash([7; 32]);
    let paid = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE)], stale);
    let (status, body) = post_transfer(&relay.app, &paid).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "blockhash expired");

    let unpaid = alice.sign(&relay, &[alice.pay(random_pubkey(), 1)], stale);
    let (status, body) = post_transfer(&relay.app, &unpaid).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "blockhash expired");
    assert_eq!(relay.ledger.sends(), 0);
}

#[tokio::test]
async fn test_duplicate_submission_is_refused() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    let blockhash = fetch_blockhash(&relay.app).await;
    let tx = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE)], blockhash);

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body["signature"].as_str().unwrap().is_empty());

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "duplicate");
    assert_eq!(relay.ledger.sends(), 1);
    assert_eq!(relay.ledger.balance(&relay.fee.account), FEE);
}

#[tokio::test]
async fn test_exact_minimum_fee() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    let blockhash = fetch_blockhash(&relay.app).await;

    let short = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE - 1)], blockhash);
    let (status, body) = post_transfer(&relay.app, &short).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "below the required 100");

    let exact = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE)], blockhash);
    let (status, body) = post_transfer(&relay.app, &exact).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn test_two_payments_are_ambiguous() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    let blockhash = fetch_blockhash(&relay.app).await;
    let tx = alice.sign(
        &relay,
        &[
            alice.pay(relay.fee.account, FEE),
            alice.pay(relay.fee.account, FEE),
        ],
        blockhash,
    );

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "expected exactly one");
    assert_eq!(relay.ledger.sends(), 0);
}

#[tokio::test]
async fn test_concurrent_distinct_transfers() {
    let relay = relay();
    let alice = client(&relay, 1_000);
    let bob = client(&relay, 1_000);
    let blockhash = fetch_blockhash(&relay.app).await;
    let a = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE)], blockhash);
    let b = bob.sign(&relay, &[bob.pay(relay.fee.account, FEE)], blockhash);

    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(
        post_transfer(&relay.app, &a),
        post_transfer(&relay.app, &b)
    );
    assert_eq!(status_a, StatusCode::OK, "{body_a}");
    assert_eq!(status_b, StatusCode::OK, "{body_b}");
    assert_ne!(body_a["signature"], body_b["signature"]);
    assert_eq!(relay.ledger.balance(&relay.fee.account), 2 * FEE);
}

#[tokio::test]
async fn test_rejected_submission_can_be_retried() {
    let relay = relay();
    let alice = client(&relay, 0);
    let blockhash = fetch_blockhash(&relay.app).await;
    let tx = alice.sign(&relay, &[alice.pay(relay.fee.account, FEE)], blockhash);

    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "insufficient funds");

    relay.ledger.fund(alice.source, FEE);
    let (status, body) = post_transfer(&relay.app, &tx).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(relay.ledger.sends(), 2);
}

#[tokio::test]
async fn test_malformed_requests() {
    let relay = relay();

    let (status, body) = post_transfer(&relay.app, "not-base58-0OIl").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "base58");

    let (status, body) = post_transfer(&relay.app, &bs58::encode([1u8, 2, 3]).into_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "malformed transaction");

    let request = Request::post("/transfer")
        .header("content-type", "application/json")
        .body(Body::from("{\"tx\": 1}"))
        .unwrap();
    let (status, body) = send(&relay.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "invalid request body");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let relay = relay();
    fetch_blockhash(&relay.app).await;

    let (status, health) = get(&relay.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cached_blockhashes"], 1);
    assert_eq!(health["blockhash_validity_secs"], 60);

    let response = relay
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&text).contains("relayer_transfer_total"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let relay = relay();
    let response = relay
        .app
        .clone()
        .oneshot(
            Request::get("/config")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

fn from_peer(uri: &str, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    Request::get(uri)
        .extension(ConnectInfo(addr))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_rate_limit_per_client_ip() {
    let relay = relay_with(|config| config.rate_limit.requests_per_minute = 1);

    let (status, _) = send(&relay.app, from_peer("/config", "10.0.0.1:4000")).await;
    assert_eq!(status, StatusCode::OK);

    // Same address from another port shares the budget.
    let (status, body) = send(&relay.app, from_peer("/config", "10.0.0.1:4001")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_error(&body, "too many requests");

    let (status, _) = send(&relay.app, from_peer("/config", "10.0.0.2:4000")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_slow_request_times_out() {
    let relay = relay_with(|config| config.request_timeout_secs = 1);
    relay.ledger.stalled.store(true, Ordering::SeqCst);

    let (status, _) = get(&relay.app, "/blockhash").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}
