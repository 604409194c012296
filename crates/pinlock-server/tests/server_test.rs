//! End-to-end tests over real TCP: raw HTTP against a running server, with
//! the crypto client performing the device side of the protocol.

use std::{
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use rand::{RngCore, SeedableRng, rngs::StdRng};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use pinlock_core::{Environment, PinOperation};
use pinlock_crypto::{ClientSession, PinEngine, SigningKey};
use pinlock_proto::{HandshakeReply, PinReply};
use pinlock_server::{Server, ServerRuntimeConfig};

const KEY_SEED: [u8; 32] = [0x4a; 32];
const PIN_ID: [u8; 32] = [0x11; 32];
const PIN_SECRET: [u8; 32] = [0x22; 32];
const ENTROPY: [u8; 32] = [0x33; 32];

#[derive(Clone)]
struct SeededEnv {
    rng: Arc<Mutex<StdRng>>,
}

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))) }
    }
}

impl Environment for SeededEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// Boot a server on an ephemeral port; the key file must outlive the test.
async fn start_server() -> (SocketAddr, tempfile::NamedTempFile) {
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    key_file.write_all(hex::encode(KEY_SEED).as_bytes()).unwrap();

    let config = ServerRuntimeConfig::new("127.0.0.1:0", key_file.path());
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    (addr, key_file)
}

async fn call(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: pinlock\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.unwrap();
    (status, body)
}

fn error_kind(body: &[u8]) -> String {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    value["error"].as_str().unwrap().to_string()
}

async fn handshake(addr: SocketAddr, env: &SeededEnv) -> (ClientSession, HandshakeReply) {
    let (status, body) = call(addr, "POST", "/start_handshake", "").await;
    assert_eq!(status, 200);

    let reply: HandshakeReply = serde_json::from_slice(&body).unwrap();
    let verifying = SigningKey::from_bytes(&KEY_SEED).verifying_key();
    let session = ClientSession::start(env, &verifying, &reply.ske, &reply.sig).unwrap();
    (session, reply)
}

fn pin_body(session: &ClientSession, env: &SeededEnv, op: PinOperation, ske: Option<&str>) -> String {
    let (data, tag) = session.seal_request(env, op, &PIN_ID, &PIN_SECRET, &ENTROPY).unwrap();
    let mut body = serde_json::json!({
        "cke": hex::encode(session.cke()),
        "encrypted_data": hex::encode(&data),
        "hmac_encrypted_data": hex::encode(&tag),
    });
    if let Some(ske) = ske {
        body["ske"] = ske.into();
    }
    body.to_string()
}

#[tokio::test]
async fn liveness_probe_returns_empty_success() {
    let (addr, _key) = start_server().await;
    let (status, body) = call(addr, "GET", "/", "").await;
    assert_eq!(status, 200);
    assert!(body.is_empty());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (addr, _key) = start_server().await;
    let (status, _) = call(addr, "POST", "/unknown", "{}").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn v1_set_pin_then_replay_then_get_pin() {
    let (addr, _key) = start_server().await;
    let env = SeededEnv::new(42);

    // Set the PIN over a fresh handshake.
    let (session, reply) = handshake(addr, &env).await;
    let body = pin_body(&session, &env, PinOperation::SetPin, Some(&reply.ske));

    let (status, response) = call(addr, "POST", "/set_pin", &body).await;
    assert_eq!(status, 200);

    let pin_reply: PinReply = serde_json::from_slice(&response).unwrap();
    let encrypted_key = hex::decode(&pin_reply.encrypted_key).unwrap();
    assert_eq!(encrypted_key.len(), pinlock_core::ENCRYPTED_KEY_LEN);

    let hmac = hex::decode(&pin_reply.hmac).unwrap();
    let set_key = session.open_response(&encrypted_key, &hmac).unwrap();

    // Replaying the identical request must fail: the session is consumed.
    let (status, response) = call(addr, "POST", "/get_pin", &body).await;
    assert_eq!(status, 404);
    assert_eq!(error_kind(&response), "session_not_found");

    // A second handshake retrieves the same key.
    let (session, reply) = handshake(addr, &env).await;
    let body = pin_body(&session, &env, PinOperation::GetKey, Some(&reply.ske));

    let (status, response) = call(addr, "POST", "/get_pin", &body).await;
    assert_eq!(status, 200);

    let pin_reply: PinReply = serde_json::from_slice(&response).unwrap();
    let got_key = session
        .open_response(
            &hex::decode(&pin_reply.encrypted_key).unwrap(),
            &hex::decode(&pin_reply.hmac).unwrap(),
        )
        .unwrap();
    assert_eq!(set_key, got_key);
}

#[tokio::test]
async fn v2_flow_needs_no_handshake() {
    let (addr, _key) = start_server().await;
    let env = SeededEnv::new(7);

    // The exchange public key is provisioned out-of-band; derive it from
    // the same seed the server loaded.
    let engine = PinEngine::new(env.clone(), SigningKey::from_bytes(&KEY_SEED)).unwrap();
    let exchange = engine.exchange_public();

    let set_counter = [0u8, 0, 0, 0, 0, 0, 0, 1];
    let session = ClientSession::stateless(&env, &exchange, set_counter).unwrap();
    let (data, tag) =
        session.seal_request(&env, PinOperation::SetPin, &PIN_ID, &PIN_SECRET, &ENTROPY).unwrap();
    let body = serde_json::json!({
        "cke": hex::encode(session.cke()),
        "encrypted_data": hex::encode(&data),
        "hmac_encrypted_data": hex::encode(&tag),
        "replay_counter": hex::encode(set_counter),
    });

    let (status, response) = call(addr, "POST", "/set_pin", &body.to_string()).await;
    assert_eq!(status, 200);

    let pin_reply: PinReply = serde_json::from_slice(&response).unwrap();
    let set_key = session
        .open_response(
            &hex::decode(&pin_reply.encrypted_key).unwrap(),
            &hex::decode(&pin_reply.hmac).unwrap(),
        )
        .unwrap();

    // Retrieve with a fresh counter.
    let get_counter = [0u8, 0, 0, 0, 0, 0, 0, 2];
    let session = ClientSession::stateless(&env, &exchange, get_counter).unwrap();
    let (data, tag) =
        session.seal_request(&env, PinOperation::GetKey, &PIN_ID, &PIN_SECRET, &ENTROPY).unwrap();
    let body = serde_json::json!({
        "cke": hex::encode(session.cke()),
        "encrypted_data": hex::encode(&data),
        "hmac_encrypted_data": hex::encode(&tag),
        "replay_counter": hex::encode(get_counter),
    });

    let (status, response) = call(addr, "POST", "/get_pin", &body.to_string()).await;
    assert_eq!(status, 200);

    let pin_reply: PinReply = serde_json::from_slice(&response).unwrap();
    let got_key = session
        .open_response(
            &hex::decode(&pin_reply.encrypted_key).unwrap(),
            &hex::decode(&pin_reply.hmac).unwrap(),
        )
        .unwrap();
    assert_eq!(set_key, got_key);
}

#[tokio::test]
async fn mixed_discriminants_are_rejected() {
    let (addr, _key) = start_server().await;
    let env = SeededEnv::new(9);

    let (session, reply) = handshake(addr, &env).await;
    let mut body: serde_json::Value =
        serde_json::from_str(&pin_body(&session, &env, PinOperation::GetKey, Some(&reply.ske)))
            .unwrap();
    body["replay_counter"] = hex::encode([0u8; 8]).into();

    let (status, response) = call(addr, "POST", "/get_pin", &body.to_string()).await;
    assert_eq!(status, 400);
    assert_eq!(error_kind(&response), "protocol_violation");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (addr, _key) = start_server().await;
    let (status, response) = call(addr, "POST", "/get_pin", "{ not json").await;
    assert_eq!(status, 400);
    assert_eq!(error_kind(&response), "malformed_request");
}

#[tokio::test]
async fn wrong_pin_is_engine_failure() {
    let (addr, _key) = start_server().await;
    let env = SeededEnv::new(11);

    // Set a PIN first.
    let (session, reply) = handshake(addr, &env).await;
    let body = pin_body(&session, &env, PinOperation::SetPin, Some(&reply.ske));
    let (status, _) = call(addr, "POST", "/set_pin", &body).await;
    assert_eq!(status, 200);

    // Attempt retrieval with a different secret.
    let (session, reply) = handshake(addr, &env).await;
    let (data, tag) = session
        .seal_request(&env, PinOperation::GetKey, &PIN_ID, &[0xEE; 32], &ENTROPY)
        .unwrap();
    let body = serde_json::json!({
        "ske": reply.ske,
        "cke": hex::encode(session.cke()),
        "encrypted_data": hex::encode(&data),
        "hmac_encrypted_data": hex::encode(&tag),
    });

    let (status, response) = call(addr, "POST", "/get_pin", &body.to_string()).await;
    assert_eq!(status, 500);
    assert_eq!(error_kind(&response), "crypto_engine_failure");
}

#[tokio::test]
async fn missing_key_file_refuses_startup() {
    let config = ServerRuntimeConfig::new("127.0.0.1:0", "/nonexistent/pinlock.key");
    assert!(Server::bind(config).await.is_err());
}
