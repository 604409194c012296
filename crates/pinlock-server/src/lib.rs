//! Pinlock production server.
//!
//! Wires the sans-IO dispatch core to real resources:
//!
//! ```text
//! pinlock-server
//!   ├─ SystemEnv        (system clock + getrandom)
//!   ├─ PinEngine        (X25519/Ed25519/AES-GCM crypto engine)
//!   ├─ Dispatcher       (session table + v1/v2 routing, from pinlock-core)
//!   ├─ MemoryPinStore   (PIN records with attempt lockout)
//!   └─ HTTP adapter     (tokio TCP, minimal HTTP/1.1)
//! ```
//!
//! Endpoints: `GET /` (liveness), `POST /start_handshake`, `POST /get_pin`,
//! `POST /set_pin`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod http;
mod store;
mod system_env;

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
};

pub use error::ServerError;
use pinlock_core::{
    DEFAULT_SESSION_LIFETIME_SECS, DispatchError, Dispatcher, Environment, PinOperation,
};
use pinlock_crypto::PinEngine;
pub use store::{MAX_ATTEMPTS, MemoryPinStore};
pub use system_env::SystemEnv;

type AppDispatcher = Dispatcher<PinEngine<SystemEnv>>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g. "127.0.0.1:8096").
    pub bind_address: String,
    /// Path to the static signing key (32-byte hex seed).
    pub key_path: PathBuf,
    /// Handshake session lifetime.
    pub session_lifetime: Duration,
}

impl ServerRuntimeConfig {
    /// Config with the default session lifetime.
    pub fn new(bind_address: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            bind_address: bind_address.into(),
            key_path: key_path.into(),
            session_lifetime: Duration::from_secs(DEFAULT_SESSION_LIFETIME_SECS),
        }
    }
}

/// Production pinlock server.
pub struct Server {
    dispatcher: Arc<AppDispatcher>,
    store: Arc<MemoryPinStore<SystemEnv>>,
    env: SystemEnv,
    listener: TcpListener,
}

impl Server {
    /// Load the static key, build the engine, and bind the listener.
    ///
    /// # Errors
    ///
    /// [`ServerError::StaticKey`] if the signing key is missing or invalid —
    /// the process must refuse to serve without it. [`ServerError::Transport`]
    /// if binding fails.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();

        // Load, verify, and cache the static key up front; startup fails
        // hard if it is unusable.
        let signing = pinlock_crypto::load_signing_key(&config.key_path)?;
        let engine = PinEngine::new(env.clone(), signing)?;

        let dispatcher = Arc::new(Dispatcher::new(engine, config.session_lifetime));
        let store = Arc::new(MemoryPinStore::new(env.clone()));
        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { dispatcher, store, env, listener })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::from)
    }

    /// Accept connections and serve requests until shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("pinlock server listening on {}", self.listener.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let store = Arc::clone(&self.store);
                    let env = self.env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher, store, env).await {
                            tracing::debug!("connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                },
            }
        }
    }
}

/// Serve requests on one connection until the client hangs up.
async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<AppDispatcher>,
    store: Arc<MemoryPinStore<SystemEnv>>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(request) = http::read_request(&mut reader).await? {
        let (status, body) = route(&dispatcher, &store, &env, &request);
        http::write_response(&mut write_half, status, &body).await?;
    }

    Ok(())
}

fn route(
    dispatcher: &AppDispatcher,
    store: &MemoryPinStore<SystemEnv>,
    env: &SystemEnv,
    request: &http::Request,
) -> (u16, Vec<u8>) {
    match (request.method.as_str(), request.path.as_str()) {
        // Liveness probe.
        ("GET", "/") => (200, Vec::new()),

        ("POST", "/start_handshake") => reply(dispatcher.start_handshake(env.now())),

        ("POST", "/get_pin") => {
            reply(dispatcher.complete_call(PinOperation::GetKey, &request.body, store, env.now()))
        },

        ("POST", "/set_pin") => {
            reply(dispatcher.complete_call(PinOperation::SetPin, &request.body, store, env.now()))
        },

        ("GET" | "POST", _) => (404, error_body("not_found")),
        _ => (405, error_body("method_not_allowed")),
    }
}

fn reply<T: serde::Serialize>(result: Result<T, DispatchError>) -> (u16, Vec<u8>) {
    match result {
        Ok(payload) => match serde_json::to_vec(&payload) {
            Ok(body) => (200, body),
            Err(e) => {
                tracing::error!("reply serialization failed: {}", e);
                (500, error_body("internal_error"))
            },
        },
        Err(err) => {
            let status = match err {
                DispatchError::MalformedRequest(_)
                | DispatchError::ProtocolViolation(_)
                | DispatchError::IntegrityError => 400,
                DispatchError::SessionNotFound => 404,
                DispatchError::CryptoEngineFailure(_) => 500,
            };
            if status == 500 {
                tracing::error!(kind = err.kind(), "request failed: {}", err);
            } else {
                tracing::warn!(kind = err.kind(), "request rejected: {}", err);
            }
            (status, error_body(err.kind()))
        },
    }
}

/// Error bodies expose only the documented error kind, never internals.
fn error_body(kind: &str) -> Vec<u8> {
    format!("{{\"error\":\"{kind}\"}}").into_bytes()
}
