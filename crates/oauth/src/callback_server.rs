use std::{io, net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{RawQuery, State},
        http::{Method, StatusCode},
        response::{Html, IntoResponse, Response},
    },
    tokio::{
        net::TcpListener,
        sync::{Mutex, oneshot},
    },
    tracing::{debug, info, warn},
};

use crate::error::OAuthError;

const SUCCESS_PAGE: &str = "<html><head><title>OAuth Success</title></head>\
<body><h1>Authorization Successful!</h1>\
<p>You can now close this window and return to the terminal.</p>\
</body></html>";

const FAILURE_PAGE: &str = "<html><head><title>OAuth Error</title></head>\
<body><h1>Authorization Failed</h1>\
<p>No authorization code received.</p>\
</body></html>";

/// What the first callback request carried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallbackOutcome {
    Code(String),
    Rejected,
}

type OutcomeSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

/// Single-request HTTP listener that captures the authorization code from the
/// provider's redirect.
///
/// The listener is owned by this value and released when `wait_for_code`
/// returns or its future is dropped.
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    /// Bind the listener. Done before the browser is opened so the redirect
    /// can never race the bind.
    pub async fn bind(addr: SocketAddr) -> Result<Self, OAuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| OAuthError::PortInUse { addr, source })?;
        debug!(%addr, "OAuth callback listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, OAuthError> {
        self.listener
            .local_addr()
            .map_err(OAuthError::CallbackServer)
    }

    /// Serve until the first GET request has been answered and return the
    /// `code` it carried.
    ///
    /// Blocks indefinitely if no request ever arrives.
    pub async fn wait_for_code(self) -> Result<String, OAuthError> {
        let (tx, rx) = oneshot::channel();
        let (done_tx, mut done_rx) = oneshot::channel();
        let slot: OutcomeSlot = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new().fallback(handle_callback).with_state(slot);

        info!("waiting for OAuth callback");
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                if let Ok(outcome) = rx.await {
                    let _ = done_tx.send(outcome);
                }
            })
            .await
            .map_err(OAuthError::CallbackServer)?;

        match done_rx.try_recv() {
            Ok(CallbackOutcome::Code(code)) => Ok(code),
            Ok(CallbackOutcome::Rejected) => Err(OAuthError::AuthorizationRejected),
            Err(_) => Err(OAuthError::CallbackServer(io::Error::other(
                "callback server stopped before a request arrived",
            ))),
        }
    }
}

async fn handle_callback(
    State(slot): State<OutcomeSlot>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let outcome = match authorization_code(query.as_deref()) {
        Some(code) => CallbackOutcome::Code(code),
        None => CallbackOutcome::Rejected,
    };
    let response = match outcome {
        CallbackOutcome::Code(_) => (StatusCode::OK, Html(SUCCESS_PAGE)).into_response(),
        CallbackOutcome::Rejected => (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE)).into_response(),
    };

    match slot.lock().await.take() {
        Some(sender) => {
            if outcome == CallbackOutcome::Rejected {
                warn!("OAuth callback arrived without an authorization code");
            }
            let _ = sender.send(outcome);
        },
        None => debug!("ignoring callback request after the first"),
    }

    response
}

/// First non-empty `code` value in the query string.
fn authorization_code(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}
