//! Websocket relay between a browser client and the realtime backend.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{self, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::Instrument;
use url::Url;

use super::ProxyError;
use crate::config::{ConfigError, ProxyRule};

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client headers never copied upstream; the upstream handshake sets its own.
fn is_hop_header(name: &HeaderName) -> bool {
    [
        header::HOST,
        header::CONNECTION,
        header::UPGRADE,
        header::SEC_WEBSOCKET_KEY,
        header::SEC_WEBSOCKET_VERSION,
        header::SEC_WEBSOCKET_EXTENSIONS,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::ORIGIN,
    ]
    .contains(name)
}

/// Resolved forwarding target of one proxy rule.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    url: Url,
    origin: String,
    rewrite_origin: bool,
}

impl ProxyTarget {
    pub fn new(rule: &ProxyRule) -> Result<Self, ConfigError> {
        rule.validate()?;
        let url = rule.target_url()?;
        // Origin is advertised with the scheme the rule was written with
        let origin = Url::parse(&rule.target)
            .map(|u| u.origin().ascii_serialization())
            .map_err(|e| ConfigError::InvalidProxyRule {
                prefix: rule.prefix.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            url,
            origin,
            rewrite_origin: rule.rewrite_ws_origin,
        })
    }

    /// Origin sent upstream when rewriting is enabled.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Target URL joined with the client's path and query.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", base, uri.path()));
        url.set_query(uri.query());
        url
    }

    fn upstream_request(
        &self,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<tungstenite::handshake::client::Request, ProxyError> {
        let mut request = url.as_str().into_client_request()?;
        let upstream_headers = request.headers_mut();

        for (name, value) in headers {
            if !is_hop_header(name) {
                upstream_headers.append(name.clone(), value.clone());
            }
        }

        // Only present origins are rewritten; a client without one stays without one
        if let Some(origin) = headers.get(header::ORIGIN) {
            let origin = if self.rewrite_origin {
                HeaderValue::from_str(&self.origin)?
            } else {
                origin.clone()
            };
            upstream_headers.insert(header::ORIGIN, origin);
        }

        Ok(request)
    }
}

/// Upgrade handler. The upstream socket is opened before the client upgrade;
/// an unreachable backend answers `502 Bad Gateway`.
pub async fn proxy_websocket(
    State(target): State<Arc<ProxyTarget>>,
    ws: WebSocketUpgrade,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let upstream_url = target.upstream_url(&uri);

    let request = match target.upstream_request(&upstream_url, &headers) {
        Ok(request) => request,
        Err(e) => {
            log::error!("Failed to build upstream request for {}: {}", upstream_url, e);
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let (upstream, response) = match tokio_tungstenite::connect_async(request).await {
        Ok(connected) => connected,
        Err(e) => {
            log::warn!("Realtime backend {} unreachable: {}", upstream_url, e);
            return (
                StatusCode::BAD_GATEWAY,
                format!("Realtime backend unreachable: {}", e),
            )
                .into_response();
        }
    };

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let ws = match protocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    log::debug!("Relaying {} -> {}", uri, upstream_url);
    let span = tracing::info_span!("relay", upstream = %upstream_url);
    ws.on_upgrade(move |client| {
        async move {
            match relay(client, upstream).await {
                Ok(()) => log::debug!("Relay closed"),
                Err(e) => log::debug!("Relay ended: {}", e),
            }
        }
        .instrument(span)
    })
}

/// Pump frames both ways until either side finishes. Ping/Pong are answered
/// per hop and not forwarded.
async fn relay(client: WebSocket, upstream: Upstream) -> Result<(), ProxyError> {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(message) = client_rx.next().await {
            let Some(message) = to_upstream(message?) else {
                continue;
            };
            let closing = matches!(message, tungstenite::Message::Close(_));
            upstream_tx.send(message).await?;
            if closing {
                break;
            }
        }
        Ok::<(), ProxyError>(())
    };

    let upstream_to_client = async {
        while let Some(message) = upstream_rx.next().await {
            let Some(message) = to_client(message?) else {
                continue;
            };
            let closing = matches!(message, ws::Message::Close(_));
            client_tx.send(message).await?;
            if closing {
                break;
            }
        }
        Ok::<(), ProxyError>(())
    };

    tokio::select! {
        result = client_to_upstream => result,
        result = upstream_to_client => result,
    }
}

fn to_upstream(message: ws::Message) -> Option<tungstenite::Message> {
    match message {
        ws::Message::Text(text) => Some(tungstenite::Message::Text(text)),
        ws::Message::Binary(data) => Some(tungstenite::Message::Binary(data)),
        ws::Message::Close(frame) => Some(tungstenite::Message::Close(frame.map(|f| {
            CloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason,
            }
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(message: tungstenite::Message) -> Option<ws::Message> {
    match message {
        tungstenite::Message::Text(text) => Some(ws::Message::Text(text)),
        tungstenite::Message::Binary(data) => Some(ws::Message::Binary(data)),
        tungstenite::Message::Close(frame) => Some(ws::Message::Close(frame.map(|f| {
            ws::CloseFrame {
                code: u16::from(f.code),
                reason: f.reason,
            }
        }))),
        tungstenite::Message::Ping(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => None,
    }
}
