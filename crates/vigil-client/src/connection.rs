//! Self-healing gateway connection.
//!
//! [`GatewayClient::run`] dials the server, re-issues `join:group` for every
//! subscribed group, folds incoming events into the shared [`ClientStore`],
//! and redials with backoff whenever the socket drops. Re-joining after
//! each connect is what makes reconnection transparent: the server keeps no
//! memory of a dropped session's rooms.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_types::events::{ClientCommand, ServerEvent};

use crate::error::ClientError;
use crate::backoff::{Backoff, ReconnectConfig};
use crate::store::ClientStore;

pub type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct GatewayClient {
    url: String,
    token: Option<String>,
    store: Arc<Mutex<ClientStore>>,
    reconnect: ReconnectConfig,
    commands_tx: mpsc::UnboundedSender<ClientCommand>,
    commands_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientCommand>>,
}

/// Why a live session ended.
enum SessionEnd {
    Cancelled,
    Dropped,
}

impl GatewayClient {
    /// `url` is the full socket URL, e.g. `ws://host:3000/socket`. Without a
    /// token the session is anonymous and only sees groups it joins.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            token,
            store: Arc::new(Mutex::new(ClientStore::new())),
            reconnect: ReconnectConfig::default(),
            commands_tx,
            commands_rx: tokio::sync::Mutex::new(commands_rx),
        }
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Shared handle to the store this client keeps up to date.
    pub fn store(&self) -> Arc<Mutex<ClientStore>> {
        self.store.clone()
    }

    fn lock_store(&self) -> MutexGuard<'_, ClientStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to a group. Takes effect on the live socket if there is one
    /// and on every later reconnect.
    pub fn join_group(&self, group_id: i64) {
        if self.lock_store().subscribe(group_id) {
            let _ = self.commands_tx.send(ClientCommand::JoinGroup { group_id });
        }
    }

    pub fn leave_group(&self, group_id: i64) {
        if self.lock_store().unsubscribe(group_id) {
            let _ = self.commands_tx.send(ClientCommand::LeaveGroup { group_id });
        }
    }

    /// Open one WebSocket to the gateway, presenting the bearer token.
    pub async fn connect(&self) -> Result<GatewayStream, ClientError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Config(format!("invalid token: {e}")))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request).await?;
        info!("Connected to gateway at {}", self.url);
        Ok(stream)
    }

    /// Run until `cancel` fires. A failed dial and a dropped session both
    /// wait out the backoff before the next dial; a successful dial resets it.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut commands = self.commands_rx.lock().await;
        let mut backoff = Backoff::new(self.reconnect.clone());

        loop {
            let dialed = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                dialed = self.connect() => dialed,
            };

            match dialed {
                Ok(stream) => {
                    if backoff.failures() > 0 {
                        info!(failures = backoff.failures(), "Reconnected to gateway");
                    }
                    backoff.reset();
                    match self.drive(stream, &mut commands, &cancel).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Dropped => warn!("Gateway connection lost, reconnecting"),
                    }
                }
                Err(e) => warn!(error = %e, failures = backoff.failures() + 1, "Gateway dial failed"),
            }

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before redial");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Gateway client stopped");
    }

    async fn drive(
        &self,
        stream: GatewayStream,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        // Queued commands are covered by the full re-join below.
        while commands.try_recv().is_ok() {}
        let groups = self.lock_store().subscriptions();
        for group_id in groups {
            if send_command(&mut sink, ClientCommand::JoinGroup { group_id }).await.is_err() {
                return SessionEnd::Dropped;
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                command = commands.recv() => {
                    let Some(command) = command else { return SessionEnd::Cancelled };
                    if send_command(&mut sink, command).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Gateway read error: {}", e);
                            return SessionEnd::Dropped;
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(event) => {
                debug!("Gateway event {}", event.name());
                self.lock_store().apply(&event);
            }
            Err(e) => warn!("Ignoring undecodable gateway frame: {}", e),
        }
    }
}

async fn send_command<S>(sink: &mut S, command: ClientCommand) -> Result<(), ClientError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(&command)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

pub fn parse_frame(text: &str) -> Result<ServerEvent, ClientError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn frames_decode_into_events() {
        let event = parse_frame(r#"{"event":"prayer:deleted","data":{"id":4}}"#).unwrap();
        assert_eq!(event, ServerEvent::PrayerDeleted { id: 4 });
        assert_matches!(parse_frame("{}"), Err(ClientError::Decode(_)));
    }

    #[test]
    fn frames_update_the_shared_store() {
        let client = GatewayClient::new("ws://127.0.0.1:9/socket", None);
        let now = chrono::Utc::now();
        let created = ServerEvent::PrayerCreated {
            card: vigil_types::models::Card {
                id: 4,
                group_id: 1,
                author_id: 1,
                title: "Safe travels".into(),
                body: String::new(),
                category: None,
                column: vigil_types::models::Column::Active,
                position: 0,
                comment_count: 0,
                last_comment_at: None,
                is_comments_closed: false,
                created_at: now,
                updated_at: now,
            },
        };

        client.handle_frame(&serde_json::to_string(&created).unwrap());
        client.handle_frame("garbage");
        assert_eq!(client.store().lock().unwrap().card(4).unwrap().title, "Safe travels");

        client.handle_frame(r#"{"event":"prayer:deleted","data":{"id":4}}"#);
        assert!(client.store().lock().unwrap().card(4).is_none());
    }

    #[test]
    fn join_is_queued_once_per_group() {
        let client = GatewayClient::new("ws://127.0.0.1:9/socket", None);
        client.join_group(5);
        client.join_group(5);
        client.leave_group(5);

        let mut rx = client.commands_rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::JoinGroup { group_id: 5 });
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::LeaveGroup { group_id: 5 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_returns_once_cancelled_while_the_server_is_down() {
        let client = GatewayClient::new("ws://127.0.0.1:9/socket", None).with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        // The first dial fails at once; only cancellation can end the 60s wait.
        tokio::time::timeout(Duration::from_secs(5), client.run(cancel))
            .await
            .expect("run should stop on cancel");
    }

    #[tokio::test]
    async fn run_with_a_cancelled_token_returns_without_dialing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = GatewayClient::new("ws://127.0.0.1:9/socket", None);
        tokio::time::timeout(Duration::from_secs(1), client.run(cancel))
            .await
            .expect("run should return immediately");
    }

    #[tokio::test]
    async fn connect_to_nothing_is_an_error() {
        let client = GatewayClient::new("ws://127.0.0.1:9/socket", Some("t".into()));
        assert!(client.connect().await.is_err());
    }
}
