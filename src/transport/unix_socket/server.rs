//! Unix socket server implementation

use std::{os::unix::fs::PermissionsExt, path::Path, sync::Arc};
use tokio::{
    fs,
    net::{UnixListener, UnixStream},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, error, info, warn};

use crate::{
    core::error::TransportResult,
    protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId},
    transport::unix_socket::{
        broadcast::BroadcastSink,
        handler::RequestHandler,
        session::{SessionReader, UnixSocketSession},
    },
};

/// Unix socket server
pub struct UnixSocketServer {
    socket_path: String,
    socket_mode: u32,
    handler: Arc<RequestHandler>,
    notifications: BroadcastSink,
}

impl UnixSocketServer {
    pub fn new(
        socket_path: String,
        socket_mode: u32,
        handler: RequestHandler,
        notifications: BroadcastSink,
    ) -> Self {
        Self {
            socket_path,
            socket_mode,
            handler: Arc::new(handler),
            notifications,
        }
    }

    /// Take the listener passed by the service manager, or bind our own
    pub async fn listen(&self) -> TransportResult<UnixListener> {
        let mut listenfd = listenfd::ListenFd::from_env();
        if let Some(listener) = listenfd.take_unix_listener(0)? {
            listener.set_nonblocking(true)?;
            info!("Using socket-activated Unix listener");
            return Ok(UnixListener::from_std(listener)?);
        }

        // Remove stale socket file
        if Path::new(&self.socket_path).exists() {
            fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        fs::set_permissions(
            &self.socket_path,
            std::fs::Permissions::from_mode(self.socket_mode),
        )
        .await?;
        info!(
            "Unix socket server listening on {} (mode {:o})",
            self.socket_path, self.socket_mode
        );

        Ok(listener)
    }

    /// Accept clients until the listener fails
    pub async fn serve(&self, listener: UnixListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = self.handler.clone();
                    let notifications = self.notifications.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, handler, notifications).await {
                            error!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        stream: UnixStream,
        handler: Arc<RequestHandler>,
        notifications: broadcast::Receiver<JsonRpcNotification>,
    ) -> TransportResult<()> {
        let (read_half, write_half) = stream.into_split();
        let session = UnixSocketSession::new(write_half);
        let mut reader = SessionReader::new(read_half);

        info!("New client connected: {:?}", session.id());

        let forwarder = tokio::spawn(Self::forward_notifications(
            session.clone(),
            notifications,
        ));

        let result = Self::process_requests(&session, &mut reader, &handler).await;
        forwarder.abort();
        info!("Client disconnected: {:?}", session.id());

        result
    }

    async fn process_requests(
        session: &UnixSocketSession,
        reader: &mut SessionReader,
        handler: &RequestHandler,
    ) -> TransportResult<()> {
        while let Some(line) = reader.read_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => handler.handle_request(request).await,
                Err(e) => match Self::request_id(&line) {
                    Some(id) => {
                        warn!("Invalid JSON-RPC request: {}", e);
                        JsonRpcResponse::error(JsonRpcError::invalid_request(e.to_string()), id)
                    }
                    None => {
                        warn!("Unparseable message dropped: {}", e);
                        continue;
                    }
                },
            };

            session.send_response(&response).await?;
        }

        Ok(())
    }

    /// Id of a message that is JSON but not a valid request
    fn request_id(line: &str) -> Option<RequestId> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        serde_json::from_value(value.get("id")?.clone()).ok()
    }

    async fn forward_notifications(
        session: UnixSocketSession,
        mut notifications: broadcast::Receiver<JsonRpcNotification>,
    ) {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    if let Err(e) = session.send_notification(&notification).await {
                        debug!("Stopping notifications for {:?}: {}", session.id(), e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client too slow, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::MockBleBackend,
        core::{
            authorization::AuthorizationService, session::SessionHandle,
            types::SessionConfig,
        },
        protocol::{Notification, Request},
    };
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn start_server(socket_path: &Path) -> BroadcastSink {
        let sink = BroadcastSink::new();
        let session = SessionHandle::spawn(
            Arc::new(MockBleBackend::new()),
            Arc::new(sink.clone()),
            SessionConfig::default(),
        );
        let handler = RequestHandler::new(
            session,
            Arc::new(AuthorizationService::new("secret")),
            "MyBLEDevice".into(),
        );
        let server = UnixSocketServer::new(
            socket_path.to_str().unwrap().to_string(),
            0o600,
            handler,
            sink.clone(),
        );

        let listener = server.listen().await.unwrap();
        tokio::spawn(async move {
            server.serve(listener).await.ok();
        });

        sink
    }

    #[tokio::test]
    async fn test_socket_permissions_applied() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("lock.sock");
        start_server(&socket_path).await;

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_connect_request_and_status_notification() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("lock.sock");
        start_server(&socket_path).await;

        let client = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Let the forwarder subscribe before the session starts emitting
        tokio::time::sleep(Duration::from_millis(20)).await;

        let request = JsonRpcRequest::new(Request::Connect, RequestId::Number(1));
        let json = serde_json::to_string(&request).unwrap();
        write_half.write_all(json.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();

        let mut saw_response = false;
        let mut saw_scanning = false;
        for _ in 0..2 {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&line) {
                assert_eq!(response.id, RequestId::Number(1));
                assert!(response.error.is_none());
                saw_response = true;
            } else {
                let notification: JsonRpcNotification = serde_json::from_str(&line).unwrap();
                assert_eq!(
                    notification.notification,
                    Notification::status_changed(crate::core::types::SessionStatus::Scanning)
                );
                saw_scanning = true;
            }
        }
        assert!(saw_response && saw_scanning);
    }

    #[tokio::test]
    async fn test_invalid_request_answered_with_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("lock.sock");
        start_server(&socket_path).await;

        let client = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"not json\n{\"jsonrpc\":\"2.0\",\"method\":\"explode\",\"id\":9}\n")
            .await
            .unwrap();

        let line = lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, RequestId::Number(9));
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[test]
    fn test_request_id_extraction() {
        assert_eq!(
            UnixSocketServer::request_id(r#"{"id":"abc","method":"nope"}"#),
            Some(RequestId::String("abc".into()))
        );
        assert_eq!(UnixSocketServer::request_id("garbage"), None);
        assert_eq!(UnixSocketServer::request_id(r#"{"method":"lock"}"#), None);
    }
}
