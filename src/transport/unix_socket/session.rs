//! Unix socket client session management

use serde::Serialize;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::unix::{OwnedReadHalf, OwnedWriteHalf},
    sync::Mutex,
};

use crate::{
    core::{error::TransportResult, types::ClientId},
    protocol::{JsonRpcNotification, JsonRpcResponse},
};

/// Write side of a control client connection
///
/// Shared between the request loop and the notification forwarder, so
/// every line is written under the lock.
#[derive(Debug, Clone)]
pub struct UnixSocketSession {
    id: ClientId,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl UnixSocketSession {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            id: ClientId::new(),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn send_response(&self, response: &JsonRpcResponse) -> TransportResult<()> {
        self.send_line(response).await
    }

    pub async fn send_notification(
        &self,
        notification: &JsonRpcNotification,
    ) -> TransportResult<()> {
        self.send_line(notification).await
    }

    async fn send_line<T: Serialize>(&self, message: &T) -> TransportResult<()> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// Line-delimited reader for incoming requests
pub struct SessionReader {
    reader: BufReader<OwnedReadHalf>,
}

impl SessionReader {
    pub fn new(reader: OwnedReadHalf) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next line, `None` on EOF
    pub async fn read_line(&mut self) -> TransportResult<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);

        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::types::SessionStatus,
        protocol::{JsonRpcRequest, Notification, Request, RequestId},
    };
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_session_ids_unique() {
        let (client, server) = UnixStream::pair().unwrap();
        let first = UnixSocketSession::new(server.into_split().1);
        let second = UnixSocketSession::new(client.into_split().1);

        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_reader_strips_line_endings() {
        let (client, server) = UnixStream::pair().unwrap();
        let (read_half, _) = server.into_split();
        let mut reader = SessionReader::new(read_half);
        let (_, mut client_write) = client.into_split();

        let request = JsonRpcRequest::new(Request::Unlock, RequestId::Number(1));
        let json = serde_json::to_string(&request).unwrap();
        client_write.write_all(json.as_bytes()).await.unwrap();
        client_write.write_all(b"\r\n").await.unwrap();

        let line = reader.read_line().await.unwrap().unwrap();
        let received: JsonRpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn test_notification_written_as_line() {
        let (client, server) = UnixStream::pair().unwrap();
        let session = UnixSocketSession::new(server.into_split().1);
        let mut reader = SessionReader::new(client.into_split().0);

        let notification =
            JsonRpcNotification::new(Notification::status_changed(SessionStatus::Scanning));
        session.send_notification(&notification).await.unwrap();

        let line = reader.read_line().await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<JsonRpcNotification>(&line).unwrap(),
            notification
        );
    }

    #[tokio::test]
    async fn test_session_reader_eof() {
        let (client, server) = UnixStream::pair().unwrap();
        let (read_half, _) = server.into_split();
        let mut reader = SessionReader::new(read_half);

        drop(client);

        assert!(reader.read_line().await.unwrap().is_none());
    }
}
