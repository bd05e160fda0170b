//! JSON-RPC request handler for Unix socket transport

use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    core::{
        authorization::AuthorizationService, command::LockCommand, error::CommandError,
        session::SessionHandle,
    },
    protocol::{
        AckResponse, AuthorizeParams, AuthorizedResponse, JsonRpcError, JsonRpcRequest,
        JsonRpcResponse, Request, RequestId, Response, StatusResponse,
    },
};

/// JSON-RPC request handler
pub struct RequestHandler {
    session: SessionHandle,
    authorization: Arc<AuthorizationService>,
    device_name: String,
}

impl RequestHandler {
    pub fn new(
        session: SessionHandle,
        authorization: Arc<AuthorizationService>,
        device_name: String,
    ) -> Self {
        Self {
            session,
            authorization,
            device_name,
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(request = ?request.request, "Handling request");

        match request.request {
            Request::Authorize(params) => self.handle_authorize(params, request.id).await,
            Request::Connect => self.handle_connect(request.id).await,
            Request::Disconnect => self.handle_disconnect(request.id).await,
            Request::Lock => self.handle_command(LockCommand::Lock, request.id).await,
            Request::Unlock => self.handle_command(LockCommand::Unlock, request.id).await,
            Request::GetStatus => self.handle_get_status(request.id).await,
        }
    }

    async fn handle_authorize(&self, params: AuthorizeParams, id: RequestId) -> JsonRpcResponse {
        match self.authorization.authorize_hex(&params.key).await {
            Ok(()) => JsonRpcResponse::success(
                Response::Authorized(AuthorizedResponse::ok(self.authorization.ttl().as_secs())),
                id,
            ),
            Err(e) => {
                warn!("Rejected authorization attempt: {}", e);
                JsonRpcResponse::error(JsonRpcError::unauthorized(), id)
            }
        }
    }

    async fn handle_connect(&self, id: RequestId) -> JsonRpcResponse {
        match self.session.connect(self.device_name.clone()).await {
            Ok(()) => JsonRpcResponse::success(Response::Ack(AckResponse::ok()), id),
            Err(e) => JsonRpcResponse::error(e.into(), id),
        }
    }

    async fn handle_disconnect(&self, id: RequestId) -> JsonRpcResponse {
        match self.session.disconnect().await {
            Ok(()) => JsonRpcResponse::success(Response::Ack(AckResponse::ok()), id),
            Err(e) => JsonRpcResponse::error(e.into(), id),
        }
    }

    async fn handle_command(&self, command: LockCommand, id: RequestId) -> JsonRpcResponse {
        if !self.authorization.is_authorized().await {
            return JsonRpcResponse::error(CommandError::Unauthorized.into(), id);
        }

        match self.session.command(command).await {
            Ok(()) => JsonRpcResponse::success(Response::Ack(AckResponse::ok()), id),
            Err(e) => JsonRpcResponse::error(e.into(), id),
        }
    }

    async fn handle_get_status(&self, id: RequestId) -> JsonRpcResponse {
        match self.session.snapshot().await {
            Ok(snapshot) => {
                JsonRpcResponse::success(Response::Status(StatusResponse::ok(snapshot)), id)
            }
            Err(e) => JsonRpcResponse::error(e.into(), id),
        }
    }
}
