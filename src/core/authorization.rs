//! Authorization of lock commands with SHA3-256 key verification and expiry

use sha3::{Digest, Sha3_256};
use std::{sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info};

use crate::core::{
    error::{TransportError, TransportResult},
    types::AuthorizationState,
};

/// How long a successful authorization stays valid
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Expected key for `secret`: SHA3-256 of its UTF-8 bytes
pub fn authorization_key(secret: &str) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Grants lock/unlock rights to clients presenting SHA3-256(secret)
#[derive(Debug, Clone)]
pub struct AuthorizationService {
    expected: [u8; 32],
    ttl: Duration,
    state: Arc<RwLock<AuthorizationState>>,
}

impl AuthorizationService {
    pub fn new(secret: &str) -> Self {
        Self::with_timeout(secret, AUTHORIZATION_TIMEOUT)
    }

    pub fn with_timeout(secret: &str, ttl: Duration) -> Self {
        Self {
            expected: authorization_key(secret),
            ttl,
            state: Arc::new(RwLock::new(AuthorizationState::Unauthorized)),
        }
    }

    /// Authorize with a hex encoded 32-byte key
    pub async fn authorize_hex(&self, key: &str) -> TransportResult<()> {
        let key = hex::decode(key.trim()).map_err(|e| {
            debug!("Malformed authorization key: {}", e);
            TransportError::InvalidAuthorizationKey
        })?;
        self.authorize(&key).await
    }

    /// Authorize with a raw 32-byte key
    pub async fn authorize(&self, key: &[u8]) -> TransportResult<()> {
        if key != self.expected.as_slice() {
            return Err(TransportError::InvalidAuthorizationKey);
        }

        let expires_at = Instant::now() + self.ttl;
        *self.state.write().await = AuthorizationState::Authorized { expires_at };
        info!(ttl_secs = self.ttl.as_secs(), "Client authorized");

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn is_authorized(&self) -> bool {
        self.state.read().await.is_authorized()
    }
}
