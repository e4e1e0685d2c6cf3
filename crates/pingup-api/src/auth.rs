use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use pingup_db::Database;
use pingup_gateway::ConnectionRegistry;
use pingup_types::api::Claims;

use crate::assets::AssetStore;
use crate::connections::ConnectionService;
use crate::delivery::DeliveryService;
use crate::error::{ApiError, ApiResult};
use crate::store::Store;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler can reach. Owned by the server for its whole lifetime.
pub struct AppStateInner {
    pub store: Store,
    pub registry: ConnectionRegistry,
    pub assets: Arc<AssetStore>,
    pub identity: IdentityResolver,
    pub delivery: DeliveryService,
    pub connections: ConnectionService,
    pub webhook_secret: String,
    pub keep_alive: Duration,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        assets: AssetStore,
        identity: IdentityResolver,
        webhook_secret: String,
        keep_alive: Duration,
    ) -> AppState {
        let store = Store::new(db);
        let registry = ConnectionRegistry::new();
        let assets = Arc::new(assets);

        Arc::new(Self {
            delivery: DeliveryService::new(store.clone(), assets.clone(), Arc::new(registry.clone())),
            connections: ConnectionService::new(store.clone()),
            store,
            registry,
            assets,
            identity,
            webhook_secret,
            keep_alive,
        })
    }
}

/// Turns bearer tokens from the identity provider into user ids.
/// Tokens are HS256 JWTs whose `sub` is the user id.
pub struct IdentityResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl IdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn resolve(&self, token: &str) -> ApiResult<String> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| ApiError::Unauthenticated)?;
        if data.claims.sub.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        Ok(data.claims.sub)
    }

    /// Mint a token the way the identity provider would.
    pub fn issue(&self, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}
