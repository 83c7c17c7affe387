pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod moderation;
pub mod payments;
pub mod routes;
pub mod utils;

use std::sync::Arc;

use axum::extract::FromRef;
use jsonwebtoken::{DecodingKey, EncodingKey};
use sqlx::PgPool;

use crate::{config::Config, moderation::ModerationQueue, payments::StripeClient};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub queue: ModerationQueue,
    pub stripe: StripeClient,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        queue: ModerationQueue,
        stripe: StripeClient,
        encoding_key: EncodingKey,
        decoding_key: DecodingKey,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            queue,
            stripe,
            encoding_key,
            decoding_key,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> PgPool {
        app_state.pool.clone()
    }
}

impl FromRef<AppState> for EncodingKey {
    fn from_ref(app_state: &AppState) -> EncodingKey {
        app_state.encoding_key.clone()
    }
}

impl FromRef<AppState> for DecodingKey {
    fn from_ref(app_state: &AppState) -> DecodingKey {
        app_state.decoding_key.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(app_state: &AppState) -> Arc<Config> {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for ModerationQueue {
    fn from_ref(app_state: &AppState) -> ModerationQueue {
        app_state.queue.clone()
    }
}

impl FromRef<AppState> for StripeClient {
    fn from_ref(app_state: &AppState) -> StripeClient {
        app_state.stripe.clone()
    }
}
