use crate::api;
use crate::oidc::ProviderConfig;
use anyhow::Result;
use std::time::Duration;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub public_url: String,
    pub provider: ProviderConfig,
    pub sso_max_lifespan: u64,
}

/// Handle the server action
///
/// # Errors
///
/// Returns an error if a startup dependency is unavailable or the server
/// stops unexpectedly.
pub async fn handle(args: Args) -> Result<()> {
    let auth_config = api::AuthConfig::new(
        args.public_url,
        Duration::from_secs(args.sso_max_lifespan),
    );

    api::new(
        args.port,
        args.dsn,
        args.redis_url,
        args.provider,
        auth_config,
    )
    .await
}
