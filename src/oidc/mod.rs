//! Identity provider client: discovery, code exchange, refresh, and ID
//! token verification against one fixed issuer.
//!
//! Discovery and token calls go to the provider's internal base URL while
//! issuer and ID token validation are pinned to the public-facing issuer,
//! so the broker can sit behind a different hostname than the browser.

use async_trait::async_trait;
use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClaimsVerificationError, ClientId, ClientSecret,
    CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
    core::{
        CoreAuthDisplay, CoreClaimName, CoreClaimType, CoreClientAuthMethod, CoreGrantType,
        CoreJsonWebKey, CoreJsonWebKeySet, CoreJweContentEncryptionAlgorithm,
        CoreJweKeyManagementAlgorithm, CoreResponseMode, CoreResponseType,
        CoreSubjectIdentifierType,
    },
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

mod claims;

pub use claims::{Identity, RealmAccess, RoleClaims, RoleIdToken};
use claims::{RoleClient, RoleTokenResponse};

/// Additional discovery metadata: the RP-initiated logout endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EndSessionProviderMetadata {
    end_session_endpoint: Option<Url>,
}

impl openidconnect::AdditionalProviderMetadata for EndSessionProviderMetadata {}

type DiscoveryMetadata = openidconnect::ProviderMetadata<
    EndSessionProviderMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// Static provider configuration, resolved from CLI arguments.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Base URL the broker reaches the provider on (server-side network).
    pub internal_base_url: String,
    /// Base URL the browser reaches the provider on; issuer validation is
    /// pinned to this one.
    pub public_base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The token is well-formed and correctly signed but past its expiry.
    /// Downstream treats this as "needs refresh", not rejection.
    #[error("id token expired")]
    TokenExpired,
    #[error("id token verification failed: {0}")]
    Verification(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("provider discovery failed: {0}")]
    Discovery(String),
    #[error("issuer mismatch: discovery document announces {actual}, expected {expected}")]
    IssuerMismatch { expected: String, actual: String },
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

/// Tokens returned by one exchange or refresh call, opaque to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// Seam between the session machinery and the network-facing OIDC client.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization URL for the provider's login page, bound to `state`.
    fn authorize_url(&self, state: &str) -> Url;

    /// Exchange an authorization code for tokens.
    async fn exchange(&self, code: &str) -> Result<TokenSet, ProviderError>;

    /// Exchange a refresh token for fresh tokens.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;

    /// Verify a raw ID token: signature, issuer, audience, and expiry.
    fn verify(&self, id_token: &str) -> Result<Identity, ProviderError>;

    /// The provider's RP-initiated logout endpoint, without query parameters.
    fn end_session_url(&self) -> Url;
}

/// The real client. Process-wide, built once at startup, immutable after.
pub struct Provider {
    client: RoleClient,
    http: reqwest::Client,
    end_session: Url,
}

impl Provider {
    /// Fetch discovery metadata and JWKS, validate the issuer, and wire the
    /// OAuth2 client.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for startup: unreachable discovery or JWKS
    /// endpoints, an issuer that does not match the expected public-facing
    /// one, or malformed configuration URLs.
    pub async fn discover(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            // OAuth endpoints must never be followed through redirects.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ProviderError::Config(err.to_string()))?;

        let internal_issuer = realm_url(&config.internal_base_url, &config.realm);
        let expected_issuer = realm_url(&config.public_base_url, &config.realm);

        let discovery_url = format!("{internal_issuer}/.well-known/openid-configuration");
        debug!(url = %discovery_url, "fetching provider discovery document");
        let metadata = fetch_json::<DiscoveryMetadata>(&http, &discovery_url).await?;

        let actual_issuer = metadata.issuer().as_str().trim_end_matches('/');
        if actual_issuer != expected_issuer {
            return Err(ProviderError::IssuerMismatch {
                expected: expected_issuer,
                actual: actual_issuer.to_string(),
            });
        }

        // Keys come from the internal host even though the issuer is public.
        let jwks_url = format!("{internal_issuer}/protocol/openid-connect/certs");
        let jwks = fetch_json::<CoreJsonWebKeySet>(&http, &jwks_url).await?;

        let token_url = TokenUrl::new(format!("{internal_issuer}/protocol/openid-connect/token"))
            .map_err(|err| ProviderError::Config(err.to_string()))?;
        let issuer_url = IssuerUrl::new(expected_issuer.clone())
            .map_err(|err| ProviderError::Config(err.to_string()))?;
        let redirect_url = RedirectUrl::new(config.redirect_url.clone())
            .map_err(|err| ProviderError::Config(err.to_string()))?;

        let end_session = match metadata.additional_metadata().end_session_endpoint.clone() {
            Some(url) => url,
            None => Url::parse(&format!("{expected_issuer}/protocol/openid-connect/logout"))
                .map_err(|err| ProviderError::Config(err.to_string()))?,
        };

        let client: RoleClient = openidconnect::Client::new(
            ClientId::new(config.client_id.clone()),
            issuer_url,
            jwks,
        )
        .set_client_secret(ClientSecret::new(
            config.client_secret.expose_secret().to_string(),
        ))
        .set_auth_uri(metadata.authorization_endpoint().clone())
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url);

        info!(issuer = %expected_issuer, "identity provider configured");

        Ok(Self {
            client,
            http,
            end_session,
        })
    }
}

#[async_trait]
impl IdentityProvider for Provider {
    fn authorize_url(&self, state: &str) -> Url {
        let state = state.to_string();
        let (url, _state, _nonce) = self
            .client
            .authorize_url(
                AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
                move || CsrfToken::new(state),
                Nonce::new_random,
            )
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("roles".to_string()))
            .url();
        url
    }

    async fn exchange(&self, code: &str) -> Result<TokenSet, ProviderError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|err| ProviderError::Exchange(err.to_string()))?;

        Ok(token_set(&response))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|err| ProviderError::Exchange(err.to_string()))?;

        Ok(token_set(&response))
    }

    fn verify(&self, id_token: &str) -> Result<Identity, ProviderError> {
        let id_token: RoleIdToken = id_token
            .parse()
            .map_err(|err| ProviderError::Verification(format!("malformed id token: {err}")))?;

        // Nonce checks are skipped: tokens are re-verified on every request,
        // long after the login round trip where the nonce lived. Login CSRF
        // is covered by the state parameter.
        let claims = id_token
            .claims(&self.client.id_token_verifier(), |_: Option<&Nonce>| Ok(()))
            .map_err(|err| match err {
                ClaimsVerificationError::Expired(_) => ProviderError::TokenExpired,
                other => ProviderError::Verification(other.to_string()),
            })?;

        Ok(Identity::from_claims(claims))
    }

    fn end_session_url(&self) -> Url {
        self.end_session.clone()
    }
}

fn token_set(response: &RoleTokenResponse) -> TokenSet {
    TokenSet {
        access_token: response.access_token().secret().clone(),
        refresh_token: response.refresh_token().map(|token| token.secret().clone()),
        id_token: response.id_token().map(ToString::to_string),
    }
}

fn realm_url(base_url: &str, realm: &str) -> String {
    format!("{}/realms/{}", base_url.trim_end_matches('/'), realm)
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> Result<T, ProviderError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|err| ProviderError::Discovery(err.to_string()))?
        .error_for_status()
        .map_err(|err| ProviderError::Discovery(err.to_string()))?;

    response
        .json::<T>()
        .await
        .map_err(|err| ProviderError::Discovery(err.to_string()))
}
