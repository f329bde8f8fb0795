//! Claim types carried by the provider's ID tokens.

use openidconnect::{
    EmptyExtraTokenFields, IdTokenFields, StandardErrorResponse, StandardTokenResponse,
    core::{
        CoreAuthDisplay, CoreAuthPrompt, CoreErrorResponseType, CoreGenderClaim, CoreJsonWebKey,
        CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm, CoreRevocableToken,
        CoreRevocationErrorResponse, CoreTokenIntrospectionResponse, CoreTokenType,
    },
};
use serde::{Deserialize, Serialize};

/// Realm-level role container, as Keycloak-style providers emit it.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Non-standard claims expected in the provider's ID tokens.
///
/// Providers that omit `realm_access` still verify fine; the role list is
/// just empty.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoleClaims {
    #[serde(default)]
    pub realm_access: RealmAccess,
}

impl openidconnect::AdditionalClaims for RoleClaims {}

/// ID token type parameterized with the realm-role claims.
pub type RoleIdToken = openidconnect::IdToken<
    RoleClaims,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJwsSigningAlgorithm,
>;

pub(super) type RoleTokenResponse = StandardTokenResponse<
    IdTokenFields<
        RoleClaims,
        EmptyExtraTokenFields,
        CoreGenderClaim,
        CoreJweContentEncryptionAlgorithm,
        CoreJwsSigningAlgorithm,
    >,
    CoreTokenType,
>;

pub(super) type RoleClient<
    HasAuthUrl = openidconnect::EndpointSet,
    HasDeviceAuthUrl = openidconnect::EndpointNotSet,
    HasIntrospectionUrl = openidconnect::EndpointNotSet,
    HasRevocationUrl = openidconnect::EndpointNotSet,
    HasTokenUrl = openidconnect::EndpointSet,
    HasUserInfoUrl = openidconnect::EndpointNotSet,
> = openidconnect::Client<
    RoleClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<CoreErrorResponseType>,
    RoleTokenResponse,
    CoreTokenIntrospectionResponse,
    CoreRevocableToken,
    CoreRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
    HasUserInfoUrl,
>;

/// Verified identity claims for one request.
///
/// Derived from the ID token on every request and injected into the request
/// extensions by the guard; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub roles: Vec<String>,
}

impl Identity {
    /// Case-insensitive membership check against the realm role list.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

pub(super) type RoleIdTokenClaims = openidconnect::IdTokenClaims<RoleClaims, CoreGenderClaim>;

impl Identity {
    pub(super) fn from_claims(claims: &RoleIdTokenClaims) -> Self {
        Self {
            subject: claims.subject().as_str().to_string(),
            email: claims.email().map(|email| (**email).clone()),
            given_name: claims
                .given_name()
                .and_then(|name| name.get(None))
                .map(|name| (**name).clone())
                .unwrap_or_default(),
            family_name: claims
                .family_name()
                .and_then(|name| name.get(None))
                .map(|name| (**name).clone())
                .unwrap_or_default(),
            roles: claims.additional_claims().realm_access.roles.clone(),
        }
    }
}
