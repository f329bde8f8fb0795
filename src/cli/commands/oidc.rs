use clap::{Arg, Command};

pub const ARG_OIDC_INTERNAL_URL: &str = "oidc-internal-url";
pub const ARG_OIDC_PUBLIC_URL: &str = "oidc-public-url";
pub const ARG_OIDC_REALM: &str = "oidc-realm";
pub const ARG_OIDC_CLIENT_ID: &str = "oidc-client-id";
pub const ARG_OIDC_CLIENT_SECRET: &str = "oidc-client-secret";
pub const ARG_OIDC_REDIRECT_URL: &str = "oidc-redirect-url";
pub const ARG_SSO_MAX_LIFESPAN: &str = "sso-max-lifespan";

const DEFAULT_SSO_MAX_LIFESPAN_SECONDS: &str = "36000";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OIDC_INTERNAL_URL)
                .long(ARG_OIDC_INTERNAL_URL)
                .help("Provider base URL for server-side discovery and token calls")
                .env("ENIREJO_OIDC_INTERNAL_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_OIDC_PUBLIC_URL)
                .long(ARG_OIDC_PUBLIC_URL)
                .help("Browser-facing provider base URL; issuer validation is pinned to it")
                .env("ENIREJO_OIDC_PUBLIC_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_OIDC_REALM)
                .long(ARG_OIDC_REALM)
                .help("Provider realm (tenant) name")
                .env("ENIREJO_OIDC_REALM")
                .required(true),
        )
        .arg(
            Arg::new(ARG_OIDC_CLIENT_ID)
                .long(ARG_OIDC_CLIENT_ID)
                .help("OAuth2 client id; also the expected ID token audience")
                .env("ENIREJO_OIDC_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_OIDC_CLIENT_SECRET)
                .long(ARG_OIDC_CLIENT_SECRET)
                .help("OAuth2 client secret")
                .env("ENIREJO_OIDC_CLIENT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_OIDC_REDIRECT_URL)
                .long(ARG_OIDC_REDIRECT_URL)
                .help("Redirect URL registered for the authorization-code callback")
                .env("ENIREJO_OIDC_REDIRECT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SSO_MAX_LIFESPAN)
                .long(ARG_SSO_MAX_LIFESPAN)
                .help("SSO session max lifespan in seconds; the hard ceiling on session lifetime")
                .env("ENIREJO_SSO_MAX_LIFESPAN")
                .default_value(DEFAULT_SSO_MAX_LIFESPAN_SECONDS)
                .value_parser(clap::value_parser!(u64)),
        )
}
