use utoipa::OpenApi;

use crate::api::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::callback,
        auth::logout,
        auth::me,
    ),
    components(schemas(
        health::Health,
        auth::LoginResponse,
        auth::LogoutResponse,
        auth::MeResponse,
    )),
    tags(
        (name = "auth", description = "OpenID Connect session broker endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
