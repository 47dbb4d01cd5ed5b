//! Static path constants shared by routing, metrics and the security gate.

pub const ALIVE_CHECK_PATH: &str = "/health/alive";
pub const READY_CHECK_PATH: &str = "/health/ready";
pub const VERSION_PATH: &str = "/version";
pub const METRICS_PROMETHEUS_PATH: &str = "/metrics/prometheus";

pub const ADMIN_PREFIX: &str = "/admin";

// Protocol surface served by the business layer.
pub const KEY_HANDLER_PATH: &str = "/keys";
pub const WELL_KNOWN_KEYS_PATH: &str = "/.well-known/jwks.json";
pub const CLIENTS_HANDLER_PATH: &str = "/clients";
pub const DYN_CLIENTS_HANDLER_PATH: &str = "/oauth2/register";
pub const DEFAULT_CONSENT_PATH: &str = "/oauth2/fallbacks/consent";
pub const DEFAULT_LOGIN_PATH: &str = "/oauth2/fallbacks/login";
pub const DEFAULT_POST_LOGOUT_PATH: &str = "/oauth2/fallbacks/logout/callback";
pub const DEFAULT_LOGOUT_PATH: &str = "/oauth2/fallbacks/logout";
pub const DEFAULT_ERROR_PATH: &str = "/oauth2/fallbacks/error";
pub const TOKEN_PATH: &str = "/oauth2/token";
pub const AUTH_PATH: &str = "/oauth2/auth";
pub const LOGOUT_PATH: &str = "/oauth2/sessions/logout";
pub const USERINFO_PATH: &str = "/userinfo";
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";
pub const JWK_PATH: &str = "/.well-known/jwks.json";
pub const INTROSPECT_PATH: &str = "/oauth2/introspect";
pub const DELETE_TOKENS_PATH: &str = "/oauth2/tokens";
pub const REVOCATION_PATH: &str = "/oauth2/revoke";
pub const CONSENT_REQUEST_PATH: &str = "/oauth2/auth/requests/consent";
pub const LOGIN_REQUEST_PATH: &str = "/oauth2/auth/requests/login";
pub const LOGOUT_REQUEST_PATH: &str = "/oauth2/auth/requests/logout";
pub const SESSIONS_PATH: &str = "/oauth2/auth/sessions";

/// `path` mounted under the admin prefix.
pub fn admin(path: &str) -> String {
    format!("{ADMIN_PREFIX}{path}")
}

/// Liveness, readiness and metrics probes on either interface.
pub fn is_probe(path: &str) -> bool {
    let path = path.strip_prefix(ADMIN_PREFIX).unwrap_or(path);
    matches!(
        path,
        ALIVE_CHECK_PATH | READY_CHECK_PATH | METRICS_PROMETHEUS_PATH
    )
}

/// Paths reported verbatim by the metrics collector.
///
/// Pure function of the constants above: both interfaces, protocol paths
/// first, then health/version/metrics, then the root catch-all.
pub fn whitelisted_paths() -> Vec<String> {
    let mut paths = vec![
        admin(KEY_HANDLER_PATH),
        WELL_KNOWN_KEYS_PATH.to_string(),
        admin(CLIENTS_HANDLER_PATH),
        DYN_CLIENTS_HANDLER_PATH.to_string(),
        DEFAULT_CONSENT_PATH.to_string(),
        DEFAULT_LOGIN_PATH.to_string(),
        DEFAULT_POST_LOGOUT_PATH.to_string(),
        DEFAULT_LOGOUT_PATH.to_string(),
        DEFAULT_ERROR_PATH.to_string(),
        TOKEN_PATH.to_string(),
        AUTH_PATH.to_string(),
        LOGOUT_PATH.to_string(),
        USERINFO_PATH.to_string(),
        WELL_KNOWN_PATH.to_string(),
        JWK_PATH.to_string(),
        admin(INTROSPECT_PATH),
        admin(DELETE_TOKENS_PATH),
        REVOCATION_PATH.to_string(),
    ];

    for flow in [CONSENT_REQUEST_PATH, LOGIN_REQUEST_PATH, LOGOUT_REQUEST_PATH] {
        paths.push(admin(flow));
        paths.push(admin(&format!("{flow}/accept")));
        paths.push(admin(&format!("{flow}/reject")));
    }
    paths.push(admin(&format!("{SESSIONS_PATH}/login")));
    paths.push(admin(&format!("{SESSIONS_PATH}/consent")));

    paths.extend([
        ALIVE_CHECK_PATH.to_string(),
        READY_CHECK_PATH.to_string(),
        admin(ALIVE_CHECK_PATH),
        admin(READY_CHECK_PATH),
        VERSION_PATH.to_string(),
        admin(VERSION_PATH),
        METRICS_PROMETHEUS_PATH.to_string(),
        admin(METRICS_PROMETHEUS_PATH),
        "/".to_string(),
    ]);
    paths
}
