/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Maximum number of users returned by a candidate search
pub const SEARCH_RESULT_LIMIT: usize = 10;

/// Maximum JSON request body in bytes (4 MiB)
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Legacy header carrying the bearer token without the `Bearer ` prefix
pub const TOKEN_HEADER: &str = "token";

/// Path of the realtime WebSocket endpoint
pub const WS_PATH: &str = "/ws";

/// Default bearer token lifetime in hours (7 days)
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;
