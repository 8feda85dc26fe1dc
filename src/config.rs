use std::env;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use governor::Quota;

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,

    // Game server status
    pub game_server_host: String,
    pub game_server_port: u16,
    pub poll_interval_secs: u64,
    pub query_timeout_ms: u64,

    // Hosted backend; memory backend when unset
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,

    pub local_storage_path: String,
    pub announcements_page_size: usize,
    pub notification_history: usize,
    pub admin_session_ttl_secs: u64,

    // Rate limiting configs
    pub ticket_period_secs: u64,
    pub ticket_burst_limit: u32,
    pub login_period_secs: u64,
    pub login_burst_limit: u32,

    // Seed admin for the memory backend
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            game_server_host: "127.0.0.1".to_string(),
            game_server_port: 7777,
            poll_interval_secs: 60,
            query_timeout_ms: 2000,
            backend_url: None,
            backend_api_key: None,
            local_storage_path: "data/local_storage.json".to_string(),
            announcements_page_size: 6,
            notification_history: 20,
            admin_session_ttl_secs: 8 * 60 * 60,
            ticket_period_secs: 60,
            ticket_burst_limit: 5,
            login_period_secs: 12,
            login_burst_limit: 5,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: parsed("PORT", defaults.port),

            game_server_host: env::var("GAME_SERVER_HOST").unwrap_or(defaults.game_server_host),
            game_server_port: parsed("GAME_SERVER_PORT", defaults.game_server_port),
            poll_interval_secs: parsed("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            query_timeout_ms: parsed("QUERY_TIMEOUT_MS", defaults.query_timeout_ms),

            backend_url: optional("BACKEND_URL"),
            backend_api_key: optional("BACKEND_API_KEY"),

            local_storage_path: env::var("LOCAL_STORAGE_PATH").unwrap_or(defaults.local_storage_path),
            announcements_page_size: parsed("ANNOUNCEMENTS_PAGE_SIZE", defaults.announcements_page_size),
            notification_history: parsed("NOTIFICATION_HISTORY", defaults.notification_history),
            admin_session_ttl_secs: parsed("ADMIN_SESSION_TTL_SECS", defaults.admin_session_ttl_secs),

            ticket_period_secs: parsed("TICKET_PERIOD_SECS", defaults.ticket_period_secs),
            ticket_burst_limit: parsed("TICKET_BURST_LIMIT", defaults.ticket_burst_limit),
            login_period_secs: parsed("LOGIN_PERIOD_SECS", defaults.login_period_secs),
            login_burst_limit: parsed("LOGIN_BURST_LIMIT", defaults.login_burst_limit),

            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn admin_session_ttl(&self) -> Duration {
        Duration::from_secs(self.admin_session_ttl_secs)
    }

    pub fn ticket_quota(&self) -> Quota {
        quota(self.ticket_period_secs, self.ticket_burst_limit)
    }

    pub fn login_quota(&self) -> Quota {
        quota(self.login_period_secs, self.login_burst_limit)
    }
}

fn quota(period_secs: u64, burst: u32) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(Duration::from_secs(period_secs.max(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind())
            .field("game_server", &format!("{}:{}", self.game_server_host, self.game_server_port))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("backend_url", &self.backend_url)
            .field("backend_api_key", &self.backend_api_key.as_ref().map(|_| "<redacted>"))
            .field("local_storage_path", &self.local_storage_path)
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_burst_still_builds_a_quota() {
        let q = quota(0, 0);
        assert_eq!(q.burst_size().get(), 1);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            backend_api_key: Some("service-role-secret".into()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("service-role-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
