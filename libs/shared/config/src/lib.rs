use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    pub default_slot_duration_minutes: i64,
    pub notification_channel_capacity: usize,
    pub allow_past_bookings: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            server_port: 3000,
            default_slot_duration_minutes: 30,
            notification_channel_capacity: 64,
            allow_past_bookings: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, falling back to in-memory storage");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            default_slot_duration_minutes: parse_var(
                "DEFAULT_SLOT_DURATION_MINUTES",
                defaults.default_slot_duration_minutes,
            ),
            notification_channel_capacity: parse_var(
                "NOTIFICATION_CHANNEL_CAPACITY",
                defaults.notification_channel_capacity,
            ),
            allow_past_bookings: parse_var("ALLOW_PAST_BOOKINGS", defaults.allow_past_bookings),
        };

        if !config.is_auth_configured() {
            warn!("SUPABASE_JWT_SECRET missing - every authenticated request will be rejected");
        }

        config
    }

    /// True when a PostgREST backend is available for durable storage.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_auth_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
