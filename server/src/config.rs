use anyhow::{Context, Result, anyhow};

use crate::auth::AuthConfig;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 12 * 60;
const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET missing")?;
        if jwt_secret.trim().len() < 32 {
            return Err(anyhow!("JWT_SECRET must be at least 32 bytes"));
        }

        let session_ttl_minutes =
            parse_session_ttl(std::env::var("SESSION_TTL_MINUTES").ok().as_deref())?;

        let cors_allowed_origins = parse_origins(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        Ok(Self {
            auth: AuthConfig {
                jwt_secret: jwt_secret.trim().to_string(),
                session_ttl_minutes,
            },
            cors_allowed_origins,
        })
    }
}

fn parse_session_ttl(raw: Option<&str>) -> Result<i64> {
    let minutes = match raw {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .context("invalid SESSION_TTL_MINUTES")?,
        None => DEFAULT_SESSION_TTL_MINUTES,
    };
    if !(1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) {
        return Err(anyhow!(
            "SESSION_TTL_MINUTES must be between 1 and {MAX_SESSION_TTL_MINUTES}"
        ));
    }
    Ok(minutes)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
