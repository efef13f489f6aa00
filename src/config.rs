use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters. Defaults match `argon2::Params::default()`.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub host: String,
    pub port: u16,
}

/// Ten years.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365 * 10;

const DEFAULT_TTL_MINUTES: i64 = 60 * 24 * 90;

/// Parses `JWT_TTL_MINUTES`. Missing or unparsable falls back to the default;
/// non-positive or overlong values are rejected.
fn ttl_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let minutes = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TTL_MINUTES);
    if minutes <= 0 {
        anyhow::bail!("JWT_TTL_MINUTES must be positive, got {minutes}");
    }
    if minutes > MAX_TTL_MINUTES || minutes.checked_mul(60).is_none() {
        anyhow::bail!("JWT_TTL_MINUTES must be at most {MAX_TTL_MINUTES}, got {minutes}");
    }
    Ok(minutes)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userauth-users".into()),
            ttl_minutes: ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok().as_deref())?,
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", defaults.memory_kib),
            iterations: env_or("ARGON2_ITERATIONS", defaults.iterations),
            parallelism: env_or("ARGON2_PARALLELISM", defaults.parallelism),
        };

        Ok(Self {
            database_url,
            jwt,
            password,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_missing_or_garbage() {
        assert_eq!(env_or("USERAUTH_TEST_SURELY_UNSET", 42u32), 42);
        assert_eq!(env_or("PATH", 7u16), 7);
    }

    #[test]
    fn ttl_is_bounded() {
        assert_eq!(ttl_minutes(None).unwrap(), DEFAULT_TTL_MINUTES);
        assert_eq!(ttl_minutes(Some("not-a-number")).unwrap(), DEFAULT_TTL_MINUTES);
        assert_eq!(ttl_minutes(Some(" 15 ")).unwrap(), 15);
        assert_eq!(
            ttl_minutes(Some(&MAX_TTL_MINUTES.to_string())).unwrap(),
            MAX_TTL_MINUTES
        );
        assert!(ttl_minutes(Some("0")).is_err());
        assert!(ttl_minutes(Some("-5")).is_err());
        assert!(ttl_minutes(Some(&(MAX_TTL_MINUTES + 1).to_string())).is_err());
        assert!(ttl_minutes(Some(&i64::MAX.to_string())).is_err());
    }

    #[test]
    fn password_defaults_track_argon2() {
        let cfg = PasswordConfig::default();
        let params = argon2::Params::default();
        assert_eq!(cfg.memory_kib, params.m_cost());
        assert_eq!(cfg.iterations, params.t_cost());
        assert_eq!(cfg.parallelism, params.p_cost());
    }
}
