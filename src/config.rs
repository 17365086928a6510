use std::env;

use rand::RngCore;
use rand::rngs::OsRng;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public URL of this server, used for provider back URLs and the webhook URL.
    pub base_url: String,
    /// Frontend the browser lands on after a payment redirect.
    pub frontend_url: String,
    pub mercadopago_access_token: String,
    pub mercadopago_api_url: String,
    pub mercadopago_webhook_secret: Option<String>,
    pub jwt_secret: Vec<u8>,
    pub cors_origins: Vec<String>,
    pub bootstrap_superadmin_email: Option<String>,
    pub bootstrap_superadmin_password: Option<String>,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("CURSOS_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let base_url = env::var("BASE_URL")
            .or_else(|_| env::var("URL_BASE_SERVIDOR"))
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret.into_bytes(),
            None if dev_mode => {
                tracing::warn!("JWT_SECRET not set, using a random secret (tokens die on restart)");
                random_secret()
            }
            None => return Err("JWT_SECRET must be set outside dev mode".into()),
        };

        let mercadopago_access_token = match non_empty_var("MERCADO_PAGO_ACCESS_TOKEN") {
            Some(token) => token,
            None if dev_mode => String::new(),
            None => return Err("MERCADO_PAGO_ACCESS_TOKEN must be set outside dev mode".into()),
        };

        Ok(Self {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "API de Cursos".to_string()),
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "cursos.db".to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            mercadopago_access_token,
            mercadopago_api_url: env::var("MERCADO_PAGO_API_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            mercadopago_webhook_secret: non_empty_var("MERCADO_PAGO_WEBHOOK_SECRET"),
            jwt_secret,
            cors_origins: parse_origins(&env::var("CORS_ORIGINS").unwrap_or_default()),
            bootstrap_superadmin_email: non_empty_var("BOOTSTRAP_SUPERADMIN_EMAIL"),
            bootstrap_superadmin_password: non_empty_var("BOOTSTRAP_SUPERADMIN_PASSWORD"),
            dev_mode,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn random_secret() -> Vec<u8> {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key.to_vec()
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://localhost:5173, https://cursos.example.com/ ,"),
            vec!["http://localhost:5173", "https://cursos.example.com"]
        );
        assert!(parse_origins("").is_empty());
    }
}
