use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Service configuration, loaded from an optional file plus
/// `STOCKSCOPE__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub providers: ProviderSettings,
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub alphavantage_api_key: String,
    pub gemini_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSettings {
    pub daily_limit: u32,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("database.url", "postgres://localhost/stockscope")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("providers.alphavantage_api_key", "")?
            .set_default("providers.gemini_api_key", "")?
            .set_default("analysis.daily_limit", 10_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        builder
            .add_source(Environment::with_prefix("STOCKSCOPE").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.analysis.daily_limit, 10);
        assert_eq!(settings.database.max_connections, 5);
    }

    #[test]
    fn test_bind_addr() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
    }
}
