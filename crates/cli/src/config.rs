use serde::Deserialize;
use std::env;
use tenantshift_domain::datastore::DatastoreLocation;

#[derive(Debug, Deserialize, Clone)]
pub struct CliConfig {
    /// Control-plane database (attempts, organizations, audit).
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Shared multi-tenant datastore server.
    #[serde(default = "default_shared_uri")]
    pub shared_uri: String,
    #[serde(default = "default_shared_db_name")]
    pub shared_db_name: Option<String>,
    /// Prefix for derived dedicated database names.
    #[serde(default = "default_dedicated_db_prefix")]
    pub dedicated_db_prefix: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database_url() -> String {
    "postgres://localhost:5432/tenantshift".to_string()
}

fn default_shared_uri() -> String {
    "postgres://localhost:5432".to_string()
}

fn default_shared_db_name() -> Option<String> {
    Some("tenantshift".to_string())
}

fn default_dedicated_db_prefix() -> String {
    "tenant_".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .set_default("database_url", default_database_url())?
            .set_default("shared_uri", default_shared_uri())?
            .set_default("shared_db_name", "tenantshift")?
            .set_default("dedicated_db_prefix", default_dedicated_db_prefix())?
            .set_default("log_level", default_log_level())?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::Environment::with_prefix("TENANTSHIFT"))
            .build()?;

        s.try_deserialize()
    }

    pub fn shared_location(&self) -> DatastoreLocation {
        DatastoreLocation::new(self.shared_uri.clone(), self.shared_db_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_datastores() {
        let cfg = CliConfig {
            database_url: default_database_url(),
            shared_uri: default_shared_uri(),
            shared_db_name: default_shared_db_name(),
            dedicated_db_prefix: default_dedicated_db_prefix(),
            log_level: default_log_level(),
        };

        let shared = cfg.shared_location();
        assert_eq!(shared.uri, "postgres://localhost:5432");
        assert_eq!(shared.db_name.as_deref(), Some("tenantshift"));
        assert_eq!(cfg.dedicated_db_prefix, "tenant_");
    }
}
