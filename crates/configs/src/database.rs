use std::path::PathBuf;

/// `database` (§6): selects and configures the event-store/derived-store
/// backend. Both backends are driven through the same `EventStore`/
/// `DerivedStore` trait objects; this is purely a config-time choice.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum DatabaseConfig {
    Sqlite {
        /// Directory holding the SQLite database files (one per logical
        /// store). Created if it does not already exist.
        directory: PathBuf,
    },
    Postgres {
        /// Supports reading from an environment variable by prefixing the
        /// value with `%`, e.g. `%DATABASE_URL`.
        #[serde(
            rename = "connection-string",
            deserialize_with = "crate::deserialize_env::deserialize_url_from_env"
        )]
        connection_string: url::Url,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sqlite_variant() {
        let cfg: DatabaseConfig = toml::from_str(
            r#"
            kind = "sqlite"
            directory = "/var/lib/indexer"
            "#,
        )
        .unwrap();
        assert!(matches!(cfg, DatabaseConfig::Sqlite { directory } if directory == PathBuf::from("/var/lib/indexer")));
    }

    #[test]
    fn deserializes_postgres_variant() {
        let cfg: DatabaseConfig = toml::from_str(
            r#"
            kind = "postgres"
            connection-string = "postgresql://localhost/indexer"
            "#,
        )
        .unwrap();
        assert!(matches!(cfg, DatabaseConfig::Postgres { .. }));
    }

    #[test]
    fn rejects_unknown_field() {
        let result: Result<DatabaseConfig, _> = toml::from_str(
            r#"
            kind = "sqlite"
            directory = "/tmp"
            extra = true
            "#,
        );
        assert!(result.is_err());
    }
}
