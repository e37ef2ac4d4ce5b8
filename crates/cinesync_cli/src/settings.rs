//! Connection and engine settings from flags and environment.

use cinesync_engine::{
    catalog, ElasticsearchWriter, PostgresSource, RetryConfig, SyncConfig, SyncError, SyncResult,
};
use cinesync_state::FileStateStore;
use clap::Args;
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every command.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// PostgreSQL URL; overrides the discrete DB_* settings
    #[arg(global = true, long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// PostgreSQL host
    #[arg(global = true, long, env = "DB_HOST", default_value = "127.0.0.1")]
    pub db_host: String,

    /// PostgreSQL port
    #[arg(global = true, long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// PostgreSQL user
    #[arg(global = true, long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// PostgreSQL password
    #[arg(
        global = true,
        long,
        env = "DB_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub db_password: String,

    /// PostgreSQL database name
    #[arg(global = true, long, env = "DB_NAME", default_value = "movies_database")]
    pub db_name: String,

    /// Elasticsearch base URL
    #[arg(
        global = true,
        long,
        env = "ELASTICSEARCH_URL",
        default_value = "http://localhost:9200"
    )]
    pub elasticsearch_url: String,

    /// Path of the cursor state file
    #[arg(
        global = true,
        long,
        env = "CINESYNC_STATE_FILE",
        default_value = "state/cinesync.json"
    )]
    pub state_file: PathBuf,

    /// Index of film documents
    #[arg(global = true, long, env = "CINESYNC_INDEX", default_value = catalog::MOVIES)]
    pub index: String,

    /// Index of genre documents
    #[arg(global = true, long, env = "CINESYNC_GENRE_INDEX", default_value = catalog::GENRES)]
    pub genre_index: String,

    /// Index of person documents
    #[arg(global = true, long, env = "CINESYNC_PERSON_INDEX", default_value = catalog::PERSONS)]
    pub person_index: String,

    /// Rows per batch for every stream
    #[arg(global = true, long, env = "CINESYNC_PAGE_SIZE", default_value_t = 100)]
    pub page_size: u32,

    /// Seconds to idle between sweeps
    #[arg(global = true, long, env = "CINESYNC_IDLE_SECS", default_value_t = 3)]
    pub idle_secs: u64,

    /// Timeout in seconds for a single database, index or state call
    #[arg(global = true, long, env = "CINESYNC_IO_TIMEOUT_SECS", default_value_t = 30)]
    pub io_timeout_secs: u64,
}

impl Settings {
    /// Builds the engine configuration for the film catalog.
    pub fn sync_config(&self) -> SyncResult<SyncConfig> {
        let config = SyncConfig::default()
            .with_index(catalog::FILM_WORKS, &self.index)
            .with_index(catalog::GENRE_INDEX, &self.genre_index)
            .with_index(catalog::PERSON_INDEX, &self.person_index)
            .with_batch_size(self.page_size)
            .with_idle_delay(Duration::from_secs(self.idle_secs))
            .with_io_timeout(Duration::from_secs(self.io_timeout_secs))
            .with_io_retry(RetryConfig::unbounded().with_jitter(true));
        config.validate()?;
        Ok(config)
    }

    /// Creates the PostgreSQL reader.
    pub fn source(&self) -> SyncResult<PostgresSource> {
        let timeout = Duration::from_secs(self.io_timeout_secs);
        match &self.database_url {
            Some(url) => PostgresSource::connect(url, timeout),
            None => Ok(PostgresSource::connect_with(self.pg_options(), timeout)),
        }
    }

    fn pg_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(&self.db_name)
    }

    /// Creates the Elasticsearch writer.
    pub fn writer(&self) -> SyncResult<ElasticsearchWriter> {
        ElasticsearchWriter::new(
            self.elasticsearch_url.as_str(),
            Duration::from_secs(self.io_timeout_secs),
        )
    }

    /// Opens the cursor state file, locking it for this process.
    pub fn state_store(&self) -> SyncResult<FileStateStore> {
        FileStateStore::open(&self.state_file).map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "cinesync",
            "--index",
            "films",
            "--person-index",
            "people",
            "--page-size",
            "25",
            "--idle-secs",
            "1",
            "--state-file",
            "/tmp/cursors.json",
        ])
        .unwrap();

        let config = cli.settings.sync_config().unwrap();
        assert_eq!(config.indexes(), vec!["films", "genres", "people"]);
        assert!(config.streams.iter().all(|s| s.batch_size == 25));
        assert_eq!(config.idle_delay, Duration::from_secs(1));
        assert_eq!(cli.settings.state_file, PathBuf::from("/tmp/cursors.json"));
    }

    #[test]
    fn zero_page_size_is_a_config_error() {
        let cli = TestCli::try_parse_from(["cinesync", "--page-size", "0"]).unwrap();
        assert!(matches!(
            cli.settings.sync_config(),
            Err(SyncError::Config(_))
        ));
    }
}
