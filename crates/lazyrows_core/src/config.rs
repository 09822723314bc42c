use std::fmt::{self, Write};
use std::path::Path;

use serde::Deserialize;

/// Parameters for opening a connection to the data source.
///
/// Which fields matter is up to the connector. File backed connectors only
/// look at `database`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ConnectionConfig {
    /// Config pointing at a database with everything else defaulted.
    pub fn for_database(database: impl Into<String>) -> Self {
        ConnectionConfig {
            host: default_host(),
            port: None,
            user: None,
            password: None,
            database: database.into(),
        }
    }

    /// Load a config from a json file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Connection string for the given scheme, including the password.
    pub fn connection_string(&self, scheme: &str) -> String {
        self.render(scheme, self.password.as_deref())
    }

    fn render(&self, scheme: &str, password: Option<&str>) -> String {
        let mut conn_str = format!("{scheme}://");
        // Credentials
        if let Some(user) = &self.user {
            let _ = write!(&mut conn_str, "{user}");
            if let Some(password) = password {
                let _ = write!(&mut conn_str, ":{password}");
            }
            conn_str.push('@');
        }
        // Address
        let _ = write!(&mut conn_str, "{}", self.host);
        if let Some(port) = self.port {
            let _ = write!(&mut conn_str, ":{port}");
        }
        // Database
        let _ = write!(&mut conn_str, "/{}", self.database);
        conn_str
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = self.password.as_ref().map(|_| "****");
        write!(f, "{}", self.render("db", redacted))
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .finish()
    }
}
