use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("nameward.db")
    }

    #[must_use]
    pub fn trusted_token_path(&self) -> PathBuf {
        self.data_dir.join(".trusted_token")
    }

    /// Identity settings are read from here when no `--config` is given.
    #[must_use]
    pub fn default_identity_config_path(&self) -> PathBuf {
        self.data_dir.join("nameward.toml")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
        }
    }
}
