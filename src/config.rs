use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;
use serde::Deserialize;

use crate::model::ResourceSpec;

/// Server settings, read once from `RESERVO_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub directory_path: PathBuf,
    pub seed_path: Option<PathBuf>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }
        Self {
            bind: lookup("RESERVO_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "RESERVO_PORT").unwrap_or(5433),
            data_dir: lookup("RESERVO_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            directory_path: lookup("RESERVO_DIRECTORY")
                .unwrap_or_else(|| "./demo/directory.json".into())
                .into(),
            seed_path: lookup("RESERVO_SEED").map(PathBuf::from),
            max_connections: parsed(&lookup, "RESERVO_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&lookup, "RESERVO_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parsed(&lookup, "RESERVO_METRICS_PORT"),
            tls_cert: lookup("RESERVO_TLS_CERT"),
            tls_key: lookup("RESERVO_TLS_KEY"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservo.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn tls_acceptor(&self) -> io::Result<Option<TlsAcceptor>> {
        load_tls_acceptor(self.tls_cert.as_deref(), self.tls_key.as_deref())
    }
}

pub fn load_tls_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both RESERVO_TLS_CERT and RESERVO_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

#[derive(Deserialize)]
struct SeedFile {
    resources: Vec<ResourceSpec>,
}

/// Parse a catalog seed: `{ "resources": [ { name, type, capacity?, location, features? } ] }`.
pub fn parse_seed(json: &str) -> io::Result<Vec<ResourceSpec>> {
    serde_json::from_str::<SeedFile>(json)
        .map(|f| f.resources)
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

pub fn load_seed(path: &Path) -> io::Result<Vec<ResourceSpec>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| io::Error::new(e.kind(), format!("reading seed {}: {e}", path.display())))?;
    parse_seed(&json)
}
