use anyhow::{Result, anyhow};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// An authenticated HTTP proxy, written as `user:pass:host:port`.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub user: String,
    pub pass: String,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// Proxy URL without credentials; they are attached as basic auth.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

// Keep passwords out of logs.
impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:***@{}:{}", self.user, self.host, self.port)
    }
}

impl FromStr for ProxyEndpoint {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        let [user, pass, host, port] = parts.as_slice() else {
            return Err(anyhow!(
                "expected user:pass:host:port, got {} fields",
                parts.len()
            ));
        };
        if host.is_empty() {
            return Err(anyhow!("proxy host is empty"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| anyhow!("invalid proxy port '{}': {}", port, e))?;
        Ok(Self {
            user: user.to_string(),
            pass: pass.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// Read-only proxy list; account `i` uses entry `i % len`.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<ProxyEndpoint>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        Self { proxies }
    }

    pub fn parse(content: &str) -> Self {
        let mut proxies = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ProxyEndpoint>() {
                Ok(p) => proxies.push(p),
                Err(e) => warn!("Skipping proxy on line {}: {}", n + 1, e),
            }
        }
        Self::new(proxies)
    }

    /// A missing or unreadable file means direct connections for every account.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let pool = Self::parse(&content);
                info!("Loaded {} proxies from {}", pool.len(), path.display());
                pool
            }
            Err(e) => {
                warn!(
                    "Error loading proxies from {}: {}. Using direct connections.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn for_index(&self, index: usize) -> Option<&ProxyEndpoint> {
        if self.proxies.is_empty() {
            return None;
        }
        self.proxies.get(index % self.proxies.len())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
