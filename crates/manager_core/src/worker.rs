use std::fmt;

use serde::Deserialize;

/// Declaration of the single managed worker container.
///
/// Built once at start-up. The controller never caches a container id from
/// it: every lifecycle operation looks the container up again by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSpec {
    pub name: String,
    pub image: String,
    /// Port the worker listens on inside the container.
    pub container_port: u16,
    /// Port published on the host.
    pub host_port: u16,
    /// Host interface the published port is bound to.
    pub bind_address: String,
    pub memory_limit_mb: u64,
}

impl Default for WorkerSpec {
    fn default() -> Self {
        Self {
            name: "engine-worker".to_string(),
            image: "engine-care-worker".to_string(),
            container_port: 8000,
            host_port: 8001,
            bind_address: "127.0.0.1".to_string(),
            memory_limit_mb: 4096,
        }
    }
}

impl WorkerSpec {
    /// Docker-style `port/proto` key for the container side of the mapping.
    pub fn container_port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }

    pub fn memory_limit_bytes(&self) -> i64 {
        (self.memory_limit_mb.saturating_mul(1024 * 1024)).min(i64::MAX as u64) as i64
    }

    /// Address the manager dials to reach the published port.
    pub fn endpoint(&self) -> Endpoint {
        let host = match self.bind_address.as_str() {
            "" | "0.0.0.0" => "127.0.0.1",
            "::" => "[::1]",
            other => other,
        };
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        Endpoint::new(format!("http://{}:{}", host, self.host_port))
    }
}

/// Base URL of a reachable worker, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    base_url: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a request path and optional raw query onto the base URL.
    /// The query is passed through exactly as received.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = String::with_capacity(self.base_url.len() + path.len() + 16);
        url.push_str(&self.base_url);
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    pub fn health_url(&self) -> String {
        self.url_for("/", None)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_engine_worker() {
        let spec = WorkerSpec::default();
        assert_eq!(spec.name, "engine-worker");
        assert_eq!(spec.image, "engine-care-worker");
        assert_eq!(spec.container_port_key(), "8000/tcp");
        assert_eq!(spec.memory_limit_bytes(), 4 * 1024 * 1024 * 1024);
    }

    #[test]
    fn wildcard_bind_dials_loopback() {
        let spec = WorkerSpec {
            bind_address: "0.0.0.0".to_string(),
            ..WorkerSpec::default()
        };
        assert_eq!(spec.endpoint().base_url(), "http://127.0.0.1:8001");
    }

    #[test]
    fn ipv6_bind_is_bracketed() {
        let spec = WorkerSpec {
            bind_address: "::1".to_string(),
            host_port: 9001,
            ..WorkerSpec::default()
        };
        assert_eq!(spec.endpoint().base_url(), "http://[::1]:9001");
    }

    #[test]
    fn url_for_keeps_query_verbatim() {
        let endpoint = Endpoint::new("http://127.0.0.1:8001/");
        assert_eq!(
            endpoint.url_for("/predict", Some("unit=3&mode=a%20b")),
            "http://127.0.0.1:8001/predict?unit=3&mode=a%20b"
        );
        assert_eq!(endpoint.url_for("/predict", Some("")), "http://127.0.0.1:8001/predict");
        assert_eq!(endpoint.health_url(), "http://127.0.0.1:8001/");
    }
}
