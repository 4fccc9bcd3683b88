use serde::{Deserialize, Serialize};

/// Retry policy shared by every operation wrapper.
///
/// `max_attempts` bounds attempts against a single proxy; `max_rotations`
/// bounds full proxy cycles before a registration-mode controller abandons
/// the account. Farming-mode controllers ignore `max_rotations` and keep
/// cycling with `farming_wait_seconds` pauses until cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: u64,
    pub farming_wait_seconds: u64,
    pub proxy_rotation: bool,
    #[serde(default = "default_max_rotations")]
    pub max_rotations: u32,
}

fn default_max_rotations() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 5,
            farming_wait_seconds: 60,
            proxy_rotation: true,
            max_rotations: default_max_rotations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Full proxy URL with inline credentials, as accepted by reqwest.
    pub fn authority_url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                if let Some(rest) = self.url.split_once("://") {
                    format!("{}://{}:{}@{}", rest.0, u, p, rest.1)
                } else {
                    format!("http://{}:{}@{}", u, p, self.url)
                }
            }
            _ => self.url.clone(),
        }
    }

    /// Masked form for logs: scheme and a few host characters only.
    pub fn masked(&self) -> String {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let host = without_scheme
            .rsplit_once('@')
            .map(|(_, rest)| rest)
            .unwrap_or(without_scheme);
        let host = host.split(':').next().unwrap_or(host);
        // Char-wise so operator-supplied IDN hostnames never split a
        // multi-byte boundary.
        let chars: Vec<char> = host.chars().collect();
        if chars.len() > 6 {
            let head: String = chars[..3].iter().collect();
            let tail: String = chars[chars.len() - 3..].iter().collect();
            format!("{}***{}", head, tail)
        } else if chars.len() > 2 {
            format!("{}***", chars[..2].iter().collect::<String>())
        } else {
            "proxy***".to_string()
        }
    }
}

/// Inclusive random delay range applied before each worker starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self { min: 0, max: 0 }
    }
}
