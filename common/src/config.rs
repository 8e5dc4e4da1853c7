use serde::{Deserialize, Serialize};

/// Contract with the secrets provider. Field names are the keys the
/// provider is expected to expose; absence of the provider itself is fatal
/// at startup and handled by the loading side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secrets {
    pub ssid: String,
    pub password: String,
    pub influx_scheme: String,
    pub influx_host: String,
    pub influx_port: u16,
    pub influx_query_path: String,
    pub influx_write_path: String,
    pub influx_database: String,
    pub sensor_location: String,
}

impl Default for Secrets {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            influx_scheme: "http".to_string(),
            influx_host: "192.168.1.230".to_string(),
            influx_port: 8090,
            influx_query_path: "/query".to_string(),
            influx_write_path: "/write".to_string(),
            influx_database: "sensors".to_string(),
            sensor_location: "outside".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub poll_interval_s: u64,
    /// Association attempts per cycle before giving up until the next one.
    /// `None` retries without bound.
    pub connect_retry_cap: Option<u32>,
    pub power_save: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 10,
            connect_retry_cap: None,
            power_save: false,
        }
    }
}

impl PollConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_s = self.poll_interval_s.clamp(1, 3600);
        if let Some(cap) = self.connect_retry_cap {
            self.connect_retry_cap = Some(cap.max(1));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub secrets: Secrets,
    #[serde(default)]
    pub poll: PollConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.secrets.sanitize();
        self.poll.sanitize();
    }
}

impl Secrets {
    pub fn sanitize(&mut self) {
        if self.influx_port == 0 {
            self.influx_port = 8090;
        }
        for path in [&mut self.influx_query_path, &mut self.influx_write_path] {
            if !path.starts_with('/') {
                path.insert(0, '/');
            }
        }
    }

    /// The fixed time-windowed aggregate issued every cycle.
    pub fn last_temperature_query(&self) -> String {
        format!(
            "SELECT LAST(temperature_f) FROM weather WHERE location='{}' AND time >= now() - 30m",
            self.sensor_location
        )
    }

    /// Fully-formed query URL, built once at startup.
    pub fn query_url(&self) -> String {
        format!(
            "{}://{}:{}{}?db={}&q={}",
            self.influx_scheme,
            self.influx_host,
            self.influx_port,
            self.influx_query_path,
            self.influx_database,
            urlencode(&self.last_temperature_query())
        )
    }

    /// Write endpoint for line-protocol points (battery reporting).
    pub fn write_url(&self) -> String {
        format!(
            "{}://{}:{}{}?db={}",
            self.influx_scheme,
            self.influx_host,
            self.influx_port,
            self.influx_write_path,
            self.influx_database
        )
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn urlencode(raw: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push(HEX[(byte >> 4) as usize] as char);
                encoded.push(HEX[(byte & 0x0F) as usize] as char);
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn query_url_is_fully_encoded() {
        let secrets = Secrets::default();

        let expected = concat!(
            "http://192.168.1.230:8090/query?db=sensors",
            "&q=SELECT%20LAST%28temperature_f%29%20FROM%20weather",
            "%20WHERE%20location%3D%27outside%27",
            "%20AND%20time%20%3E%3D%20now%28%29%20-%2030m",
        );
        assert_eq!(secrets.query_url(), expected);
    }

    #[test]
    fn write_url_targets_write_path() {
        let secrets = Secrets::default();

        assert_eq!(
            secrets.write_url(),
            "http://192.168.1.230:8090/write?db=sensors"
        );
    }

    #[test]
    fn query_embeds_configured_location() {
        let secrets = Secrets {
            sensor_location: "porch".to_string(),
            ..Secrets::default()
        };

        assert!(secrets.last_temperature_query().contains("location='porch'"));
    }

    #[test]
    fn sanitize_restores_usable_values() {
        let mut config = RuntimeConfig::default();
        config.secrets.influx_port = 0;
        config.secrets.influx_query_path = "query".to_string();
        config.poll.poll_interval_s = 0;
        config.poll.connect_retry_cap = Some(0);

        config.sanitize();

        assert_eq!(config.secrets.influx_port, 8090);
        assert_eq!(config.secrets.influx_query_path, "/query");
        assert_eq!(config.poll.poll_interval_s, 1);
        assert_eq!(config.poll.connect_retry_cap, Some(1));
    }
}
