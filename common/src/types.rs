use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    Connected,
    Idle,
    Unknown(u8),
}

impl RadioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Idle => "IDLE",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Details of the current association, for logging after a join.
#[derive(Debug, Clone, Default)]
pub struct LinkInfo {
    pub ssid: String,
    pub rssi: i8,
    pub ip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered(i32),
    Skipped,
    RestartRequested,
}

/// Transport failures, classified once at the HTTP boundary. `Fatal` is the
/// class observed to survive retries and reconnects; it warrants a device
/// restart rather than another attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("fatal transport fault: {0}")]
    Fatal(String),
    #[error("transport error: {0}")]
    Recoverable(String),
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("association failed: {0}")]
    Transient(String),
    #[error("radio driver fault: {0}")]
    Fatal(String),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response envelope is missing {0}")]
    MissingValue(&'static str),
    #[error("aggregate value is not a number")]
    NotANumber,
}

pub fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_formats_with_zero_padding() {
        assert_eq!(
            format_mac([0xA4, 0x0F, 0x12, 0x00, 0xFF, 0x07]),
            "a4:0f:12:00:ff:07"
        );
    }

    #[test]
    fn status_labels() {
        assert_eq!(RadioStatus::Connected.as_str(), "CONNECTED");
        assert_eq!(RadioStatus::Idle.as_str(), "IDLE");
        assert_eq!(RadioStatus::Unknown(7).as_str(), "UNKNOWN");
    }
}
