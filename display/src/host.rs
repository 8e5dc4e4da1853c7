use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use tempviz_common::{
    Band, BatteryGauge, LightSensor, LinkInfo, MetricsTransport, Radio, RadioError, RadioStatus,
    RuntimeConfig, Screen, System, TransportError, TransportResponse, Visualizer,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = RuntimeConfig::default();
    config.secrets.ssid = std::env::var("WIFI_SSID").unwrap_or_else(|_| "simulated".to_string());
    config.secrets.password = std::env::var("WIFI_PASS").unwrap_or_default();
    if let Ok(host) = std::env::var("INFLUX_HOST") {
        config.secrets.influx_host = host;
    }
    if let Ok(interval) = std::env::var("POLL_INTERVAL_S") {
        config.poll.poll_interval_s = interval
            .parse()
            .context("POLL_INTERVAL_S must be a number of seconds")?;
    }
    config.sanitize();

    info!("display loop starting against {}", config.secrets.query_url());

    let mut viz = Visualizer::new(
        config,
        SimRadio::default(),
        SimStore::default(),
        TermScreen,
        SimLight::default(),
        HostSystem,
    );
    viz.set_battery_gauge(Box::new(SimGauge));

    let render_loop = tokio::task::spawn_blocking(move || viz.run());

    tokio::select! {
        result = render_loop => {
            result.context("render loop panicked")??;
            warn!("restart requested; exiting so the supervisor can relaunch");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}

#[derive(Default)]
struct SimRadio {
    connected: bool,
}

impl Radio for SimRadio {
    fn status(&mut self) -> RadioStatus {
        if self.connected {
            RadioStatus::Connected
        } else {
            RadioStatus::Idle
        }
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn join(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        info!("simulated association with `{ssid}`");
        self.connected = true;
        Ok(())
    }

    fn firmware_version(&mut self) -> String {
        "sim-1.0".to_string()
    }

    fn mac(&mut self) -> [u8; 6] {
        [0x02, 0x00, 0x00, 0x00, 0x00, 0x01]
    }

    fn link_info(&mut self) -> LinkInfo {
        LinkInfo {
            ssid: "simulated".to_string(),
            rssi: -48,
            ip: "127.0.0.1".to_string(),
        }
    }
}

/// Hardware integration point: the ESP target replaces this with the
/// EspHttpConnection-backed transport talking to the real metrics store.
#[derive(Default)]
struct SimStore {
    tick: u64,
}

impl MetricsTransport for SimStore {
    fn post(&mut self, url: &str, body: &str) -> Result<TransportResponse, TransportError> {
        debug!("POST {url}");

        if !body.is_empty() {
            info!("write accepted: {}", body.trim_end());
            return Ok(TransportResponse::new("{}"));
        }

        self.tick = self.tick.wrapping_add(1);
        let temperature_f = 55.0 + ((self.tick % 40) as f64) * 0.7;
        let envelope = serde_json::json!({
            "results": [{"series": [{"values": [[0, temperature_f]]}]}]
        });
        Ok(TransportResponse::new(envelope.to_string()))
    }
}

struct TermScreen;

impl Screen for TermScreen {
    fn render(&mut self, band: Band, text: &str) {
        let style = band.style();
        info!(
            "screen: `{text}` on {} (bg #{:06X}, scale {})",
            band.as_str(),
            style.background.0,
            style.scale
        );
    }

    fn set_backlight(&mut self, brightness: f32) {
        debug!("backlight {brightness:.2}");
    }
}

#[derive(Default)]
struct SimLight {
    tick: u64,
}

impl LightSensor for SimLight {
    fn read(&mut self) -> u16 {
        self.tick = self.tick.wrapping_add(1);
        // Sweeps across the brightness tier thresholds.
        ((self.tick % 12) * 600) as u16
    }
}

struct HostSystem;

impl System for HostSystem {
    fn sleep(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }

    fn restart(&mut self) {
        warn!("device restart requested");
    }
}

struct SimGauge;

impl BatteryGauge for SimGauge {
    fn cell_voltage(&mut self) -> Option<f32> {
        Some(3.91)
    }
}
