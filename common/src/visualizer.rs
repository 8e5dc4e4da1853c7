use std::time::Duration;

use log::{info, warn};

use crate::backlight::{brightness_for_light, clamp_brightness};
use crate::config::RuntimeConfig;
use crate::metrics::{battery_line, extract_temperature};
use crate::palette::Band;
use crate::types::{format_mac, CycleOutcome, LinkInfo, RadioError, RadioStatus, TransportError};

/// Response handed back by the transport. The body is kept whole; the
/// emptiness predicate is explicit because a zero-length body is a distinct
/// failure class, not a parse problem.
#[derive(Debug)]
pub struct TransportResponse {
    body: String,
}

impl TransportResponse {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

pub trait Radio {
    fn status(&mut self) -> RadioStatus;
    fn is_connected(&mut self) -> bool;
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;
    fn firmware_version(&mut self) -> String;
    fn mac(&mut self) -> [u8; 6];
    fn link_info(&mut self) -> LinkInfo;
}

pub trait MetricsTransport {
    fn post(&mut self, url: &str, body: &str) -> Result<TransportResponse, TransportError>;
}

pub trait Screen {
    /// Replaces the current background with the band's and overwrites the
    /// label. Exactly one background layer is present afterwards.
    fn render(&mut self, band: Band, text: &str);
    fn set_backlight(&mut self, brightness: f32);
}

pub trait LightSensor {
    fn read(&mut self) -> u16;
}

pub trait BatteryGauge {
    fn cell_voltage(&mut self) -> Option<f32>;
}

pub trait System {
    fn sleep(&mut self, interval: Duration);
    /// Requests a full device restart. On hardware this does not return;
    /// test substitutes just record the request.
    fn restart(&mut self);
}

/// The poll-render loop: one light read, one connectivity check, one query,
/// one render per cycle, everything blocking on the single thread.
pub struct Visualizer<R, T, S, L, Y> {
    radio: R,
    transport: T,
    screen: S,
    light: L,
    system: Y,
    battery: Option<Box<dyn BatteryGauge + Send>>,
    config: RuntimeConfig,
    query_url: String,
    write_url: String,
}

impl<R, T, S, L, Y> Visualizer<R, T, S, L, Y>
where
    R: Radio,
    T: MetricsTransport,
    S: Screen,
    L: LightSensor,
    Y: System,
{
    pub fn new(config: RuntimeConfig, radio: R, transport: T, screen: S, light: L, system: Y) -> Self {
        let query_url = config.secrets.query_url();
        let write_url = config.secrets.write_url();
        Self {
            radio,
            transport,
            screen,
            light,
            system,
            battery: None,
            config,
            query_url,
            write_url,
        }
    }

    pub fn set_battery_gauge(&mut self, gauge: Box<dyn BatteryGauge + Send>) {
        self.battery = Some(gauge);
    }

    /// Runs cycles until a restart is requested or the radio driver faults.
    pub fn run(&mut self) -> Result<(), RadioError> {
        self.ensure_connected()?;
        loop {
            if self.run_cycle()? == CycleOutcome::RestartRequested {
                return Ok(());
            }
        }
    }

    pub fn run_cycle(&mut self) -> Result<CycleOutcome, RadioError> {
        self.update_backlight();

        if !self.radio.is_connected() {
            self.ensure_connected()?;
        }

        let response = match self.transport.post(&self.query_url, "") {
            Ok(response) => response,
            Err(TransportError::Fatal(err)) => {
                warn!("query hit a fatal transport fault, restarting: {err}");
                self.system.restart();
                return Ok(CycleOutcome::RestartRequested);
            }
            Err(TransportError::Recoverable(err)) => {
                warn!("query failed: {err}");
                return Ok(self.skip_cycle());
            }
        };

        // A zero-length body means the connection is stuck; it has never
        // been observed to heal without a restart.
        if response.is_empty() {
            warn!("query response had zero length, restarting");
            self.system.restart();
            return Ok(CycleOutcome::RestartRequested);
        }

        let temperature = match extract_temperature(response.body()) {
            Ok(temperature) => temperature,
            Err(err) => {
                warn!("query response unusable: {err}");
                return Ok(self.skip_cycle());
            }
        };

        let band = Band::for_temperature(temperature);
        self.screen.render(band, &temperature.to_string());
        info!("rendered {temperature} on the {} band", band.as_str());

        self.report_battery();

        self.system.sleep(self.poll_interval());
        Ok(CycleOutcome::Rendered(temperature))
    }

    /// Idempotent when already associated. An idle radio is joined in a
    /// blocking loop that swallows transient errors; any other status is
    /// logged and left alone, letting the cycle fail downstream instead.
    pub fn ensure_connected(&mut self) -> Result<(), RadioError> {
        match self.radio.status() {
            RadioStatus::Connected => {
                info!("radio already connected");
                return Ok(());
            }
            RadioStatus::Idle => info!("radio idle, associating"),
            RadioStatus::Unknown(code) => {
                warn!("radio reported unknown status {code}");
                return Ok(());
            }
        }

        info!(
            "radio firmware {}, mac {}",
            self.radio.firmware_version(),
            format_mac(self.radio.mac())
        );

        let mut attempts = 0u32;
        while !self.radio.is_connected() {
            if let Some(cap) = self.config.poll.connect_retry_cap {
                if attempts >= cap {
                    warn!("association abandoned after {attempts} attempts");
                    return Ok(());
                }
            }
            attempts += 1;

            match self
                .radio
                .join(&self.config.secrets.ssid, &self.config.secrets.password)
            {
                Ok(()) => {}
                Err(RadioError::Transient(err)) => {
                    warn!("could not associate, retrying: {err}");
                }
                Err(err @ RadioError::Fatal(_)) => return Err(err),
            }
        }

        let link = self.radio.link_info();
        info!(
            "connected to `{}`, rssi {}, ip {}",
            link.ssid, link.rssi, link.ip
        );
        Ok(())
    }

    /// Light is sampled fresh every cycle and only ever drives brightness.
    fn update_backlight(&mut self) {
        let value = self.light.read();
        let brightness = clamp_brightness(brightness_for_light(value));
        self.screen.set_backlight(brightness);
    }

    /// Best effort: a dropped point never disturbs the render path.
    fn report_battery(&mut self) {
        let Some(gauge) = self.battery.as_mut() else {
            return;
        };
        let Some(voltage) = gauge.cell_voltage() else {
            return;
        };

        let line = battery_line(&self.config.secrets.sensor_location, voltage);
        if let Err(err) = self.transport.post(&self.write_url, &line) {
            warn!("battery point dropped: {err}");
        }
    }

    fn skip_cycle(&mut self) -> CycleOutcome {
        self.system.sleep(self.poll_interval());
        CycleOutcome::Skipped
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll.poll_interval_s)
    }
}
