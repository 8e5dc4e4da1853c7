use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use display_interface_spi::SPIInterfaceNoCS;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_9X15_BOLD},
        MonoTextStyle,
    },
    pixelcolor::Rgb565,
    prelude::*,
    text::{Baseline, Text},
};
use embedded_svc::{
    http::{client::Client as HttpClient, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::FreeRtos,
    gpio::{AnyIOPin, Gpio18, Gpio23, Gpio27, Gpio32, Gpio33, Gpio34, Gpio5, Output, PinDriver},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, CHANNEL0, TIMER0},
    spi::{SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig, SPI2},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    io::EspIOError,
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use mipidsi::{Builder, ColorInversion, Orientation};

use tempviz_common::{
    Band, LightSensor, LinkInfo, MetricsTransport, Radio, RadioError, RadioStatus, Rgb,
    RuntimeConfig, Screen, System, TransportError, TransportResponse, Visualizer,
};

const NVS_NAMESPACE: &str = "tempviz";
const NVS_CONFIG_KEY: &str = "runtime_json";

const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SPI_BAUDRATE_MHZ: u32 = 26;

// Label placement on the 320x240 panel.
const TEXT_POSITION: Point = Point::new(30, 110);

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut config =
        load_runtime_config(&nvs_partition).context("configuration provider unavailable")?;
    ensure_wifi_defaults(&mut config);
    if config.secrets.ssid.is_empty() {
        bail!("no wifi credentials configured");
    }
    config.sanitize();

    let Peripherals {
        modem,
        pins,
        spi2,
        ledc,
        adc1,
        ..
    } = Peripherals::take()?;

    let radio = EspRadio::new(modem, sys_loop, nvs_partition)?;
    let transport = EspTransport::new()?;
    let screen = PanelScreen::new(
        spi2,
        pins.gpio18,
        pins.gpio23,
        pins.gpio5,
        pins.gpio27,
        pins.gpio33,
        ledc.timer0,
        ledc.channel0,
        pins.gpio32,
    )
    .context("failed to bring up the panel")?;
    let light =
        AmbientLight::new(adc1, pins.gpio34).context("failed to bring up the light sensor")?;
    let system = EspSystem {
        power_save: config.poll.power_save,
    };

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let mut viz = Visualizer::new(config, radio, transport, screen, light, system);
    // The fuel gauge footprint is currently unpopulated; no battery gauge is
    // registered until it returns.

    viz.run().map_err(|err| anyhow!("radio driver fault: {err}"))?;

    // Only reached if the restart request raced a driver teardown.
    Ok(())
}

struct EspRadio {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl EspRadio {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;
        Ok(Self { wifi })
    }

    fn started(&self) -> bool {
        self.wifi.is_started().unwrap_or(false)
    }
}

impl Radio for EspRadio {
    fn status(&mut self) -> RadioStatus {
        match self.wifi.is_connected() {
            Ok(true) => RadioStatus::Connected,
            Ok(false) => RadioStatus::Idle,
            Err(err) => RadioStatus::Unknown(err.code() as u8),
        }
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        let configuration = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::Fatal("wifi ssid too long".to_string()))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::Fatal("wifi password too long".to_string()))?,
            auth_method,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&configuration)
            .map_err(fatal_radio)?;

        if !self.started() {
            self.wifi.start().map_err(fatal_radio)?;
        } else {
            // Clear any half-open association left by a failed attempt.
            let _ = self.wifi.disconnect();
        }

        self.wifi.connect().map_err(transient_radio)?;
        self.wifi.wait_netif_up().map_err(transient_radio)?;
        Ok(())
    }

    fn firmware_version(&mut self) -> String {
        let version = unsafe { std::ffi::CStr::from_ptr(esp_idf_svc::sys::esp_get_idf_version()) };
        version.to_string_lossy().into_owned()
    }

    fn mac(&mut self) -> [u8; 6] {
        self.wifi.wifi().sta_netif().get_mac().unwrap_or_default()
    }

    fn link_info(&mut self) -> LinkInfo {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        let (ssid, rssi) = if rc == esp_idf_svc::sys::ESP_OK {
            let len = ap_info
                .ssid
                .iter()
                .position(|b| *b == 0)
                .unwrap_or(ap_info.ssid.len());
            (
                String::from_utf8_lossy(&ap_info.ssid[..len]).into_owned(),
                ap_info.rssi as i8,
            )
        } else {
            (String::new(), 0)
        };

        let ip = self
            .wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map(|netif| netif.ip.to_string())
            .unwrap_or_default();

        LinkInfo { ssid, rssi, ip }
    }
}

fn fatal_radio(err: esp_idf_svc::sys::EspError) -> RadioError {
    RadioError::Fatal(format!("{err:?}"))
}

fn transient_radio(err: esp_idf_svc::sys::EspError) -> RadioError {
    RadioError::Transient(format!("{err:?}"))
}

struct EspTransport {
    client: HttpClient<EspHttpConnection>,
}

impl EspTransport {
    fn new() -> anyhow::Result<Self> {
        let configuration = HttpClientConfiguration {
            timeout: Some(HTTP_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        Ok(Self {
            client: HttpClient::wrap(EspHttpConnection::new(&configuration)?),
        })
    }
}

impl MetricsTransport for EspTransport {
    fn post(&mut self, url: &str, body: &str) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url, &[]).map_err(classify)?;
        if !body.is_empty() {
            request.write_all(body.as_bytes()).map_err(classify)?;
        }
        let mut response = request.submit().map_err(classify)?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(TransportError::Recoverable(format!("http status {status}")));
        }

        let mut raw = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = response.read(&mut chunk).map_err(classify)?;
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
        }
        // Dropping the response releases the connection buffers right away.
        drop(response);

        let body = String::from_utf8(raw)
            .map_err(|_| TransportError::Recoverable("response body is not utf-8".to_string()))?;
        Ok(TransportResponse::new(body))
    }
}

/// Decided once at the transport boundary: allocation failures inside the
/// HTTP stack have been observed to persist until a restart; everything else
/// heals by itself on a later cycle.
fn classify(err: EspIOError) -> TransportError {
    if err.0.code() == esp_idf_svc::sys::ESP_ERR_NO_MEM {
        TransportError::Fatal(format!("{err:?}"))
    } else {
        TransportError::Recoverable(format!("{err:?}"))
    }
}

type PanelTarget = mipidsi::Display<
    SPIInterfaceNoCS<SpiDeviceDriver<'static, SpiDriver<'static>>, PinDriver<'static, Gpio27, Output>>,
    mipidsi::models::ST7789,
    PinDriver<'static, Gpio33, Output>,
>;

struct PanelScreen {
    panel: PanelTarget,
    backlight: LedcDriver<'static>,
    max_duty: u32,
}

impl PanelScreen {
    fn new(
        spi: SPI2,
        sclk: Gpio18,
        sdo: Gpio23,
        cs: Gpio5,
        dc: Gpio27,
        rst: Gpio33,
        timer: TIMER0,
        channel: CHANNEL0,
        backlight: Gpio32,
    ) -> anyhow::Result<Self> {
        let driver = SpiDriver::new(spi, sclk, sdo, None::<AnyIOPin>, &SpiDriverConfig::new())?;
        let device = SpiDeviceDriver::new(
            driver,
            Some(cs),
            &SpiConfig::new().baudrate(SPI_BAUDRATE_MHZ.MHz().into()),
        )?;

        let dc = PinDriver::output(dc)?;
        let rst = PinDriver::output(rst)?;
        let mut delay = FreeRtos;

        let panel = Builder::st7789(SPIInterfaceNoCS::new(device, dc))
            .with_display_size(240, 320)
            .with_orientation(Orientation::Landscape(false))
            .with_invert_colors(ColorInversion::Inverted)
            .init(&mut delay, Some(rst))
            .map_err(|err| anyhow!("panel init failed: {err:?}"))?;

        let timer = LedcTimerDriver::new(timer, &TimerConfig::default().frequency(1.kHz().into()))?;
        let mut backlight = LedcDriver::new(channel, timer, backlight)?;
        let max_duty = backlight.get_max_duty();
        backlight.set_duty(max_duty)?;

        Ok(Self {
            panel,
            backlight,
            max_duty,
        })
    }

    fn draw(&mut self, band: Band, text: &str) -> anyhow::Result<()> {
        let style = band.style();

        self.panel
            .clear(rgb565(style.background))
            .map_err(|err| anyhow!("background fill failed: {err:?}"))?;

        // The two text scales the bands use map onto the two label fonts.
        let font = if style.scale >= 3 {
            &FONT_10X20
        } else {
            &FONT_9X15_BOLD
        };
        Text::with_baseline(
            text,
            TEXT_POSITION,
            MonoTextStyle::new(font, rgb565(style.text)),
            Baseline::Middle,
        )
        .draw(&mut self.panel)
        .map_err(|err| anyhow!("label draw failed: {err:?}"))?;

        Ok(())
    }
}

impl Screen for PanelScreen {
    fn render(&mut self, band: Band, text: &str) {
        if let Err(err) = self.draw(band, text) {
            warn!("panel update failed: {err:#}");
        }
    }

    fn set_backlight(&mut self, brightness: f32) {
        let duty = (self.max_duty as f32 * brightness) as u32;
        if let Err(err) = self.backlight.set_duty(duty) {
            warn!("backlight update failed: {err:?}");
        }
    }
}

fn rgb565(color: Rgb) -> Rgb565 {
    Rgb565::new(color.r() >> 3, color.g() >> 2, color.b() >> 3)
}

struct AmbientLight {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
}

impl AmbientLight {
    fn new(adc1: ADC1, pin: Gpio34) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc1)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, pin, &config)?;
        Ok(Self { channel })
    }
}

impl LightSensor for AmbientLight {
    fn read(&mut self) -> u16 {
        match self.channel.read() {
            // Spread the 12-bit raw reading across the 16-bit sensor range.
            Ok(raw) => raw.saturating_mul(16),
            Err(err) => {
                warn!("light sensor read failed: {err:?}");
                0
            }
        }
    }
}

struct EspSystem {
    power_save: bool,
}

impl System for EspSystem {
    fn sleep(&mut self, interval: Duration) {
        if self.power_save {
            // Timer-alarm deep sleep; execution resumes through a reset, so
            // nothing after this line runs.
            info!("deep sleeping for {}s", interval.as_secs());
            unsafe { esp_idf_svc::sys::esp_deep_sleep(interval.as_micros() as u64) };
        }

        let deadline = Instant::now() + interval;
        loop {
            feed_watchdog();
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            thread::sleep(remaining.min(Duration::from_secs(1)));
        }
        feed_watchdog();
    }

    fn restart(&mut self) {
        warn!("restarting device");
        thread::sleep(Duration::from_millis(100));
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 2048];

    match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
        Some(raw) => serde_json::from_str::<RuntimeConfig>(raw)
            .context("stored configuration is invalid"),
        None => Ok(RuntimeConfig::default()),
    }
}

fn ensure_wifi_defaults(config: &mut RuntimeConfig) {
    if config.secrets.ssid.is_empty() {
        config.secrets.ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    }
    if config.secrets.password.is_empty() {
        config.secrets.password = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
