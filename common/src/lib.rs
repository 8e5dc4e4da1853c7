pub mod backlight;
pub mod config;
pub mod metrics;
pub mod palette;
pub mod types;
pub mod visualizer;

pub use backlight::{brightness_for_light, clamp_brightness};
pub use config::{PollConfig, RuntimeConfig, Secrets};
pub use metrics::{battery_line, extract_temperature};
pub use palette::{Band, BandStyle, Rgb};
pub use types::{
    format_mac, CycleOutcome, LinkInfo, MetricsError, RadioError, RadioStatus, TransportError,
};
pub use visualizer::{
    BatteryGauge, LightSensor, MetricsTransport, Radio, Screen, System, TransportResponse,
    Visualizer,
};
