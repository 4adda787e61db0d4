//! The exporter's metric set.
//!
//! All metrics live in one explicitly owned [`Registry`]. The collector
//! writes to it and the HTTP handler renders it; the metric vectors are
//! internally synchronised so both sides share it through an `Arc`.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use miflora_types::Parameter;

/// Errors building or rendering the metric set.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics registry error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Rendered metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Every metric the exporter publishes.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Failed read attempts, by probe address and plant.
    pub errors: IntCounterVec,
    pub battery: GaugeVec,
    pub conductivity: GaugeVec,
    /// Set to 1 for the firmware version each plant's probe reported.
    pub firmware_version: GaugeVec,
    pub light: GaugeVec,
    pub moisture: GaugeVec,
    pub temperature: GaugeVec,
}

impl Metrics {
    /// Create the metric set on a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let errors = IntCounterVec::new(
            Opts::new(
                "miflora_errors",
                "The number of errors encountered while attempting to gather information from the probes",
            ),
            &["mac", "plant"],
        )?;
        let battery = plant_gauge("miflora_battery_level_pct", "The battery level of the probe")?;
        let conductivity = plant_gauge("miflora_conductivity", "Soil conductivity in µS/cm")?;
        let firmware_version = GaugeVec::new(
            Opts::new(
                "miflora_firmware_version",
                "A mapping of probes to their respective firmware versions",
            ),
            &["plant", "version"],
        )?;
        let light = plant_gauge("miflora_light", "The ambient light in lux")?;
        let moisture = plant_gauge("miflora_moisture", "Soil moisture in percent")?;
        let temperature = plant_gauge("miflora_temperature_c", "The ambient temperature")?;

        registry.register(Box::new(errors.clone()))?;
        for gauge in [
            &battery,
            &conductivity,
            &firmware_version,
            &light,
            &moisture,
            &temperature,
        ] {
            registry.register(Box::new(gauge.clone()))?;
        }

        Ok(Self {
            registry,
            errors,
            battery,
            conductivity,
            firmware_version,
            light,
            moisture,
            temperature,
        })
    }

    /// The gauge holding a sensor parameter.
    pub fn parameter_gauge(&self, parameter: Parameter) -> &GaugeVec {
        match parameter {
            Parameter::Conductivity => &self.conductivity,
            Parameter::Light => &self.light,
            Parameter::Moisture => &self.moisture,
            Parameter::Temperature => &self.temperature,
        }
    }

    /// Content type of [`Metrics::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render the current values in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::with_capacity(4096);
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn plant_gauge(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(Opts::new(name, help), &["plant"])
}
