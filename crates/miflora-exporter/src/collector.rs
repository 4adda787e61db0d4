//! Polling loop.
//!
//! The collector reads every registered probe in turn and publishes the
//! values on the shared [`Metrics`]. Probes are polled one after another:
//! a slow probe delays the rest of the cycle. A failing probe is logged and
//! counted in `miflora_errors` but stays in the rotation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use miflora_core::FloraProbe;
use miflora_types::Parameter;

use crate::config::PlantRegistry;
use crate::metrics::Metrics;

/// Default pause between polling cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(600);

/// A registered probe: its address, its plant and the client reading it.
#[derive(Debug)]
pub struct ProbeHandle<P> {
    address: String,
    plant: String,
    probe: P,
}

impl<P: FloraProbe> ProbeHandle<P> {
    pub fn new(address: impl Into<String>, plant: impl Into<String>, probe: P) -> Self {
        Self {
            address: address.into(),
            plant: plant.into(),
            probe,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn plant(&self) -> &str {
        &self.plant
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

/// A failed read from a single probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeReadError {
    #[error("Failed to read firmware version: {0}")]
    Firmware(#[source] miflora_core::Error),
    #[error("Failed to read battery level: {0}")]
    Battery(#[source] miflora_core::Error),
    #[error("Failed to read {parameter}: {source}")]
    Parameter {
        parameter: Parameter,
        #[source]
        source: miflora_core::Error,
    },
}

/// Polls the registered probes and updates the metric set.
pub struct Collector<P> {
    probes: Vec<ProbeHandle<P>>,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl<P: FloraProbe> Collector<P> {
    /// Create a collector over probes in polling order.
    pub fn new(probes: Vec<ProbeHandle<P>>, metrics: Arc<Metrics>) -> Self {
        Self {
            probes,
            metrics,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create a collector with one probe per registry entry, in file order.
    pub fn from_registry<F>(registry: &PlantRegistry, metrics: Arc<Metrics>, mut open: F) -> Self
    where
        F: FnMut(&str) -> P,
    {
        let probes = registry
            .iter()
            .map(|entry| ProbeHandle::new(&entry.address, &entry.plant, open(&entry.address)))
            .collect();
        Self::new(probes, metrics)
    }

    /// Set the pause between polling cycles.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn probes(&self) -> &[ProbeHandle<P>] {
        &self.probes
    }

    /// Read each probe's firmware version once.
    ///
    /// A probe whose firmware cannot be read is counted as an error and
    /// still polled in later cycles.
    pub async fn initialize(&self) {
        for handle in &self.probes {
            // expose a zero error count for every probe from the first scrape
            self.metrics
                .errors
                .with_label_values(&[handle.address.as_str(), handle.plant.as_str()]);

            match self.read_firmware(handle).await {
                Ok(version) => {
                    self.metrics
                        .firmware_version
                        .with_label_values(&[handle.plant.as_str(), version.as_str()])
                        .set(1.0);
                }
                Err(e) => self.record_error(handle, &e),
            }

            info!(
                "initialized plant \"{}\" with probe MAC {}",
                handle.plant, handle.address
            );
        }
    }

    /// Poll every probe once, in order.
    pub async fn poll_cycle(&self) {
        for handle in &self.probes {
            match self.poll_probe(handle).await {
                Ok(()) => debug!("Polled {} ({})", handle.address, handle.plant),
                Err(e) => self.record_error(handle, &e),
            }
        }
    }

    /// Initialize, then poll forever, pausing between cycles.
    ///
    /// Returns once `cancel` fires. Cancellation is observed between cycles
    /// and during the pause, never in the middle of a cycle.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting collector for {} probe(s), interval {}s",
            self.probes.len(),
            self.interval.as_secs()
        );
        self.initialize().await;

        while !cancel.is_cancelled() {
            self.poll_cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("Collector stopped");
    }

    async fn read_firmware(&self, handle: &ProbeHandle<P>) -> Result<String, ProbeReadError> {
        handle
            .probe
            .firmware_version()
            .await
            .map_err(ProbeReadError::Firmware)
    }

    /// Read battery and then each parameter, setting gauges as values arrive.
    ///
    /// The first failure ends the probe's turn; gauges set before it keep
    /// their new values.
    async fn poll_probe(&self, handle: &ProbeHandle<P>) -> Result<(), ProbeReadError> {
        let plant = handle.plant.as_str();

        let battery = handle
            .probe
            .battery_level()
            .await
            .map_err(ProbeReadError::Battery)?;
        self.metrics
            .battery
            .with_label_values(&[plant])
            .set(f64::from(battery));

        for parameter in Parameter::ALL {
            let value = handle
                .probe
                .parameter_value(parameter)
                .await
                .map_err(|source| ProbeReadError::Parameter { parameter, source })?;
            self.metrics
                .parameter_gauge(parameter)
                .with_label_values(&[plant])
                .set(value);
        }

        Ok(())
    }

    fn record_error(&self, handle: &ProbeHandle<P>, err: &ProbeReadError) {
        self.metrics
            .errors
            .with_label_values(&[handle.address.as_str(), handle.plant.as_str()])
            .inc();
        error!(
            mac = %handle.address,
            plant = %handle.plant,
            "could not read probe {} ({}): {}",
            handle.address,
            handle.plant,
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miflora_core::{MockOperation, MockProbe, MockProbeBuilder};

    const BASIL: &str = "AA:BB:CC:DD:EE:01";
    const MINT: &str = "AA:BB:CC:DD:EE:02";

    fn basil_probe() -> MockProbe {
        MockProbeBuilder::new()
            .address(BASIL)
            .firmware("3.2.1")
            .battery(42)
            .conductivity(350)
            .light(1200)
            .moisture(30)
            .temperature(21.5)
            .build()
    }

    fn collector(probes: Vec<(&str, &str, MockProbe)>) -> (Collector<MockProbe>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let handles = probes
            .into_iter()
            .map(|(address, plant, probe)| ProbeHandle::new(address, plant, probe))
            .collect();
        (Collector::new(handles, Arc::clone(&metrics)), metrics)
    }

    fn errors(metrics: &Metrics, mac: &str, plant: &str) -> u64 {
        metrics.errors.with_label_values(&[mac, plant]).get()
    }

    fn gauge(vec: &prometheus::GaugeVec, plant: &str) -> f64 {
        vec.with_label_values(&[plant]).get()
    }

    #[tokio::test]
    async fn test_end_to_end_basil() {
        let registry = PlantRegistry::from_json_str(r#"{"AA:BB:CC:DD:EE:01": "basil"}"#).unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let collector = Collector::from_registry(&registry, Arc::clone(&metrics), |_| basil_probe());

        collector.initialize().await;
        assert_eq!(
            metrics
                .firmware_version
                .with_label_values(&["basil", "3.2.1"])
                .get(),
            1.0
        );

        collector.poll_cycle().await;
        assert_eq!(gauge(&metrics.battery, "basil"), 42.0);
        assert_eq!(gauge(&metrics.conductivity, "basil"), 350.0);
        assert_eq!(gauge(&metrics.light, "basil"), 1200.0);
        assert_eq!(gauge(&metrics.moisture, "basil"), 30.0);
        assert_eq!(gauge(&metrics.temperature, "basil"), 21.5);
        assert_eq!(errors(&metrics, BASIL, "basil"), 0);

        let output = metrics.render().unwrap();
        assert!(output.contains("miflora_battery_level_pct{plant=\"basil\"} 42"));
        assert!(output.contains("miflora_temperature_c{plant=\"basil\"} 21.5"));
        assert!(output.contains("miflora_errors{mac=\"AA:BB:CC:DD:EE:01\",plant=\"basil\"} 0"));
    }

    #[tokio::test]
    async fn test_successful_cycle_leaves_error_counter_unchanged() {
        let (collector, metrics) = collector(vec![(BASIL, "basil", basil_probe())]);
        collector.initialize().await;
        collector.poll_cycle().await;
        collector.poll_cycle().await;

        assert_eq!(errors(&metrics, BASIL, "basil"), 0);
        // firmware once, then battery plus four parameters per cycle
        assert_eq!(collector.probes()[0].probe().read_count(), 11);
    }

    #[tokio::test]
    async fn test_failed_read_skips_rest_of_probe() {
        let (collector, metrics) = collector(vec![(BASIL, "basil", basil_probe())]);
        collector.initialize().await;
        collector.poll_cycle().await;

        let probe = collector.probes()[0].probe();
        probe.set_battery(17).await;
        probe
            .set_data(miflora_types::SensorData {
                temperature: 5.0,
                light: 1,
                moisture: 1,
                conductivity: 1,
                captured_at: None,
            })
            .await;
        probe
            .set_failing(MockOperation::Parameter(Parameter::Conductivity), true)
            .await;
        let reads_before = probe.read_count();

        collector.poll_cycle().await;

        assert_eq!(gauge(&metrics.battery, "basil"), 17.0);
        assert_eq!(gauge(&metrics.conductivity, "basil"), 350.0);
        assert_eq!(gauge(&metrics.light, "basil"), 1200.0);
        assert_eq!(gauge(&metrics.moisture, "basil"), 30.0);
        assert_eq!(gauge(&metrics.temperature, "basil"), 21.5);
        assert_eq!(errors(&metrics, BASIL, "basil"), 1);
        // battery and the failing conductivity read only
        assert_eq!(probe.read_count() - reads_before, 2);
    }

    #[tokio::test]
    async fn test_failing_probe_does_not_stop_others() {
        let broken = MockProbeBuilder::new()
            .address(BASIL)
            .failing(MockOperation::Battery)
            .build();
        let healthy = MockProbeBuilder::new().address(MINT).moisture(61).build();
        let (collector, metrics) = collector(vec![(BASIL, "basil", broken), (MINT, "mint", healthy)]);

        collector.initialize().await;
        collector.poll_cycle().await;

        assert_eq!(errors(&metrics, BASIL, "basil"), 1);
        assert_eq!(errors(&metrics, MINT, "mint"), 0);
        assert_eq!(gauge(&metrics.moisture, "mint"), 61.0);
        assert!(!metrics.render().unwrap().contains("miflora_battery_level_pct{plant=\"basil\"}"));
    }

    #[tokio::test]
    async fn test_firmware_failure_keeps_probe_in_rotation() {
        let probe = MockProbeBuilder::new()
            .address(BASIL)
            .battery(80)
            .failing(MockOperation::Firmware)
            .build();
        let (collector, metrics) = collector(vec![(BASIL, "basil", probe)]);

        collector.initialize().await;
        assert_eq!(errors(&metrics, BASIL, "basil"), 1);
        assert!(!metrics.render().unwrap().contains("miflora_firmware_version"));

        collector.poll_cycle().await;
        assert_eq!(gauge(&metrics.battery, "basil"), 80.0);
        assert_eq!(errors(&metrics, BASIL, "basil"), 1);
    }

    #[tokio::test]
    async fn test_errors_count_once_per_cycle() {
        let probe = MockProbeBuilder::new().address(BASIL).build();
        let (collector, metrics) = collector(vec![(BASIL, "basil", probe)]);
        collector.probes()[0]
            .probe()
            .set_should_fail(true, Some("probe out of range"))
            .await;

        collector.initialize().await;
        collector.poll_cycle().await;
        collector.poll_cycle().await;

        assert_eq!(errors(&metrics, BASIL, "basil"), 3);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let (collector, metrics) = collector(Vec::new());
        collector.initialize().await;
        collector.poll_cycle().await;
        assert_eq!(metrics.render().unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_each_interval_until_cancelled() {
        let (collector, _metrics) = collector(vec![(BASIL, "basil", basil_probe())]);
        let collector = collector.with_interval(Duration::from_secs(600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1500)).await;
            trigger.cancel();
        });

        collector.run(cancel).await;

        // cycles at 0s, 600s and 1200s
        assert_eq!(collector.probes()[0].probe().read_count(), 1 + 3 * 5);
    }

    #[tokio::test]
    async fn test_run_with_cancelled_token_only_initializes() {
        let (collector, metrics) = collector(vec![(BASIL, "basil", basil_probe())]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        collector.run(cancel).await;

        assert_eq!(collector.probes()[0].probe().read_count(), 1);
        assert_eq!(
            metrics
                .firmware_version
                .with_label_values(&["basil", "3.2.1"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_probe_read_error_display() {
        let err = ProbeReadError::Parameter {
            parameter: Parameter::Light,
            source: miflora_core::Error::InvalidData("no data".to_string()),
        };
        assert!(err.to_string().contains("light"));
        assert!(err.to_string().contains("no data"));
    }
}
