//! Prometheus exposition for `--metrics`
//!
//! Installs the recorder the client's counters report into; the rendered
//! text is printed to stderr when the command finishes.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
