use tracing::trace;

// Trace-based counters; the Prometheus recorder in main only exposes what
// the exporter itself tracks.

pub fn inc_requests(route: &'static str) {
    trace!(target = "adcopy.metrics", route = route, "requests_total_inc");
}

pub fn region_elapsed(region: &str, source: &'static str, elapsed_ms: u128) {
    trace!(
        target = "adcopy.metrics",
        region = region,
        source = source,
        elapsed_ms = elapsed_ms as u64,
        "region_elapsed"
    );
}

pub fn region_fallback(region: &str, reason: &'static str) {
    trace!(
        target = "adcopy.metrics",
        region = region,
        reason = reason,
        "region_fallback_total_inc"
    );
}

pub fn run_finished(regions: usize, fallbacks: usize, elapsed_ms: u128) {
    trace!(
        target = "adcopy.metrics",
        regions = regions as u64,
        fallbacks = fallbacks as u64,
        elapsed_ms = elapsed_ms as u64,
        "run_finished"
    );
}
