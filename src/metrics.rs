use tracing::trace;

// Lightweight metrics helpers that stay safe without a recorder installed.
// These intentionally avoid pulling in metrics macros to keep deps stable.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "vendize.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn pipeline_stage(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "vendize.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "pipeline_stage_elapsed"
    );
}
