//! Counters exported through the `metrics` facade when the `metrics`
//! feature is enabled. Without it every function compiles to nothing.

#[cfg(feature = "metrics")]
pub(crate) fn record_admission(outcome: &'static str) {
    metrics::counter!("walkin_queue_admissions_total", "outcome" => outcome).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline(always)]
pub(crate) fn record_admission(_outcome: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn record_progression(action: &'static str) {
    metrics::counter!("walkin_queue_progressions_total", "action" => action).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline(always)]
pub(crate) fn record_progression(_action: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn record_lookup(outcome: &'static str) {
    metrics::counter!("walkin_queue_lookups_total", "outcome" => outcome).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline(always)]
pub(crate) fn record_lookup(_outcome: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn record_rate_limited(route: &'static str) {
    metrics::counter!("walkin_queue_rate_limited_total", "route" => route).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline(always)]
pub(crate) fn record_rate_limited(_route: &'static str) {}
