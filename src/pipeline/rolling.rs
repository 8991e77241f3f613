use crate::config::RollingFeature;

/// Computes the trailing rolling feature for one customer's volume series.
///
/// The value at position `k` aggregates up to `window` periods strictly
/// before `k` (fewer near the start, minimum one), so the current period
/// never contributes to its own feature. Position `0` has no history and is
/// defined as `0`.
///
/// Runs on the full active series, before term trimming: the window may
/// reach back across term boundaries, giving early periods of a term the
/// benefit of prior history.
pub(crate) fn compute(volumes: &[f64], feature: &RollingFeature) -> Vec<f64> {
    let window = feature.window();
    let mut out = Vec::with_capacity(volumes.len());

    for k in 0..volumes.len() {
        let trailing_mean = if k == 0 {
            0.0
        } else {
            let history = &volumes[k.saturating_sub(window)..k];
            history.iter().sum::<f64>() / history.len() as f64
        };
        let value = match feature {
            RollingFeature::TrailingMean { .. } => trailing_mean,
            RollingFeature::DeviationFromTrend { .. } => volumes[k] - trailing_mean,
        };
        out.push(value);
    }
    out
}
