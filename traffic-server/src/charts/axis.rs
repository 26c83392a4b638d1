//! "Nice" vertical axis scaling: ticks land on 1, 2, 5 or 10 times a power of ten.

const STEP_MULTIPLIERS: [f64; 4] = [1.0, 2.0, 5.0, 10.0];

/// Returns `(nice_max, ticks)` where `ticks` runs from `0` to `nice_max` in
/// equal steps. Tries to stay within `target_ticks` intervals; when no step
/// fits, the coarsest step is used and the budget may be exceeded.
pub fn compute_ticks(max_value: f64, target_ticks: usize) -> (f64, Vec<f64>) {
    if max_value <= 0.0 || !max_value.is_finite() {
        return (0.0, vec![0.0]);
    }

    let magnitude = 10f64.powf(max_value.log10().floor());
    let intervals = |unit: f64| (max_value / unit).ceil() as usize;

    let unit = STEP_MULTIPLIERS
        .iter()
        .map(|step| step * magnitude / 10.0)
        .find(|&unit| intervals(unit) <= target_ticks)
        .unwrap_or(magnitude);

    let n = intervals(unit);
    let ticks = (0..=n).map(|i| i as f64 * unit).collect();
    (n as f64 * unit, ticks)
}
