const INCHES_PER_TIP: f64 = 0.01;

/// Bucket tip count to inches of rain.
pub(crate) fn onset_rain(tips: f64) -> f64 {
    tips * INCHES_PER_TIP
}
