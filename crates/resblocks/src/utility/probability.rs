//! # Probability Utilities

/// Check that a value is a usable drop probability in ``[0.0, 1.0)``.
pub fn try_drop_probability(prob: f64) -> Result<f64, String> {
    if (0.0..1.0).contains(&prob) {
        Ok(prob)
    } else {
        Err(format!("Drop probability must be in [0.0, 1.0): {prob}"))
    }
}
