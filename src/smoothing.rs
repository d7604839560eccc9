use crate::types::Axes3;

/// First-order exponential smoothing: `s = alpha * x + (1 - alpha) * s`.
/// Starts from zero, like the raw sensor before its first sample.
#[derive(Clone, Debug)]
pub struct ExpSmoother {
    alpha: f64,
    value: f64,
}

impl ExpSmoother {
    pub fn new(alpha: f64) -> Self {
        ExpSmoother {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
        }
    }

    pub fn apply(&mut self, sample: f64) -> f64 {
        self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// One smoother per axis
#[derive(Clone, Debug)]
pub struct AxisSmoother {
    x: ExpSmoother,
    y: ExpSmoother,
    z: ExpSmoother,
}

impl AxisSmoother {
    pub fn new(alpha: f64) -> Self {
        AxisSmoother {
            x: ExpSmoother::new(alpha),
            y: ExpSmoother::new(alpha),
            z: ExpSmoother::new(alpha),
        }
    }

    pub fn apply(&mut self, sample: Axes3) -> Axes3 {
        Axes3::new(self.x.apply(sample.x), self.y.apply(sample.y), self.z.apply(sample.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_weighted_against_zero() {
        let mut smoother = ExpSmoother::new(0.3);
        let result = smoother.apply(1.0);
        assert!((result - 0.3).abs() < 0.001);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut smoother = ExpSmoother::new(0.3);
        for _ in 0..100 {
            smoother.apply(2.0);
        }
        assert!((smoother.value() - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_alpha_one_tracks_input() {
        let mut smoother = ExpSmoother::new(1.0);
        smoother.apply(5.0);
        assert_eq!(smoother.apply(-3.0), -3.0);
    }

    #[test]
    fn test_axes_independent() {
        let mut smoother = AxisSmoother::new(0.5);
        let out = smoother.apply(Axes3::new(2.0, -2.0, 0.0));
        assert_eq!(out, Axes3::new(1.0, -1.0, 0.0));
    }
}
