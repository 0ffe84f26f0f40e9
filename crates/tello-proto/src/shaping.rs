//! Stick shaping: maps how long a control has been held to a throttle
//! percentage on a logarithmic ramp (fine control near zero, saturation at
//! `vel_timing`).

/// `100 * ln(1+t) / ln(1+vel_timing)` with `t` bounded to `[0, vel_timing]`,
/// result clamped to `[-100, 100]`.
pub fn shape(t: f64, vel_timing: f64) -> f64 {
    if vel_timing <= 0.0 || !t.is_finite() {
        return 0.0;
    }
    let t = t.clamp(0.0, vel_timing);
    (100.0 * t.ln_1p() / vel_timing.ln_1p()).clamp(-100.0, 100.0)
}

/// Held-duration integrator for one direction of one axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldRamp {
    held_s: f64,
}

impl HoldRamp {
    /// Grows by `dt` while held, decays by `dt` when released.
    pub fn update(&mut self, held: bool, dt: f64, vel_timing: f64) -> f64 {
        let step = if held { dt } else { -dt };
        self.held_s = (self.held_s + step).clamp(0.0, vel_timing.max(0.0));
        self.held_s
    }

    pub fn held(&self) -> f64 {
        self.held_s
    }

    pub fn reset(&mut self) {
        self.held_s = 0.0;
    }
}

/// One stick axis driven by a positive and a negative control.
#[derive(Debug, Clone, Copy)]
pub struct StickAxis {
    pos: HoldRamp,
    neg: HoldRamp,
    vel_timing: f64,
}

impl StickAxis {
    pub fn new(vel_timing: f64) -> Self {
        Self { pos: HoldRamp::default(), neg: HoldRamp::default(), vel_timing }
    }

    /// Advances both ramps and returns the shaped throttle for this axis.
    pub fn update(&mut self, pos_held: bool, neg_held: bool, dt: f64) -> f64 {
        let p = self.pos.update(pos_held, dt, self.vel_timing);
        let n = self.neg.update(neg_held, dt, self.vel_timing);
        shape(p, self.vel_timing) - shape(n, self.vel_timing)
    }

    pub fn reset(&mut self) {
        self.pos.reset();
        self.neg.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(shape(0.0, 10.0), 0.0);
        assert!((shape(10.0, 10.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn midpoint_value() {
        let expected = 100.0 * 6f64.ln() / 11f64.ln();
        let got = shape(5.0, 10.0);
        assert!((got - expected).abs() < 1e-9);
        assert!((got - 74.7).abs() < 0.1, "{}", got);
    }

    #[test]
    fn monotonic_over_range() {
        let mut prev = shape(0.0, 10.0);
        for i in 1..=1000 {
            let v = shape(i as f64 / 100.0, 10.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn out_of_range_input_is_bounded() {
        assert_eq!(shape(-3.0, 10.0), 0.0);
        assert!((shape(50.0, 10.0) - 100.0).abs() < 1e-9);
        assert_eq!(shape(f64::NAN, 10.0), 0.0);
        assert_eq!(shape(1.0, 0.0), 0.0);
    }

    #[test]
    fn ramp_grows_then_decays() {
        let mut r = HoldRamp::default();
        for _ in 0..20 {
            r.update(true, 1.0, 5.0);
        }
        assert_eq!(r.held(), 5.0);
        r.update(false, 2.0, 5.0);
        assert_eq!(r.held(), 3.0);
        for _ in 0..10 {
            r.update(false, 1.0, 5.0);
        }
        assert_eq!(r.held(), 0.0);
    }

    #[test]
    fn opposing_controls_cancel() {
        let mut axis = StickAxis::new(10.0);
        let v = axis.update(true, true, 2.0);
        assert_eq!(v, 0.0);
        let v = axis.update(false, true, 2.0);
        assert!(v < 0.0);
    }
}
