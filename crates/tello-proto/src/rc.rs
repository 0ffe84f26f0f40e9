use std::fmt;

use serde::{Deserialize, Serialize};

pub const RC_LIMIT: i32 = 100;

/// Throttle percentages for the four stick axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcVector {
    /// left (-) / right (+)
    pub lateral: i32,
    /// backward (-) / forward (+)
    pub longitudinal: i32,
    /// down (-) / up (+)
    pub vertical: i32,
    /// counterclockwise (-) / clockwise (+)
    pub yaw: i32,
}

pub fn clamp_axis(v: i32) -> i32 {
    v.clamp(-RC_LIMIT, RC_LIMIT)
}

impl RcVector {
    pub const ZERO: RcVector = RcVector { lateral: 0, longitudinal: 0, vertical: 0, yaw: 0 };

    pub fn clamped(lateral: i32, longitudinal: i32, vertical: i32, yaw: i32) -> Self {
        Self {
            lateral: clamp_axis(lateral),
            longitudinal: clamp_axis(longitudinal),
            vertical: clamp_axis(vertical),
            yaw: clamp_axis(yaw),
        }
    }

    /// Same as [`RcVector::clamped`] for shaped (fractional) stick values. Truncates toward zero.
    pub fn from_shaped(lateral: f64, longitudinal: f64, vertical: f64, yaw: f64) -> Self {
        Self::clamped(lateral as i32, longitudinal as i32, vertical as i32, yaw as i32)
    }

    pub fn in_range(&self) -> bool {
        [self.lateral, self.longitudinal, self.vertical, self.yaw]
            .iter()
            .all(|v| (-RC_LIMIT..=RC_LIMIT).contains(v))
    }
}

impl fmt::Display for RcVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rc {} {} {} {}", self.lateral, self.longitudinal, self.vertical, self.yaw)
    }
}
