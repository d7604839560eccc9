use crate::types::{Attitude, Axes3};

/// Below this |az| (in g) roll from the accelerometer is meaningless
const MIN_AZ_FOR_ROLL: f64 = 0.01;

/// Complementary filter for pitch and roll.
///
/// Gyro rates are integrated and blended with the tilt implied by the
/// accelerometer; yaw has no absolute reference and is integrated without
/// bound. Pitch and roll go through a second exponential smoothing before
/// they are reported.
pub struct ComplementaryFilter {
    pitch: f64,
    roll: f64,
    yaw: f64,
    pitch_smoothed: f64,
    roll_smoothed: f64,

    // Filter gains
    gyro_weight: f64,      // 0.96 = 96% trust integrated gyro
    output_smoothing: f64, // 0.9 = 90% previous output
}

impl ComplementaryFilter {
    pub fn new(gyro_weight: f64, output_smoothing: f64) -> Self {
        Self {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            pitch_smoothed: 0.0,
            roll_smoothed: 0.0,
            gyro_weight,
            output_smoothing,
        }
    }

    /// `accel` in g, `gyro` in deg/s, `dt` in seconds
    pub fn update(&mut self, accel: Axes3, gyro: Axes3, dt: f64) -> Attitude {
        let pitch_acc = (-accel.x).atan2((accel.y * accel.y + accel.z * accel.z).sqrt()).to_degrees();
        let roll_acc = if accel.z.abs() >= MIN_AZ_FOR_ROLL {
            accel.y.atan2(accel.z).to_degrees()
        } else {
            self.roll
        };

        let w = self.gyro_weight;
        self.pitch = w * (self.pitch + gyro.x * dt) + (1.0 - w) * pitch_acc;
        self.roll = w * (self.roll + gyro.y * dt) + (1.0 - w) * roll_acc;
        self.yaw += gyro.z * dt;

        let s = self.output_smoothing;
        self.pitch_smoothed = s * self.pitch_smoothed + (1.0 - s) * self.pitch;
        self.roll_smoothed = s * self.roll_smoothed + (1.0 - s) * self.roll;

        self.attitude()
    }

    pub fn attitude(&self) -> Attitude {
        Attitude {
            pitch: self.pitch_smoothed,
            roll: self.roll_smoothed,
            yaw: self.yaw,
        }
    }
}

impl Default for ComplementaryFilter {
    fn default() -> Self {
        Self::new(0.96, 0.9)
    }
}
