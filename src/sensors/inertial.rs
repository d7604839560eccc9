//! MPU6050 inertial pipeline: bias calibration, scaling, smoothing and
//! attitude fusion on top of a raw register bus.

use super::retry::RetryPolicy;
use super::SensorSource;
use crate::config::InertialConfig;
use crate::error::{SensorError, SensorResult};
use crate::filters::ComplementaryFilter;
use crate::smoothing::AxisSmoother;
use crate::types::{round_to, Attitude, Axes3, InertialData, SensorData, SensorId};
use log::{debug, info};
use std::time::{Duration, Instant};

pub const ACCEL_LSB_PER_G: f64 = 16384.0;
pub const GYRO_LSB_PER_DPS: f64 = 131.0;
const MIN_DT: f64 = 1e-3;

/// Raw register values, signed big-endian words as read from the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawImuSample {
    /// Decode the 14-byte block starting at ACCEL_XOUT_H (accel, temp, gyro)
    pub fn from_registers(block: &[u8; 14]) -> Self {
        let word = |i: usize| i16::from_be_bytes([block[i], block[i + 1]]);
        RawImuSample {
            accel: [word(0), word(2), word(4)],
            gyro: [word(8), word(10), word(12)],
        }
    }
}

/// Register-level access to the inertial device
pub trait ImuBus: Send {
    fn read_sample(&mut self) -> SensorResult<RawImuSample>;

    /// Re-open the bus after an error
    fn reset(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Per-axis offsets in raw counts
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuBias {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

pub struct InertialSource<B: ImuBus> {
    bus: B,
    retry: RetryPolicy,
    calibration_samples: usize,
    calibration_pause: Duration,
    cadence: Duration,
    bias: ImuBias,
    accel_smoother: AxisSmoother,
    gyro_smoother: AxisSmoother,
    filter: ComplementaryFilter,
    last_sample: Option<Instant>,
}

impl<B: ImuBus> InertialSource<B> {
    pub fn new(bus: B, config: &InertialConfig) -> Self {
        InertialSource {
            bus,
            retry: RetryPolicy::new(config.retry_attempts(), config.retry_delay()),
            calibration_samples: config.calibration_samples(),
            calibration_pause: config.calibration_pause(),
            cadence: config.sample_interval(),
            bias: ImuBias::default(),
            accel_smoother: AxisSmoother::new(config.input_alpha),
            gyro_smoother: AxisSmoother::new(config.input_alpha),
            filter: ComplementaryFilter::new(config.fusion_weight, config.output_smoothing),
            last_sample: None,
        }
    }

    fn read_raw(&mut self) -> SensorResult<RawImuSample> {
        let bus = &mut self.bus;
        self.retry.run("MPU6050 read", |attempt| {
            if attempt > 0 {
                if let Err(e) = bus.reset() {
                    debug!(target: "mpu6050", "Bus reset failed: {}", e);
                }
            }
            bus.read_sample()
        })
    }

    /// Average `calibration_samples` readings per axis while the device is still
    pub fn calibrate(&mut self) -> SensorResult<ImuBias> {
        info!(target: "mpu6050", "Calibrating with {} samples, keep the sensor still", self.calibration_samples);
        let mut sums = [0f64; 6];
        for _ in 0..self.calibration_samples {
            let raw = self
                .read_raw()
                .map_err(|e| SensorError::Calibration(e.to_string()))?;
            for axis in 0..3 {
                sums[axis] += raw.accel[axis] as f64;
                sums[axis + 3] += raw.gyro[axis] as f64;
            }
            if !self.calibration_pause.is_zero() {
                std::thread::sleep(self.calibration_pause);
            }
        }
        let n = self.calibration_samples.max(1) as f64;
        self.bias = ImuBias {
            accel: [sums[0] / n, sums[1] / n, sums[2] / n],
            gyro: [sums[3] / n, sums[4] / n, sums[5] / n],
        };
        info!(target: "mpu6050", "Calibration done: {:?}", self.bias);
        Ok(self.bias)
    }

    /// Scale a raw sample to g and deg/s after removing the bias
    pub fn scale(&self, raw: &RawImuSample) -> (Axes3, Axes3) {
        let a = |i: usize| (raw.accel[i] as f64 - self.bias.accel[i]) / ACCEL_LSB_PER_G;
        let g = |i: usize| (raw.gyro[i] as f64 - self.bias.gyro[i]) / GYRO_LSB_PER_DPS;
        (Axes3::new(a(0), a(1), a(2)), Axes3::new(g(0), g(1), g(2)))
    }

    /// Run one raw sample through smoothing and fusion
    pub fn process(&mut self, raw: &RawImuSample, now: Instant) -> InertialData {
        let dt = match self.last_sample {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => self.cadence.as_secs_f64(),
        }
        .max(MIN_DT);
        self.last_sample = Some(now);

        let (accel, gyro) = self.scale(raw);
        let accel = self.accel_smoother.apply(accel);
        let gyro = self.gyro_smoother.apply(gyro);
        let attitude = self.filter.update(accel, gyro, dt);

        InertialData {
            accel_g: accel.rounded(4),
            gyro_dps: gyro.rounded(3),
            attitude_deg: Attitude {
                pitch: round_to(attitude.pitch, 2),
                roll: round_to(attitude.roll, 2),
                yaw: round_to(attitude.yaw, 2),
            },
        }
    }
}

impl<B: ImuBus> SensorSource for InertialSource<B> {
    fn sensor(&self) -> SensorId {
        SensorId::Mpu6050
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn prepare(&mut self) -> SensorResult<()> {
        self.calibrate().map(|_| ())
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let raw = self.read_raw()?;
        Ok(Some(SensorData::Inertial(self.process(&raw, Instant::now()))))
    }

    fn close(&mut self) {
        self.bus.close();
    }
}
