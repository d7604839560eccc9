//! MPU6050 over the Raspberry Pi I2C bus (rppal)

use super::inertial::{ImuBus, RawImuSample};
use crate::error::{SensorError, SensorResult};
use log::{debug, info};
use rppal::i2c::I2c;

const PWR_MGMT_1: u8 = 0x6B;
const ACCEL_XOUT_H: u8 = 0x3B;

fn bus_error(e: rppal::i2c::Error) -> SensorError {
    SensorError::Bus(e.to_string())
}

pub struct Mpu6050Bus {
    i2c: Option<I2c>,
    bus: u8,
    address: u16,
}

impl Mpu6050Bus {
    /// Open the bus and wake the device from sleep
    pub fn open(bus: u8, address: u16) -> SensorResult<Self> {
        let i2c = Self::connect(bus, address)?;
        info!(target: "mpu6050", "MPU6050 at 0x{:02X} on i2c-{}", address, bus);
        Ok(Mpu6050Bus {
            i2c: Some(i2c),
            bus,
            address,
        })
    }

    fn connect(bus: u8, address: u16) -> SensorResult<I2c> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| SensorError::Unavailable(e.to_string()))?;
        i2c.set_slave_address(address).map_err(bus_error)?;
        i2c.smbus_write_byte(PWR_MGMT_1, 0).map_err(bus_error)?;
        Ok(i2c)
    }
}

impl ImuBus for Mpu6050Bus {
    fn read_sample(&mut self) -> SensorResult<RawImuSample> {
        let i2c = self
            .i2c
            .as_mut()
            .ok_or_else(|| SensorError::Bus("bus closed".to_string()))?;
        let mut block = [0u8; 14];
        i2c.block_read(ACCEL_XOUT_H, &mut block).map_err(bus_error)?;
        Ok(RawImuSample::from_registers(&block))
    }

    fn reset(&mut self) -> SensorResult<()> {
        debug!(target: "mpu6050", "Re-opening i2c-{}", self.bus);
        self.i2c = None;
        self.i2c = Some(Self::connect(self.bus, self.address)?);
        Ok(())
    }

    fn close(&mut self) {
        self.i2c = None;
    }
}
