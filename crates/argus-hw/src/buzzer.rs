//! Alarm buzzer control via the GPIO character-device (v2) ABI.
//!
//! Requests a single output line from `/dev/gpiochipN` and toggles it with
//! raw ioctls, replacing the deprecated sysfs GPIO interface. Hosts without
//! the chip node simply report the buzzer as unavailable.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// `GPIO_V2_GET_LINE_IOCTL` = `_IOWR(0xB4, 0x07, struct gpio_v2_line_request)`
/// where sizeof(struct gpio_v2_line_request) = 592 bytes (verified by assert below).
const GPIO_V2_GET_LINE_IOCTL: libc::c_ulong = 0xC250_B407;

/// `GPIO_V2_LINE_SET_VALUES_IOCTL` = `_IOWR(0xB4, 0x0F, struct gpio_v2_line_values)`
/// where sizeof(struct gpio_v2_line_values) = 16 bytes.
const GPIO_V2_LINE_SET_VALUES_IOCTL: libc::c_ulong = 0xC010_B40F;

/// GPIO_V2_LINE_FLAG_OUTPUT from `<linux/gpio.h>`.
const GPIO_V2_LINE_FLAG_OUTPUT: u64 = 1 << 2;

const GPIO_V2_LINES_MAX: usize = 64;
const GPIO_MAX_NAME_SIZE: usize = 32;
const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

/// Mirror of `struct gpio_v2_line_attribute` (union collapsed to u64).
#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineAttribute {
    id: u32,
    padding: u32,
    value: u64,
}

/// Mirror of `struct gpio_v2_line_config_attribute`.
#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineConfigAttribute {
    attr: GpioV2LineAttribute,
    mask: u64,
}

/// Mirror of `struct gpio_v2_line_config`.
#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineConfig {
    flags: u64,
    num_attrs: u32,
    padding: [u32; 5],
    attrs: [GpioV2LineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
}

/// Mirror of `struct gpio_v2_line_request` from `<linux/gpio.h>`.
///
/// Layout (64-bit Linux):
///   offsets: 64*u32, consumer: 32 bytes, config: 272 bytes,
///   num_lines:u32 event_buffer_size:u32 padding: 5*u32 fd:i32
/// Total: 256+32+272+4+4+20+4 = 592 bytes, verified by compile-time assert.
#[repr(C)]
struct GpioV2LineRequest {
    offsets: [u32; GPIO_V2_LINES_MAX],
    consumer: [u8; GPIO_MAX_NAME_SIZE],
    config: GpioV2LineConfig,
    num_lines: u32,
    event_buffer_size: u32,
    padding: [u32; 5],
    fd: i32,
}

/// Mirror of `struct gpio_v2_line_values`.
#[repr(C)]
struct GpioV2LineValues {
    bits: u64,
    mask: u64,
}

const _REQUEST_SIZE_ASSERT: () = assert!(
    std::mem::size_of::<GpioV2LineRequest>() == 592,
    "GpioV2LineRequest must be 592 bytes to match the kernel ABI"
);
const _VALUES_SIZE_ASSERT: () = assert!(
    std::mem::size_of::<GpioV2LineValues>() == 16,
    "GpioV2LineValues must be 16 bytes to match the kernel ABI"
);

#[derive(Debug, Error)]
pub enum BuzzerError {
    #[error("GPIO chip not present: {0}")]
    ChipNotPresent(String),
    #[error("failed to open GPIO chip: {0}")]
    Open(std::io::Error),
    #[error("GPIO ioctl failed: {0}")]
    Ioctl(std::io::Error),
}

/// A single GPIO output line driving the alarm buzzer.
///
/// The line file descriptor is requested once at probe time and held for
/// the lifetime of the `Buzzer`; dropping it releases the line.
#[derive(Debug)]
pub struct Buzzer {
    line_file: File,
    chip_path: String,
    line: u32,
}

impl Buzzer {
    /// Probe for the buzzer line on the given chip.
    ///
    /// Returns `None` when the chip node does not exist (host without GPIO
    /// hardware); requesting the line on a present chip can still fail.
    pub fn probe(chip_path: &str, line: u32) -> Option<Result<Self, BuzzerError>> {
        if !Path::new(chip_path).exists() {
            return None;
        }
        Some(Self::open(chip_path, line))
    }

    /// Request `line` as an output on `chip_path`.
    pub fn open(chip_path: &str, line: u32) -> Result<Self, BuzzerError> {
        if !Path::new(chip_path).exists() {
            return Err(BuzzerError::ChipNotPresent(chip_path.to_string()));
        }

        let chip = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(chip_path)
            .map_err(BuzzerError::Open)?;

        // SAFETY: zero is a valid bit pattern for every field of the
        // repr(C) request struct.
        let mut request: GpioV2LineRequest = unsafe { std::mem::zeroed() };
        request.offsets[0] = line;
        request.num_lines = 1;
        request.config.flags = GPIO_V2_LINE_FLAG_OUTPUT;
        let consumer = b"argus-buzzer";
        request.consumer[..consumer.len()].copy_from_slice(consumer);

        // SAFETY:
        // - the chip fd is valid for the duration of the call
        // - `request` is correctly sized and repr(C), matching the kernel ABI
        let ret = unsafe {
            libc::ioctl(
                chip.as_raw_fd(),
                GPIO_V2_GET_LINE_IOCTL,
                &mut request as *mut GpioV2LineRequest,
            )
        };
        if ret < 0 {
            return Err(BuzzerError::Ioctl(std::io::Error::last_os_error()));
        }

        // SAFETY: the kernel returned ownership of a fresh line fd.
        let line_file = unsafe {
            use std::os::unix::io::FromRawFd;
            File::from_raw_fd(request.fd)
        };

        tracing::info!(chip = chip_path, line, "GPIO buzzer line requested");

        Ok(Self {
            line_file,
            chip_path: chip_path.to_string(),
            line,
        })
    }

    /// Drive the buzzer line high for `duration`, then low.
    ///
    /// Blocking; run on a dedicated or blocking-pool thread.
    pub fn pulse(&self, duration: Duration) -> Result<(), BuzzerError> {
        tracing::debug!(chip = %self.chip_path, line = self.line, ?duration, "buzzer pulse");
        self.set_value(true)?;
        std::thread::sleep(duration);
        self.set_value(false)
    }

    fn set_value(&self, high: bool) -> Result<(), BuzzerError> {
        let mut values = GpioV2LineValues {
            bits: if high { 1 } else { 0 },
            mask: 1,
        };

        // SAFETY: the line fd is valid and `values` matches the kernel ABI.
        let ret = unsafe {
            libc::ioctl(
                self.line_file.as_raw_fd(),
                GPIO_V2_LINE_SET_VALUES_IOCTL,
                &mut values as *mut GpioV2LineValues,
            )
        };

        if ret < 0 {
            Err(BuzzerError::Ioctl(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    pub fn chip_path(&self) -> &str {
        &self.chip_path
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_missing_chip_is_none() {
        assert!(Buzzer::probe("/dev/gpiochip-does-not-exist", 18).is_none());
    }

    #[test]
    fn test_open_missing_chip_errors() {
        let err = Buzzer::open("/dev/gpiochip-does-not-exist", 18).unwrap_err();
        assert!(matches!(err, BuzzerError::ChipNotPresent(_)));
    }

    #[test]
    fn test_ioctl_request_encoding() {
        // _IOWR(0xB4, nr, size): dir=3<<30 | size<<16 | type<<8 | nr.
        let expected_get_line = (3u64 << 30)
            | ((std::mem::size_of::<GpioV2LineRequest>() as u64) << 16)
            | (0xB4 << 8)
            | 0x07;
        assert_eq!(GPIO_V2_GET_LINE_IOCTL as u64, expected_get_line);

        let expected_set_values = (3u64 << 30)
            | ((std::mem::size_of::<GpioV2LineValues>() as u64) << 16)
            | (0xB4 << 8)
            | 0x0F;
        assert_eq!(GPIO_V2_LINE_SET_VALUES_IOCTL as u64, expected_set_values);
    }
}
