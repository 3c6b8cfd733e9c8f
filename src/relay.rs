//! USB HID relay that switches the speaker's mains power.
//!
//! Single-channel HID relay boards answer a SET_REPORT control transfer with a
//! three-byte command: report id, channel, state.

use std::time::Duration;

use log::{debug, info};
use rusb::{DeviceHandle, GlobalContext};
use thiserror::Error;

pub const DEFAULT_VENDOR_ID: u16 = 0x16c0;
pub const DEFAULT_PRODUCT_ID: u16 = 0x05df;

const REQUEST_TYPE_SET_REPORT: u8 = 0x21;
const REQUEST_SET_REPORT: u8 = 0x09;
const REPORT_VALUE: u16 = 0x0300;
const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay device not found (vid {vid:04x}, pid {pid:04x})")]
    NotFound { vid: u16, pid: u16 },
    #[error("relay unavailable: {0}")]
    Unavailable(#[from] rusb::Error),
}

pub struct UsbRelay {
    handle: DeviceHandle<GlobalContext>,
    channel: u8,
    on: bool,
}

impl UsbRelay {
    pub fn open(vid: u16, pid: u16) -> Result<Self, RelayError> {
        let handle =
            rusb::open_device_with_vid_pid(vid, pid).ok_or(RelayError::NotFound { vid, pid })?;

        // Linux attaches usbhid to these boards; detach while we hold them.
        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(err) => return Err(err.into()),
        }
        handle.claim_interface(0)?;

        info!("connected to USB relay (vid {vid:04x}, pid {pid:04x})");
        Ok(Self {
            handle,
            channel: 1,
            on: false,
        })
    }

    pub fn set_power(&mut self, on: bool) -> Result<(), RelayError> {
        let command = [0x01, self.channel, on as u8];
        self.handle.write_control(
            REQUEST_TYPE_SET_REPORT,
            REQUEST_SET_REPORT,
            REPORT_VALUE,
            0,
            &command,
            CONTROL_TIMEOUT,
        )?;
        self.on = on;
        debug!(
            "relay channel {} switched {}",
            self.channel,
            if on { "on" } else { "off" }
        );
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
