//! Serial transport for the 24 GHz mmWave presence radar.
//!
//! The radar streams target reports continuously; [`RadarSensor::poll`] drains
//! whatever arrived since the last tick and condenses it into one
//! [`DetectionSample`]. Configuration runs through the command/ACK exchange in
//! [`frame`].

pub mod frame;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use thiserror::Error;

use crate::presence::DetectionSample;
use frame::{FrameParser, TargetReport};

pub const DEFAULT_BAUD_RATE: u32 = 256_000;
const READ_CHUNK: usize = 256;
const ACK_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
    #[error("sensor rejected command 0x{0:04X}")]
    CommandRejected(u16),
}

impl From<serialport::Error> for SensorError {
    fn from(err: serialport::Error) -> Self {
        SensorError::Unavailable(err.to_string())
    }
}

impl From<std::io::Error> for SensorError {
    fn from(err: std::io::Error) -> Self {
        SensorError::Unavailable(err.to_string())
    }
}

/// Radar tuning applied at startup. Gates are 0.75 m steps.
#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub max_motion_gate: u8,
    pub max_static_gate: u8,
    /// Seconds the radar itself waits before reporting "no one".
    pub no_one_duration_secs: u16,
    pub motion_sensitivity: [u8; 8],
    pub static_sensitivity: [u8; 8],
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            max_motion_gate: 8,
            max_static_gate: 8,
            no_one_duration_secs: 10,
            motion_sensitivity: [80, 80, 75, 75, 75, 70, 70, 70],
            static_sensitivity: [80, 80, 75, 75, 75, 70, 70, 70],
        }
    }
}

pub struct RadarSensor {
    port: Box<dyn SerialPort>,
    parser: FrameParser,
    last_report: Option<TargetReport>,
}

impl RadarSensor {
    /// Open the radar's serial port. The timeout bounds every blocking read,
    /// so one poll can never stall the coordinator loop past it.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, SensorError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open()?;
        info!("connected to presence sensor on {path} at {baud_rate} baud");
        Ok(Self {
            port,
            parser: FrameParser::new(),
            last_report: None,
        })
    }

    /// Drain pending bytes and return the latest detection state.
    ///
    /// With no new frame this tick, the last parsed report carries over; the
    /// radar keeps its own short no-one hold, so a quiet serial window is not
    /// a loss of target.
    pub fn poll(&mut self) -> Result<DetectionSample, SensorError> {
        let mut scratch = [0u8; READ_CHUNK];

        while self.port.bytes_to_read()? > 0 {
            let n = match self.port.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err.into()),
            };
            for report in self.parser.push(&scratch[..n]) {
                self.last_report = Some(report);
            }
        }

        let at = Instant::now();
        let sample = match self.last_report {
            Some(report) => DetectionSample {
                dynamic_detected: report.moving,
                static_detected: report.stationary,
                move_energy: report.move_energy,
                static_energy: report.static_energy,
                at,
            },
            None => DetectionSample::new(false, false, at),
        };
        Ok(sample)
    }

    /// Push the detection parameters to the radar. Runs the whole
    /// enable-config / set / end-config exchange; a rejected step aborts after
    /// trying to leave config mode.
    pub fn configure(&mut self, settings: &SensorSettings) -> Result<(), SensorError> {
        self.command(frame::CMD_ENABLE_CONFIG, &1u16.to_le_bytes())?;

        let mut data = Vec::new();
        data.extend_from_slice(&frame::param_word(0x0000, settings.max_motion_gate as u32));
        data.extend_from_slice(&frame::param_word(0x0001, settings.max_static_gate as u32));
        data.extend_from_slice(&frame::param_word(
            0x0002,
            settings.no_one_duration_secs as u32,
        ));
        if let Err(err) = self.command(frame::CMD_SET_DISTANCE_PARAMS, &data) {
            let _ = self.command(frame::CMD_END_CONFIG, &[]);
            return Err(err);
        }

        for gate in 0..8u8 {
            let mut data = Vec::new();
            data.extend_from_slice(&frame::param_word(0x0000, gate as u32));
            data.extend_from_slice(&frame::param_word(
                0x0001,
                settings.motion_sensitivity[gate as usize] as u32,
            ));
            data.extend_from_slice(&frame::param_word(
                0x0002,
                settings.static_sensitivity[gate as usize] as u32,
            ));
            if let Err(err) = self.command(frame::CMD_SET_SENSITIVITY, &data) {
                warn!("failed to set sensitivity for gate {gate}: {err}");
            }
        }

        self.command(frame::CMD_END_CONFIG, &[])?;
        info!("sensor configuration completed");
        Ok(())
    }

    fn command(&mut self, word: u16, data: &[u8]) -> Result<(), SensorError> {
        let request = frame::command_frame(word, data);
        self.port.clear(ClearBuffer::Input)?;
        self.port.write_all(&request)?;
        debug!("sent command 0x{word:04X} ({} bytes)", request.len());

        std::thread::sleep(ACK_SETTLE);

        let mut head = [0u8; 6];
        self.port.read_exact(&mut head)?;
        let payload_len = u16::from_le_bytes([head[4], head[5]]) as usize;
        let mut rest = vec![0u8; payload_len + 4];
        self.port.read_exact(&mut rest)?;

        let mut response = head.to_vec();
        response.extend_from_slice(&rest);
        if !frame::ack_ok(&response, word) {
            return Err(SensorError::CommandRejected(word));
        }
        Ok(())
    }
}
