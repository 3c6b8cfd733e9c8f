//! The polling loop that ties sensor, schedule, relay and playback together.
//!
//! One tick per interval: poll the radar, update the presence verdict, and
//! reconcile the speaker with it. The collaborators sit behind small port
//! traits so the loop can run against fakes in tests.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audio::{PlaybackError, PlayerHandle};
use crate::config::MusicConfig;
use crate::playlist::PlaybackCursor;
use crate::presence::{DetectionSample, PresenceFusion};
use crate::relay::{RelayError, UsbRelay};
use crate::sensor::{RadarSensor, SensorError};

/// Read side: one detection sample per tick.
pub trait PresenceSource {
    fn poll(&mut self) -> Result<DetectionSample, SensorError>;
}

/// Speaker mains power. Side effect only.
pub trait PowerSwitch {
    fn set_power(&mut self, on: bool) -> Result<(), RelayError>;
}

/// Track playback.
pub trait MusicPlayer {
    fn play(&mut self, track: &Path) -> Result<(), PlaybackError>;
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
}

impl PresenceSource for RadarSensor {
    fn poll(&mut self) -> Result<DetectionSample, SensorError> {
        RadarSensor::poll(self)
    }
}

impl PowerSwitch for UsbRelay {
    fn set_power(&mut self, on: bool) -> Result<(), RelayError> {
        UsbRelay::set_power(self, on)
    }
}

/// A relay that was never found. Lets the system run music-only.
impl<R: PowerSwitch> PowerSwitch for Option<R> {
    fn set_power(&mut self, on: bool) -> Result<(), RelayError> {
        match self {
            Some(relay) => relay.set_power(on),
            None => Ok(()),
        }
    }
}

impl MusicPlayer for PlayerHandle {
    fn play(&mut self, track: &Path) -> Result<(), PlaybackError> {
        PlayerHandle::play(self, track)
    }

    fn stop(&mut self) {
        PlayerHandle::stop(self)
    }

    fn is_playing(&self) -> bool {
        PlayerHandle::is_playing(self)
    }
}

pub struct Coordinator<S, R, P> {
    sensor: S,
    relay: R,
    player: P,
    config: MusicConfig,
    fusion: PresenceFusion,
    cursor: PlaybackCursor,
    relay_off_delay: Duration,
    last_present_at: Option<Instant>,
    relay_on: bool,
    was_present: bool,
}

impl<S, R, P> Coordinator<S, R, P>
where
    S: PresenceSource,
    R: PowerSwitch,
    P: MusicPlayer,
{
    pub fn new(
        sensor: S,
        relay: R,
        player: P,
        config: MusicConfig,
        relay_off_delay: Duration,
    ) -> Self {
        Self {
            sensor,
            relay,
            player,
            config,
            fusion: PresenceFusion::default(),
            cursor: PlaybackCursor::new(),
            relay_off_delay,
            last_present_at: None,
            relay_on: false,
            was_present: false,
        }
    }

    /// Run until the token cancels, then stop playback and release the relay.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("coordinator loop started, tick every {interval:?}");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Instant::now(), Local::now().naive_local());
                }
                _ = cancel.cancelled() => {
                    info!("coordinator loop shutting down");
                    break;
                }
            }
        }

        self.player.stop();
        if let Err(err) = self.relay.set_power(false) {
            warn!("failed to release relay on shutdown: {err}");
        }
    }

    /// One evaluation of the whole chain. `at` is the monotonic tick time,
    /// `now` the wall clock used for schedule resolution.
    pub fn tick(&mut self, at: Instant, now: NaiveDateTime) {
        let sample = match self.sensor.poll() {
            Ok(sample) => sample,
            Err(err) => {
                warn!("sensor poll failed: {err}; keeping last presence state");
                return;
            }
        };

        let present = self.fusion.update(&sample);
        if present != self.was_present {
            if present {
                info!(
                    "presence detected (move energy {}, static energy {})",
                    sample.move_energy, sample.static_energy
                );
            } else {
                info!("presence lost");
            }
        }
        self.was_present = present;

        if present {
            if let Some(remaining) = self.fusion.latch_remaining(sample.at) {
                debug!("dynamic credit for another {}s", remaining.as_secs());
            }
            self.last_present_at = Some(at);
            if !self.relay_on {
                self.switch_relay(true);
            }
            if !self.player.is_playing() {
                self.start_next_track(now);
            }
        } else {
            if self.player.is_playing() {
                info!("stopping playback");
                self.player.stop();
            }
            if self.relay_on && self.absence_exceeds_delay(at) {
                info!(
                    "no presence for {:?}, powering speaker down",
                    self.relay_off_delay
                );
                self.switch_relay(false);
            }
        }
    }

    pub fn is_present(&self) -> bool {
        self.fusion.is_present()
    }

    fn absence_exceeds_delay(&self, at: Instant) -> bool {
        self.last_present_at
            .map(|last| at.duration_since(last) > self.relay_off_delay)
            .unwrap_or(false)
    }

    fn start_next_track(&mut self, now: NaiveDateTime) {
        let Some(playlist) = self.config.active_playlist(now) else {
            debug!("no playlist scheduled for {now}");
            return;
        };
        let name = playlist.name.clone();
        let tracks = playlist.resolve_tracks(&self.config.music_dir);

        let Some(track) = self.cursor.next_track(&name, &tracks) else {
            warn!("playlist '{name}' has no tracks available");
            return;
        };

        // The cursor already moved past this track, so a bad file is simply
        // skipped: the next tick picks up the one after it.
        if let Err(err) = self.player.play(&track) {
            warn!("failed to play {}: {err}", track.display());
        }
    }

    fn switch_relay(&mut self, on: bool) {
        match self.relay.set_power(on) {
            Ok(()) => {
                self.relay_on = on;
                info!("relay switched {}", if on { "on" } else { "off" });
            }
            Err(err) => {
                warn!("relay switch failed: {err}; retrying next tick");
            }
        }
    }
}
