use std::time::{Duration, Instant};

/// Motion must be reported continuously for this long before the dynamic
/// condition qualifies. Rejects single-frame radar noise.
const DYNAMIC_QUALIFY_SECS: u64 = 3;

/// Once qualified, the dynamic condition stays active for this long after the
/// last qualifying tick, so a person who sits still keeps their credit.
const DYNAMIC_LATCH_SECS: u64 = 5 * 60;

/// One radar poll result, as handed over by the sensor transport.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSample {
    pub dynamic_detected: bool,
    pub static_detected: bool,
    pub move_energy: u8,
    pub static_energy: u8,
    pub at: Instant,
}

impl DetectionSample {
    pub fn new(dynamic_detected: bool, static_detected: bool, at: Instant) -> Self {
        Self {
            dynamic_detected,
            static_detected,
            move_energy: 0,
            static_energy: 0,
            at,
        }
    }
}

/// Fuses the radar's dynamic/static flags into a debounced presence verdict.
///
/// Presence requires both a settled occupant (static target) and recent
/// confirmed motion: a continuous dynamic run of at least 3 s, which then
/// stays credited for 5 minutes. A walk-through trips neither condition for
/// long; a sleeping occupant loses presence once the latch runs out, which is
/// intentional — motion has to recur at least every 5 minutes.
#[derive(Debug)]
pub struct PresenceFusion {
    dynamic_since: Option<Instant>,
    dynamic_latch_until: Option<Instant>,
    present: bool,
    qualify_after: Duration,
    latch_for: Duration,
}

impl Default for PresenceFusion {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DYNAMIC_QUALIFY_SECS),
            Duration::from_secs(DYNAMIC_LATCH_SECS),
        )
    }
}

impl PresenceFusion {
    pub fn new(qualify_after: Duration, latch_for: Duration) -> Self {
        Self {
            dynamic_since: None,
            dynamic_latch_until: None,
            present: false,
            qualify_after,
            latch_for,
        }
    }

    /// Feed one sample, called once per poll tick. Returns the current verdict.
    pub fn update(&mut self, sample: &DetectionSample) -> bool {
        let mut qualified = false;

        if sample.dynamic_detected {
            let since = *self.dynamic_since.get_or_insert(sample.at);
            if sample.at.duration_since(since) >= self.qualify_after {
                qualified = true;
                self.dynamic_latch_until = Some(sample.at + self.latch_for);
            }
        } else {
            // The continuous run is broken; the latch decays on its own.
            self.dynamic_since = None;
        }

        if let Some(until) = self.dynamic_latch_until {
            if sample.at >= until {
                self.dynamic_latch_until = None;
            }
        }

        let dynamic_effective = qualified || self.dynamic_latch_until.is_some();
        self.present = dynamic_effective && sample.static_detected;
        self.present
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Seconds of latch credit left, for diagnostics.
    pub fn latch_remaining(&self, at: Instant) -> Option<Duration> {
        self.dynamic_latch_until
            .map(|until| until.saturating_duration_since(at))
    }
}
