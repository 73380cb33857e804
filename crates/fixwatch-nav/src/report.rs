use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use time::Time;

use crate::fix::{FixState, FixStatus};

/// What the scheduler decided to surface this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Report(FixState),
    Waiting(FixStatus),
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emission::Report(st) => {
                writeln!(f, "{}", "-".repeat(30))?;
                writeln!(f, "UTC Time:   {}", TimeOfDay(st.utc_time))?;
                writeln!(f, "Local Time: {}", TimeOfDay(st.local_time))?;
                writeln!(f, "Latitude:   {:.6}", st.latitude)?;
                writeln!(f, "Longitude:  {:.6}", st.longitude)?;
                writeln!(f, "Speed:      {:.2} km/h", st.speed_kmh)?;
                writeln!(f, "Satellites: {}", st.num_sats)?;
                writeln!(f, "Quality:    {}", st.quality)?;
                write!(f, "Altitude:   {:.1} M", st.altitude_m)
            }
            Emission::Waiting(status) => write!(f, "...waiting for GPS fix (Status: {})", status),
        }
    }
}

/// `HH:MM:SS`, plus `.ffffff` when there is a sub-second part; `None` when unknown.
pub struct TimeOfDay(pub Option<Time>);

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(t) = self.0 else { return f.write_str("None") };
        write!(f, "{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())?;
        if t.microsecond() != 0 {
            write!(f, ".{:06}", t.microsecond())?;
        }
        Ok(())
    }
}

/// Machine-readable form of an [`Emission`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmissionRecord {
    Report {
        status: FixStatus,
        utc_time: Option<String>,
        local_time: Option<String>,
        latitude: f64,
        longitude: f64,
        speed_kmh: f64,
        num_sats: u32,
        quality: &'static str,
        altitude_m: f64,
    },
    Waiting {
        status: FixStatus,
    },
}

impl From<&Emission> for EmissionRecord {
    fn from(e: &Emission) -> Self {
        let fmt_time = |t: Option<Time>| t.map(|t| TimeOfDay(Some(t)).to_string());
        match e {
            Emission::Report(st) => EmissionRecord::Report {
                status: st.status,
                utc_time: fmt_time(st.utc_time),
                local_time: fmt_time(st.local_time),
                latitude: st.latitude,
                longitude: st.longitude,
                speed_kmh: st.speed_kmh,
                num_sats: st.num_sats,
                quality: st.quality.label(),
                altitude_m: st.altitude_m,
            },
            Emission::Waiting(status) => EmissionRecord::Waiting { status: *status },
        }
    }
}

/// Throttles emissions. Both cadences share one "last emission" timestamp, so a
/// status flip is measured against whatever was printed last.
#[derive(Debug, Clone)]
pub struct ReportScheduler {
    full_interval: Duration,
    waiting_interval: Duration,
    last_emission: Option<Instant>,
}

impl ReportScheduler {
    pub fn new(full_interval: Duration, waiting_interval: Duration) -> Self {
        Self { full_interval, waiting_interval, last_emission: None }
    }

    pub fn last_emission(&self) -> Option<Instant> {
        self.last_emission
    }

    pub fn evaluate(&mut self, state: &FixState, now: Instant) -> Option<Emission> {
        let elapsed_at_least = |interval: Duration| match self.last_emission {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= interval,
        };

        let emission = if state.is_active() && elapsed_at_least(self.full_interval) {
            Emission::Report(state.clone())
        } else if !state.is_active() && elapsed_at_least(self.waiting_interval) {
            Emission::Waiting(state.status)
        } else {
            return None;
        };

        self.last_emission = Some(now);
        Some(emission)
    }
}

impl Default for ReportScheduler {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(crate::DEFAULT_FULL_REPORT_INTERVAL_S),
            Duration::from_secs(crate::DEFAULT_WAITING_NOTICE_INTERVAL_S),
        )
    }
}
