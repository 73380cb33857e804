use std::fmt;

use serde::Serialize;
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};
use tracing::trace;

use crate::nmea::{self, Gga, NmeaDate, NmeaTime, Rmc, Sentence, Vtg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixStatus {
    #[serde(rename = "A")]
    Active,
    #[serde(rename = "V")]
    Void,
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixStatus::Active => f.write_str("A"),
            FixStatus::Void => f.write_str("V"),
        }
    }
}

/// How the receiver computed the fix (GGA quality indicator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixQuality {
    Invalid,
    Gps,
    Dgps,
    Pps,
    Rtk,
    FloatRtk,
    Estimated,
    Manual,
    Simulation,
    Unknown,
}

impl FixQuality {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => FixQuality::Invalid,
            1 => FixQuality::Gps,
            2 => FixQuality::Dgps,
            3 => FixQuality::Pps,
            4 => FixQuality::Rtk,
            5 => FixQuality::FloatRtk,
            6 => FixQuality::Estimated,
            7 => FixQuality::Manual,
            8 => FixQuality::Simulation,
            _ => FixQuality::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FixQuality::Invalid => "Invalid",
            FixQuality::Gps => "GPS fix",
            FixQuality::Dgps => "DGPS fix",
            FixQuality::Pps => "PPS fix",
            FixQuality::Rtk => "RTK",
            FixQuality::FloatRtk => "Float RTK",
            FixQuality::Estimated => "Estimated",
            FixQuality::Manual => "Manual",
            FixQuality::Simulation => "Simulation",
            FixQuality::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FixQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest known receiver snapshot. Position, velocity and GGA data are only
/// trusted while `status` is `Active`; otherwise they hold their invalid defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FixState {
    pub status: FixStatus,
    pub utc_time: Option<Time>,
    pub local_time: Option<Time>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub num_sats: u32,
    pub quality: FixQuality,
    pub altitude_m: f64,
}

impl Default for FixState {
    fn default() -> Self {
        Self {
            status: FixStatus::Void,
            utc_time: None,
            local_time: None,
            latitude: 0.0,
            longitude: 0.0,
            speed_kmh: 0.0,
            num_sats: 0,
            quality: FixQuality::Invalid,
            altitude_m: 0.0,
        }
    }
}

impl FixState {
    pub fn is_active(&self) -> bool {
        self.status == FixStatus::Active
    }
}

/// Applies decoded sentences to a [`FixState`], gating each sentence kind on
/// the fix status current at the moment it arrives.
#[derive(Debug, Clone, Copy)]
pub struct FixStateMachine {
    offset: UtcOffset,
}

impl FixStateMachine {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Decode one text line and apply it. Lines that fail to decode change nothing.
    pub fn ingest(&self, state: &mut FixState, line: &str) {
        match nmea::parse(line) {
            Ok(sentence) => self.apply(state, &sentence),
            Err(e) => trace!("dropped sentence: {} ({:?})", e, line.trim()),
        }
    }

    pub fn apply(&self, state: &mut FixState, sentence: &Sentence) {
        match sentence {
            Sentence::Rmc(rmc) => self.apply_rmc(state, rmc),
            Sentence::Gga(gga) => apply_gga(state, gga),
            Sentence::Vtg(vtg) => apply_vtg(state, vtg),
            Sentence::Other(kind) => trace!("ignoring {} sentence", kind),
        }
    }

    fn apply_rmc(&self, state: &mut FixState, rmc: &Rmc) {
        state.status = rmc.status;

        if let (Some(time), Some(date)) = (rmc.time, rmc.date) {
            match combine(date, time) {
                Some(utc) => {
                    state.utc_time = Some(utc.time());
                    state.local_time = Some(utc.assume_utc().to_offset(self.offset).time());
                }
                None => {
                    state.utc_time = None;
                    state.local_time = None;
                }
            }
        }

        if state.is_active() {
            state.latitude = rmc.latitude.unwrap_or(0.0);
            state.longitude = rmc.longitude.unwrap_or(0.0);
        } else {
            state.latitude = 0.0;
            state.longitude = 0.0;
        }
    }
}

impl Default for FixStateMachine {
    fn default() -> Self {
        Self::new(crate::DEFAULT_TIMEZONE_OFFSET)
    }
}

fn apply_gga(state: &mut FixState, gga: &Gga) {
    if state.is_active() {
        state.num_sats = gga.num_sats.unwrap_or(0);
        state.quality = gga.quality_code.map(FixQuality::from_code).unwrap_or(FixQuality::Unknown);
        state.altitude_m = gga.altitude_m.unwrap_or(0.0);
    } else {
        state.num_sats = 0;
        state.quality = FixQuality::Invalid;
        state.altitude_m = 0.0;
    }
}

fn apply_vtg(state: &mut FixState, vtg: &Vtg) {
    state.speed_kmh = if state.is_active() { vtg.speed_kmh.unwrap_or(0.0) } else { 0.0 };
}

fn combine(date: NmeaDate, time: NmeaTime) -> Option<PrimitiveDateTime> {
    let month = Month::try_from(date.month).ok()?;
    let date = Date::from_calendar_date(date.year, month, date.day).ok()?;
    let time = Time::from_hms_micro(time.hour, time.minute, time.second, time.micros).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{offset, time};

    fn hms(hour: u8, minute: u8, second: u8) -> Option<NmeaTime> {
        Some(NmeaTime { hour, minute, second, micros: 0 })
    }

    fn rmc(status: FixStatus, lat: f64, lon: f64) -> Sentence {
        Sentence::Rmc(Rmc {
            time: hms(12, 0, 0),
            status,
            latitude: Some(lat),
            longitude: Some(lon),
            date: Some(NmeaDate { day: 1, month: 1, year: 2024 }),
        })
    }

    fn gga(code: i32, sats: u32, alt: f64) -> Sentence {
        Sentence::Gga(Gga { quality_code: Some(code), num_sats: Some(sats), altitude_m: Some(alt) })
    }

    fn active_state() -> FixState {
        FixState {
            status: FixStatus::Active,
            latitude: 1.5,
            longitude: -2.5,
            speed_kmh: 40.0,
            num_sats: 9,
            quality: FixQuality::Dgps,
            altitude_m: 800.0,
            ..FixState::default()
        }
    }

    #[test]
    fn test_default_state_is_invalid() {
        let st = FixState::default();
        assert_eq!(st.status, FixStatus::Void);
        assert_eq!(st.quality, FixQuality::Invalid);
        assert_eq!(st.utc_time, None);
        assert_eq!(st.num_sats, 0);
    }

    #[test]
    fn test_quality_table() {
        let labels: Vec<&str> = (0..=8).map(|c| FixQuality::from_code(c).label()).collect();
        assert_eq!(
            labels,
            ["Invalid", "GPS fix", "DGPS fix", "PPS fix", "RTK", "Float RTK", "Estimated", "Manual", "Simulation"]
        );
        for code in [-1, -100, 9, 42, i32::MAX, i32::MIN] {
            assert_eq!(FixQuality::from_code(code), FixQuality::Unknown);
        }
    }

    #[test]
    fn test_void_rmc_zeroes_position() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        m.apply(&mut st, &rmc(FixStatus::Void, 10.0, 20.0));
        assert_eq!(st.status, FixStatus::Void);
        assert_eq!(st.latitude, 0.0);
        assert_eq!(st.longitude, 0.0);
        // other gated fields wait for their own sentences
        assert_eq!(st.num_sats, 9);
        assert_eq!(st.speed_kmh, 40.0);
    }

    #[test]
    fn test_active_rmc_sets_position_and_times() {
        let m = FixStateMachine::new(offset!(-3));
        let mut st = FixState::default();
        m.apply(&mut st, &rmc(FixStatus::Active, 10.123456, 20.654321));
        assert!(st.is_active());
        assert_eq!(st.latitude, 10.123456);
        assert_eq!(st.longitude, 20.654321);
        assert_eq!(st.utc_time, Some(time!(12:00:00)));
        assert_eq!(st.local_time, Some(time!(09:00:00)));
    }

    #[test]
    fn test_local_time_wraps_past_midnight() {
        let m = FixStateMachine::new(offset!(-3));
        let mut st = FixState::default();
        let s = Sentence::Rmc(Rmc {
            time: hms(1, 30, 0),
            status: FixStatus::Active,
            latitude: None,
            longitude: None,
            date: Some(NmeaDate { day: 1, month: 3, year: 2024 }),
        });
        m.apply(&mut st, &s);
        assert_eq!(st.local_time, Some(time!(22:30:00)));
        assert_eq!(st.latitude, 0.0);
    }

    #[test]
    fn test_inconsistent_date_clears_times() {
        let m = FixStateMachine::default();
        let mut st = FixState::default();
        m.apply(&mut st, &rmc(FixStatus::Active, 1.0, 1.0));
        assert!(st.utc_time.is_some());

        let bad = Sentence::Rmc(Rmc {
            time: hms(12, 0, 0),
            status: FixStatus::Active,
            latitude: Some(1.0),
            longitude: Some(1.0),
            date: Some(NmeaDate { day: 31, month: 2, year: 2024 }),
        });
        m.apply(&mut st, &bad);
        assert_eq!(st.utc_time, None);
        assert_eq!(st.local_time, None);
    }

    #[test]
    fn test_out_of_range_time_still_applies_void_status() {
        let m = FixStateMachine::default();
        let mut st = FixState::default();
        m.apply(&mut st, &rmc(FixStatus::Active, 10.123456, 20.654321));
        assert!(st.utc_time.is_some());

        m.ingest(&mut st, "$GPRMC,250000,V,,,,,,,010124");
        assert_eq!(st.status, FixStatus::Void);
        assert_eq!(st.latitude, 0.0);
        assert_eq!(st.longitude, 0.0);
        assert_eq!(st.utc_time, None);
        assert_eq!(st.local_time, None);
    }

    #[test]
    fn test_non_ascii_lines_do_not_panic() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        let before = st.clone();
        m.ingest(&mut st, "$A\u{e9}12,1");
        m.ingest(&mut st, "$GPRMC,120000,A,\u{e9}1.0,N,,,,,010124");
        assert_eq!(st, before);
    }

    #[test]
    fn test_missing_date_keeps_previous_times() {
        let m = FixStateMachine::default();
        let mut st = FixState::default();
        m.apply(&mut st, &rmc(FixStatus::Active, 1.0, 1.0));
        let no_date = Sentence::Rmc(Rmc {
            time: hms(13, 0, 0),
            status: FixStatus::Active,
            latitude: Some(1.0),
            longitude: Some(1.0),
            date: None,
        });
        m.apply(&mut st, &no_date);
        assert_eq!(st.utc_time, Some(time!(12:00:00)));
    }

    #[test]
    fn test_gga_gated_on_current_status() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        st.status = FixStatus::Void;
        m.apply(&mut st, &gga(4, 12, 99.0));
        assert_eq!(st.num_sats, 0);
        assert_eq!(st.quality, FixQuality::Invalid);
        assert_eq!(st.altitude_m, 0.0);
    }

    #[test]
    fn test_gga_while_active() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        m.apply(&mut st, &gga(1, 8, 123.4));
        assert_eq!(st.num_sats, 8);
        assert_eq!(st.quality, FixQuality::Gps);
        assert_eq!(st.altitude_m, 123.4);

        m.apply(&mut st, &gga(12, 8, 123.4));
        assert_eq!(st.quality, FixQuality::Unknown);
    }

    #[test]
    fn test_gga_missing_fields_default() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        m.apply(&mut st, &Sentence::Gga(Gga { quality_code: Some(2), num_sats: None, altitude_m: None }));
        assert_eq!(st.num_sats, 0);
        assert_eq!(st.quality, FixQuality::Dgps);
        assert_eq!(st.altitude_m, 0.0);
    }

    #[test]
    fn test_gga_is_idempotent() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        let s = gga(5, 11, 17.25);
        m.apply(&mut st, &s);
        let once = st.clone();
        m.apply(&mut st, &s);
        assert_eq!(st, once);
    }

    #[test]
    fn test_vtg_gating() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        m.apply(&mut st, &Sentence::Vtg(Vtg { speed_kmh: Some(15.5) }));
        assert_eq!(st.speed_kmh, 15.5);
        m.apply(&mut st, &Sentence::Vtg(Vtg { speed_kmh: None }));
        assert_eq!(st.speed_kmh, 0.0);

        st.speed_kmh = 3.0;
        st.status = FixStatus::Void;
        m.apply(&mut st, &Sentence::Vtg(Vtg { speed_kmh: Some(15.5) }));
        assert_eq!(st.speed_kmh, 0.0);
    }

    #[test]
    fn test_undecodable_and_other_lines_are_noops() {
        let m = FixStateMachine::default();
        let mut st = active_state();
        let before = st.clone();
        m.ingest(&mut st, "garbage");
        m.ingest(&mut st, "$GPVTG,,,,,,,010.2,K*00");
        m.ingest(&mut st, "$GPGSV,3,1,11,03,03,111,00");
        assert_eq!(st, before);
    }
}
