pub mod doctor;
pub mod fix;
pub mod gnss;
pub mod nmea;
pub mod report;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use time::UtcOffset;

pub const DEFAULT_TIMEZONE_OFFSET: UtcOffset = time::macros::offset!(-3);
pub const DEFAULT_FULL_REPORT_INTERVAL_S: u64 = 30;
pub const DEFAULT_WAITING_NOTICE_INTERVAL_S: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GnssConfig {
    /// "nmea-serial" | "nmea-file"
    pub source: String,
    pub nmea_device: Option<String>,
    pub nmea_file: Option<String>,
    pub baud: u32,

    /// Upper bound on one blocking line read; the loop proceeds without a line after it.
    pub read_timeout_ms: u64,

    /// nmea-file only: delay between replayed lines (0 = as fast as possible)
    pub replay_interval_ms: u64,
    /// nmea-file only: keep polling for appended lines instead of stopping at EOF
    pub follow: bool,
}

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            source: "nmea-serial".into(),
            nmea_device: Some("/dev/ttyS0".into()),
            nmea_file: None,
            baud: 9600,
            read_timeout_ms: 1000,
            replay_interval_ms: 0,
            follow: false,
        }
    }
}

impl GnssConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn open(&self) -> Result<gnss::GnssSource> {
        match self.source.as_str() {
            "nmea-serial" => {
                let dev = self.nmea_device.as_deref().context("gnss.nmea_device missing")?;
                gnss::GnssSource::serial(dev, self.baud)
            }
            "nmea-file" => {
                let path = self.nmea_file.as_deref().context("gnss.nmea_file missing")?;
                let pace = (self.replay_interval_ms > 0).then(|| Duration::from_millis(self.replay_interval_ms));
                gnss::GnssSource::file(path, self.follow, pace)
            }
            other => anyhow::bail!("unknown gnss.source: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Shift applied to the receiver's UTC time to get local time.
    pub timezone_offset_hours: i8,
    pub full_report_interval_s: u64,
    pub waiting_notice_interval_s: u64,
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timezone_offset_hours: -3,
            full_report_interval_s: DEFAULT_FULL_REPORT_INTERVAL_S,
            waiting_notice_interval_s: DEFAULT_WAITING_NOTICE_INTERVAL_S,
            format: ReportFormat::Text,
        }
    }
}

impl ReportConfig {
    pub fn timezone_offset(&self) -> Result<UtcOffset> {
        UtcOffset::from_hms(self.timezone_offset_hours, 0, 0)
            .with_context(|| format!("report.timezone_offset_hours out of range: {}", self.timezone_offset_hours))
    }

    pub fn state_machine(&self) -> Result<fix::FixStateMachine> {
        Ok(fix::FixStateMachine::new(self.timezone_offset()?))
    }

    pub fn scheduler(&self) -> report::ReportScheduler {
        report::ReportScheduler::new(
            Duration::from_secs(self.full_report_interval_s),
            Duration::from_secs(self.waiting_notice_interval_s),
        )
    }
}
