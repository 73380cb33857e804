use anyhow::Result;
use crate::{GnssConfig, ReportConfig};

pub fn check_gnss(cfg: &GnssConfig) -> Result<()> {
    match cfg.source.as_str() {
        "nmea-serial" => {
            anyhow::ensure!(cfg.nmea_device.as_ref().map(|s| !s.is_empty()).unwrap_or(false), "gnss.nmea_device missing");
            anyhow::ensure!(cfg.baud > 0, "gnss.baud invalid");
        }
        "nmea-file" => {
            let path = cfg.nmea_file.as_deref().unwrap_or("");
            anyhow::ensure!(!path.is_empty(), "gnss.nmea_file missing");
            anyhow::ensure!(std::path::Path::new(path).exists(), "gnss.nmea_file not found: {}", path);
        }
        other => anyhow::bail!("unknown gnss.source: {}", other),
    }
    anyhow::ensure!((100..=10_000).contains(&cfg.read_timeout_ms), "gnss.read_timeout_ms should be 100..10000");
    Ok(())
}

pub fn check_report(cfg: &ReportConfig) -> Result<()> {
    anyhow::ensure!((-12..=14).contains(&cfg.timezone_offset_hours), "report.timezone_offset_hours should be -12..14");
    anyhow::ensure!(cfg.full_report_interval_s >= 1, "report.full_report_interval_s too low");
    anyhow::ensure!(cfg.waiting_notice_interval_s >= 1, "report.waiting_notice_interval_s too low");
    anyhow::ensure!(
        cfg.waiting_notice_interval_s <= cfg.full_report_interval_s,
        "report.waiting_notice_interval_s should not exceed full_report_interval_s"
    );
    Ok(())
}
