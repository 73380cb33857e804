use thiserror::Error;

use crate::fix::FixStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("sentence is not ASCII")]
    NotAscii,
    #[error("sentence does not start with '$'")]
    MissingStart,
    #[error("empty sentence address")]
    EmptyAddress,
    #[error("malformed checksum {0:?}")]
    MalformedChecksum(String),
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    ChecksumMismatch { expected: u8, computed: u8 },
    #[error("invalid {field} field {value:?}")]
    BadField { field: &'static str, value: String },
}

/// Calendar date exactly as the receiver sent it. Validated only when it is
/// combined with a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmeaDate {
    pub day: u8,
    pub month: u8,
    pub year: i32,
}

/// Time of day exactly as the receiver sent it; range-checked together with the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmeaTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rmc {
    pub time: Option<NmeaTime>,
    pub status: FixStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date: Option<NmeaDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gga {
    pub quality_code: Option<i32>,
    pub num_sats: Option<u32>,
    pub altitude_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vtg {
    pub speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Rmc(Rmc),
    Gga(Gga),
    Vtg(Vtg),
    /// Well-formed sentence of a kind we do not track (GSV, GSA, proprietary...).
    Other(String),
}

/// Raw bytes from the wire to text. Anything that is not ASCII is dropped.
pub fn decode_ascii(bytes: &[u8]) -> Option<&str> {
    if !bytes.is_ascii() {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

pub fn parse(line: &str) -> Result<Sentence, ParseError> {
    if !line.is_ascii() {
        return Err(ParseError::NotAscii);
    }
    let line = line.trim();
    let body = line.strip_prefix('$').ok_or(ParseError::MissingStart)?;

    let body = match body.split_once('*') {
        Some((data, cs)) => {
            verify_checksum(data, cs)?;
            data
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let address = fields[0];
    if address.is_empty() {
        return Err(ParseError::EmptyAddress);
    }

    // Talker (2 chars) + sentence type (3 chars). Proprietary ($P...) never matches.
    let kind = if address.len() == 5 && !address.starts_with('P') { &address[2..] } else { "" };
    match kind {
        "RMC" => parse_rmc(&fields).map(Sentence::Rmc),
        "GGA" => parse_gga(&fields).map(Sentence::Gga),
        "VTG" => parse_vtg(&fields).map(Sentence::Vtg),
        _ => Ok(Sentence::Other(address.to_string())),
    }
}

fn verify_checksum(data: &str, cs: &str) -> Result<(), ParseError> {
    if cs.len() != 2 {
        return Err(ParseError::MalformedChecksum(cs.to_string()));
    }
    let expected = u8::from_str_radix(cs, 16)
        .map_err(|_| ParseError::MalformedChecksum(cs.to_string()))?;
    let computed = data.bytes().fold(0u8, |acc, b| acc ^ b);
    if expected != computed {
        return Err(ParseError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}

// fields[1]=time, [2]=status, [3]/[4]=lat+N/S, [5]/[6]=lon+E/W, [9]=date
fn parse_rmc(f: &[&str]) -> Result<Rmc, ParseError> {
    let status = match field(f, 2) {
        Some("A") => FixStatus::Active,
        _ => FixStatus::Void,
    };
    Ok(Rmc {
        time: field(f, 1).map(parse_time).transpose()?,
        status,
        latitude: parse_coord(f, 3, "latitude")?,
        longitude: parse_coord(f, 5, "longitude")?,
        date: field(f, 9).map(parse_date).transpose()?,
    })
}

// fields[6]=quality, [7]=satellites, [9]=altitude (meters)
fn parse_gga(f: &[&str]) -> Result<Gga, ParseError> {
    Ok(Gga {
        quality_code: parse_num(f, 6, "quality")?,
        num_sats: parse_num(f, 7, "satellites")?,
        altitude_m: parse_num(f, 9, "altitude")?,
    })
}

// fields[7]=ground speed km/h
fn parse_vtg(f: &[&str]) -> Result<Vtg, ParseError> {
    Ok(Vtg { speed_kmh: parse_num(f, 7, "speed_kmh")? })
}

fn field<'a>(f: &[&'a str], idx: usize) -> Option<&'a str> {
    f.get(idx).copied().filter(|s| !s.is_empty())
}

fn bad(field: &'static str, value: &str) -> ParseError {
    ParseError::BadField { field, value: value.to_string() }
}

fn parse_num<T: std::str::FromStr>(f: &[&str], idx: usize, name: &'static str) -> Result<Option<T>, ParseError> {
    field(f, idx)
        .map(|v| v.parse::<T>().map_err(|_| bad(name, v)))
        .transpose()
}

// hhmmss or hhmmss.sss
fn parse_time(v: &str) -> Result<NmeaTime, ParseError> {
    let (hms, frac) = v.split_once('.').unwrap_or((v, ""));
    if hms.len() != 6 || !hms.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad("time", v));
    }
    let h: u8 = hms[0..2].parse().map_err(|_| bad("time", v))?;
    let m: u8 = hms[2..4].parse().map_err(|_| bad("time", v))?;
    let s: u8 = hms[4..6].parse().map_err(|_| bad("time", v))?;

    let micros = if frac.is_empty() {
        0
    } else {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad("time", v));
        }
        // pad/truncate to 6 digits
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
        digits.parse::<u32>().map_err(|_| bad("time", v))?
    };

    Ok(NmeaTime { hour: h, minute: m, second: s, micros })
}

// ddmmyy
fn parse_date(v: &str) -> Result<NmeaDate, ParseError> {
    if v.len() != 6 || !v.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad("date", v));
    }
    let day: u8 = v[0..2].parse().map_err(|_| bad("date", v))?;
    let month: u8 = v[2..4].parse().map_err(|_| bad("date", v))?;
    let yy: i32 = v[4..6].parse().map_err(|_| bad("date", v))?;
    let year = if yy >= 69 { 1900 + yy } else { 2000 + yy };
    Ok(NmeaDate { day, month, year })
}

fn parse_coord(f: &[&str], idx: usize, name: &'static str) -> Result<Option<f64>, ParseError> {
    let Some(v) = field(f, idx) else { return Ok(None) };
    let hemi = field(f, idx + 1).unwrap_or("");
    parse_deg_min(v, hemi).map(Some).ok_or_else(|| bad(name, v))
}

/// `ddmm.mmmm` / `dddmm.mmmm`: the last two integer digits start the minutes.
fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    let int_len = v.find('.').unwrap_or(v.len());
    if int_len < 3 {
        return None;
    }
    let deg_len = int_len - 2;
    let deg: f64 = v[..deg_len].parse().ok()?;
    let min: f64 = v[deg_len..].parse().ok()?;
    if !(0.0..60.0).contains(&min) {
        return None;
    }
    let mut out = deg + min / 60.0;
    if hemi == "S" || hemi == "W" {
        out = -out;
    }
    Some(out)
}
