//! Epochs and sky coordinates
//!
//! [`Mjd`] keeps integer day, integer second and fractional second apart so
//! that the start-time keywords of a container (integer day, integer
//! second, fractional offset) round-trip without loss.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in one day
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Modified Julian Date split into day, second of day and fraction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Mjd {
    day: i64,
    secs: u32,
    frac: f64,
}

impl Mjd {
    /// Build from parts; `secs < 86400` and `0 <= frac < 1`
    pub fn new(day: i64, secs: u32, frac: f64) -> Result<Self> {
        if secs >= SECONDS_PER_DAY {
            return Err(Error::invalid_param(format!(
                "second of day {} out of range",
                secs
            )));
        }
        if !frac.is_finite() || !(0.0..1.0).contains(&frac) {
            return Err(Error::invalid_param(format!(
                "fractional second {} out of range",
                frac
            )));
        }
        Ok(Mjd { day, secs, frac })
    }

    /// Build from a (possibly fractional) day number
    pub fn from_days(days: f64) -> Self {
        let whole = days.floor();
        Mjd {
            day: whole as i64,
            secs: 0,
            frac: 0.0,
        }
        .add_seconds((days - whole) * SECONDS_PER_DAY as f64)
    }

    /// Integer day
    pub fn day(&self) -> i64 {
        self.day
    }

    /// Integer second of day
    pub fn secs(&self) -> u32 {
        self.secs
    }

    /// Fractional second
    pub fn frac(&self) -> f64 {
        self.frac
    }

    /// Day number as a float (loses sub-microsecond precision)
    pub fn as_days(&self) -> f64 {
        self.day as f64 + (self.secs as f64 + self.frac) / SECONDS_PER_DAY as f64
    }

    /// Shift by a number of seconds (may be negative)
    pub fn add_seconds(self, seconds: f64) -> Self {
        let total = self.secs as f64 + self.frac + seconds;
        let whole = total.floor();
        let mut frac = total - whole;
        let mut whole = whole as i64;
        if frac >= 1.0 {
            frac -= 1.0;
            whole += 1;
        }
        let per_day = SECONDS_PER_DAY as i64;
        Mjd {
            day: self.day + whole.div_euclid(per_day),
            secs: whole.rem_euclid(per_day) as u32,
            frac,
        }
    }

    /// Seconds elapsed from `earlier` to `self`
    pub fn seconds_since(&self, earlier: &Mjd) -> f64 {
        let days = (self.day - earlier.day) as f64 * SECONDS_PER_DAY as f64;
        let secs = self.secs as f64 - earlier.secs as f64;
        days + secs + (self.frac - earlier.frac)
    }

    fn epoch() -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(1858, 11, 17)?.and_hms_opt(0, 0, 0)
    }

    /// Calendar date-time in UTC, if representable
    pub fn to_utc(&self) -> Option<NaiveDateTime> {
        if self.day.abs() > 10_000_000 {
            return None;
        }
        let base = Self::epoch()?;
        let nanos = (self.frac * 1e9).floor() as i64;
        base.checked_add_signed(chrono::Duration::days(self.day))?
            .checked_add_signed(chrono::Duration::seconds(self.secs as i64))?
            .checked_add_signed(chrono::Duration::nanoseconds(nanos))
    }

    /// Build from a calendar date-time in UTC
    pub fn from_utc(dt: NaiveDateTime) -> Result<Self> {
        let base = Self::epoch().ok_or_else(|| Error::invalid_state("MJD epoch"))?;
        let day = (dt.date() - base.date()).num_days();
        let time = dt.time();
        Mjd::new(
            day,
            time.num_seconds_from_midnight(),
            time.nanosecond() as f64 / 1e9,
        )
    }

    /// UTC date as `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.to_utc()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    /// UTC time of day as `hh:mm:ss`
    pub fn time_string(&self) -> String {
        self.to_utc()
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for Mjd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.15}", self.as_days())
    }
}

/// Reference frame of a [`SkyCoord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frame {
    /// Right ascension / declination, J2000
    #[default]
    Equatorial,
    /// Galactic longitude / latitude
    Galactic,
}

/// A position on the sky in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkyCoord {
    /// Frame the angles are expressed in
    pub frame: Frame,
    /// Right ascension or galactic longitude, degrees
    pub lon_deg: f64,
    /// Declination or galactic latitude, degrees
    pub lat_deg: f64,
}

const MICRO: f64 = 1e6;

impl SkyCoord {
    /// Equatorial position
    pub fn equatorial(ra_deg: f64, dec_deg: f64) -> Self {
        SkyCoord {
            frame: Frame::Equatorial,
            lon_deg: ra_deg,
            lat_deg: dec_deg,
        }
    }

    /// Galactic position
    pub fn galactic(l_deg: f64, b_deg: f64) -> Self {
        SkyCoord {
            frame: Frame::Galactic,
            lon_deg: l_deg,
            lat_deg: b_deg,
        }
    }

    /// Longitude as `hh:mm:ss.ssssss` (hours of right ascension)
    pub fn lon_hms(&self) -> String {
        format_sexagesimal(self.lon_deg.rem_euclid(360.0) / 15.0, false)
    }

    /// Latitude as `+dd:mm:ss.ssssss`
    pub fn lat_dms(&self) -> String {
        format_sexagesimal(self.lat_deg, true)
    }

    /// Parse `hh:mm:ss.s` into degrees
    pub fn parse_hms(text: &str) -> Result<f64> {
        Ok(parse_sexagesimal(text)? * 15.0)
    }

    /// Parse `[+-]dd:mm:ss.s` into degrees
    pub fn parse_dms(text: &str) -> Result<f64> {
        parse_sexagesimal(text)
    }
}

fn format_sexagesimal(value: f64, signed: bool) -> String {
    // integer micro-units so seconds never print as 60
    let micros = (value.abs() * 3600.0 * MICRO).round() as u64;
    let unit = 3600 * MICRO as u64;
    let whole = micros / unit;
    let rest = micros % unit;
    let minutes = rest / (60 * MICRO as u64);
    let sec_micros = rest % (60 * MICRO as u64);
    let sign = if value < 0.0 && micros > 0 {
        "-"
    } else if signed {
        "+"
    } else {
        ""
    };
    format!(
        "{}{:02}:{:02}:{:02}.{:06}",
        sign,
        whole,
        minutes,
        sec_micros / MICRO as u64,
        sec_micros % MICRO as u64
    )
}

fn parse_sexagesimal(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let mut value = 0.0;
    let mut scale = 1.0;
    let mut parts = 0;
    for part in body.split(':') {
        parts += 1;
        if parts > 3 {
            return Err(Error::invalid_param(format!("bad sexagesimal '{}'", text)));
        }
        let field: f64 = part
            .parse()
            .map_err(|_| Error::invalid_param(format!("bad sexagesimal '{}'", text)))?;
        value += field / scale;
        scale *= 60.0;
    }
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_seconds_rolls_over_day() {
        let start = Mjd::new(55000, 86_399, 0.5).unwrap();
        let later = start.add_seconds(1.0);
        assert_eq!(later.day(), 55001);
        assert_eq!(later.secs(), 0);
        assert!((later.frac() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_add_negative_seconds() {
        let start = Mjd::new(55000, 0, 0.25).unwrap();
        let earlier = start.add_seconds(-0.5);
        assert_eq!(earlier.day(), 54999);
        assert_eq!(earlier.secs(), 86_399);
        assert!((earlier.frac() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_since_inverts_add() {
        let start = Mjd::new(56123, 4000, 0.125).unwrap();
        let later = start.add_seconds(12_345.0);
        assert_eq!(later.seconds_since(&start), 12_345.0);
        assert_eq!(start.add_seconds(later.seconds_since(&start)), later);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Mjd::new(1, SECONDS_PER_DAY, 0.0).is_err());
        assert!(Mjd::new(1, 0, 1.0).is_err());
        assert!(Mjd::new(1, 0, f64::NAN).is_err());
    }

    #[test]
    fn test_utc_round_trip() {
        let mjd = Mjd::new(58_000, 3_661, 0.0).unwrap();
        assert_eq!(mjd.date_string(), "2017-09-04");
        assert_eq!(mjd.time_string(), "01:01:01");
        let back = Mjd::from_utc(mjd.to_utc().unwrap()).unwrap();
        assert_eq!(back, mjd);
    }

    #[test]
    fn test_hms_round_trip() {
        let coord = SkyCoord::equatorial(83.633_212, -22.014_5);
        let ra = SkyCoord::parse_hms(&coord.lon_hms()).unwrap();
        let dec = SkyCoord::parse_dms(&coord.lat_dms()).unwrap();
        assert!((ra - coord.lon_deg).abs() < 1e-8);
        assert!((dec - coord.lat_deg).abs() < 1e-8);
        assert!(coord.lat_dms().starts_with('-'));
    }

    #[test]
    fn test_sexagesimal_never_prints_sixty_seconds() {
        let coord = SkyCoord::equatorial(15.0 * (1.0 - 1e-12), 0.0);
        assert_eq!(coord.lon_hms(), "01:00:00.000000");
        assert_eq!(coord.lat_dms(), "+00:00:00.000000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SkyCoord::parse_hms("12:xx:00").is_err());
        assert!(SkyCoord::parse_dms("1:2:3:4").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_seconds_since_inverts_add(
            day in 40_000i64..70_000,
            secs in 0u32..SECONDS_PER_DAY,
            offset in -1.0e6f64..1.0e6,
        ) {
            let start = Mjd::new(day, secs, 0.0).unwrap();
            let later = start.add_seconds(offset);
            proptest::prop_assert!(later.secs() < SECONDS_PER_DAY);
            proptest::prop_assert!((0.0..1.0).contains(&later.frac()));
            proptest::prop_assert!((later.seconds_since(&start) - offset).abs() < 1e-6);
        }
    }
}
