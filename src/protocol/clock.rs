//! # Device Clock (0x99 date, 0x9A time)
//!
//! Both payloads are six bytes, one decimal digit per byte:
//! `DDMMYY` for the date and `HHMMSS` for the time.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use super::fields::check_len;
use crate::error::{Result, ScaleError};

pub const CLOCK_PAYLOAD_LEN: usize = 6;

fn digits(pairs: [u32; 3]) -> [u8; CLOCK_PAYLOAD_LEN] {
    let mut out = [0u8; CLOCK_PAYLOAD_LEN];
    for (i, v) in pairs.iter().enumerate() {
        out[2 * i] = (v / 10 % 10) as u8;
        out[2 * i + 1] = (v % 10) as u8;
    }
    out
}

fn pairs(what: &'static str, bytes: &[u8]) -> Result<[u32; 3]> {
    check_len(what, bytes, CLOCK_PAYLOAD_LEN)?;
    if let Some(b) = bytes.iter().find(|&&b| b > 9) {
        return Err(ScaleError::InvalidValue(format!(
            "{} byte 0x{:02X} is not a decimal digit",
            what, b
        )));
    }
    let mut out = [0u32; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = bytes[2 * i] as u32 * 10 + bytes[2 * i + 1] as u32;
    }
    Ok(out)
}

pub fn encode_date(date: NaiveDate) -> Result<[u8; CLOCK_PAYLOAD_LEN]> {
    if !(2000..=2099).contains(&date.year()) {
        return Err(ScaleError::InvalidValue(format!(
            "year {} outside 2000-2099",
            date.year()
        )));
    }
    Ok(digits([date.day(), date.month(), (date.year() - 2000) as u32]))
}

pub fn decode_date(bytes: &[u8]) -> Result<NaiveDate> {
    let [d, m, y] = pairs("date", bytes)?;
    NaiveDate::from_ymd_opt(2000 + y as i32, m, d).ok_or_else(|| {
        ScaleError::InvalidValue(format!("{:02}.{:02}.{:02} is not a date", d, m, y))
    })
}

pub fn encode_time(time: NaiveTime) -> [u8; CLOCK_PAYLOAD_LEN] {
    digits([time.hour(), time.minute(), time.second()])
}

pub fn decode_time(bytes: &[u8]) -> Result<NaiveTime> {
    let [h, m, s] = pairs("time", bytes)?;
    NaiveTime::from_hms_opt(h, m, s).ok_or_else(|| {
        ScaleError::InvalidValue(format!("{:02}:{:02}:{:02} is not a time", h, m, s))
    })
}
