//! Conversions between the stored `DD/MM/YYYY` form and ISO `YYYY-MM-DD`.
//!
//! Malformed input produces an empty string instead of an error.

use chrono::NaiveDate;

const DISPLAY_FORMAT: &str = "%d/%m/%Y";
const ISO_FORMAT: &str = "%Y-%m-%d";

pub fn ddmmyyyy_to_iso(date: &str) -> String {
    let date = date.trim();
    if date.is_empty() {
        return String::new();
    }
    if is_iso(date) {
        return date.to_string();
    }

    match split_numeric(date, '/') {
        Some([day, month, year]) => to_date(year, month, day)
            .map(|d| d.format(ISO_FORMAT).to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

pub fn iso_to_ddmmyyyy(date: &str) -> String {
    let date = date.trim();
    if date.is_empty() {
        return String::new();
    }
    if is_ddmmyyyy(date) {
        return date.to_string();
    }

    match split_numeric(date, '-') {
        Some([year, month, day]) => to_date(year, month, day)
            .map(|d| d.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

pub fn format_for_display(date: Option<&str>) -> String {
    let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) else {
        return "Not set".to_string();
    };
    if is_ddmmyyyy(date) {
        return date.to_string();
    }
    if is_iso(date) {
        let converted = iso_to_ddmmyyyy(date);
        if !converted.is_empty() {
            return converted;
        }
    }
    date.to_string()
}

fn is_ddmmyyyy(date: &str) -> bool {
    has_shape(date, &[2, 2, 4], '/') && NaiveDate::parse_from_str(date, DISPLAY_FORMAT).is_ok()
}

fn is_iso(date: &str) -> bool {
    has_shape(date, &[4, 2, 2], '-') && NaiveDate::parse_from_str(date, ISO_FORMAT).is_ok()
}

fn has_shape(date: &str, widths: &[usize; 3], sep: char) -> bool {
    let parts: Vec<&str> = date.split(sep).collect();
    parts.len() == 3
        && parts
            .iter()
            .zip(widths)
            .all(|(part, width)| part.len() == *width && part.bytes().all(|b| b.is_ascii_digit()))
}

fn split_numeric(date: &str, sep: char) -> Option<[u32; 3]> {
    let mut parts = date.split(sep);
    let mut out = [0u32; 3];
    for slot in &mut out {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn to_date(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1000..=9999).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}
