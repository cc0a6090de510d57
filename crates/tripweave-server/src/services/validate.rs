//! Input normalisation shared by the trip, itinerary and budget operations.

use chrono::{DateTime, Duration, NaiveDate};

use crate::error::{AppError, AppResult};

pub const DAY_FORMAT: &str = "%Y-%m-%d";
pub const MAX_TRIP_DAYS: i64 = 365;
/// Largest single money amount accepted, in minor units (100 billion).
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000_000;

/// Parses a calendar day from `YYYY-MM-DD` or an RFC 3339 timestamp.
/// Time of day is dropped; a timestamp keeps the date in its own offset.
pub fn parse_day(value: &str) -> AppResult<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DAY_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| AppError::Validation(format!("Invalid date: {value}")))
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Normalises an optional day input; blank strings clear the value.
pub fn parse_optional_day(value: Option<&str>) -> AppResult<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_day(v).map(Some),
    }
}

pub fn check_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(
                "End date cannot be before start date".into(),
            ));
        }
        if (end - start).num_days() >= MAX_TRIP_DAYS {
            return Err(AppError::Validation(format!(
                "Trips can span at most {MAX_TRIP_DAYS} days"
            )));
        }
    }
    Ok(())
}

/// Every day from `start` to `end`, inclusive.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        current += Duration::days(1);
    }
    days
}

/// Upper-cases a three-letter currency code.
pub fn normalize_currency(code: &str) -> AppResult<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(AppError::Validation(format!("Invalid currency code: {code}")))
    }
}

pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AppError::Validation("Invalid email address".into()))
    }
}

pub fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> AppResult<()> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lng))
            if lat.is_finite()
                && lng.is_finite()
                && (-90.0..=90.0).contains(&lat)
                && (-180.0..=180.0).contains(&lng) =>
        {
            Ok(())
        }
        _ => Err(AppError::Validation("Invalid coordinates".into())),
    }
}

/// Trims optional free text, mapping blank to `None`.
pub fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
