//! Per-field validators. Each takes the raw extracted text and returns the
//! normalized value or the specific constraint it violated.

use chrono::{Datelike, NaiveDate};

use crate::availability::match_key;

use super::model::IntakeField;

/// Oldest plausible patient age, in years.
pub const MAX_AGE_YEARS: i32 = 130;

/// Date formats accepted for date of birth, tried in order.
const DOB_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y"];

/// A candidate value that failed its field's constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub field: IntakeField,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: IntakeField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Name: non-empty, not purely numeric, must contain a letter.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = collapse_whitespace(raw);
    if name.is_empty() {
        return Err(ValidationError::new(IntakeField::Name, "name must not be empty"));
    }
    if name.chars().filter(|c| !c.is_whitespace()).all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            IntakeField::Name,
            "name must not be purely numeric",
        ));
    }
    if !name.chars().any(char::is_alphabetic) {
        return Err(ValidationError::new(
            IntakeField::Name,
            "name must contain letters",
        ));
    }
    Ok(name)
}

/// Parse a date of birth in one of the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = collapse_whitespace(raw);
    DOB_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
}

/// Date of birth: a real calendar date, not after `today`, and no more than
/// [`MAX_AGE_YEARS`] years before it. Normalized to `YYYY-MM-DD`.
pub fn validate_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let field = IntakeField::DateOfBirth;
    let dob = parse_date(raw).ok_or_else(|| {
        ValidationError::new(
            field,
            "date of birth must be a valid calendar date (for example 1990-04-02)",
        )
    })?;
    if dob > today {
        return Err(ValidationError::new(
            field,
            "date of birth must be a valid past calendar date",
        ));
    }
    if age_on(dob, today) > MAX_AGE_YEARS {
        return Err(ValidationError::new(
            field,
            format!("date of birth implies an age over {MAX_AGE_YEARS} years"),
        ));
    }
    Ok(dob)
}

/// Whole years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

/// Catalog comparison key. A leading "the" is optional on either side.
fn catalog_key(s: &str) -> String {
    let key = match_key(s);
    match key.strip_prefix("the ") {
        Some(rest) => rest.to_string(),
        None => key,
    }
}

/// Doctor or location: matched against `known` ignoring case, punctuation
/// and a leading "the", normalized to the catalog spelling. With
/// `open_ended` any non-empty text is accepted as given.
pub fn validate_catalog_entry(
    field: IntakeField,
    raw: &str,
    known: &[String],
    open_ended: bool,
) -> Result<String, ValidationError> {
    let noun = field.label().to_lowercase();
    let value = collapse_whitespace(raw);
    if match_key(&value).is_empty() {
        return Err(ValidationError::new(field, format!("{noun} must not be empty")));
    }
    let key = catalog_key(&value);
    if let Some(entry) = known.iter().find(|k| catalog_key(k) == key) {
        return Ok(entry.clone());
    }
    if open_ended {
        return Ok(value);
    }
    Err(ValidationError::new(
        field,
        format!(
            "{noun} \"{value}\" is not recognized; choose one of: {}",
            known.join(", ")
        ),
    ))
}

/// Insurance provider: any non-empty text.
pub fn validate_insurance_provider(raw: &str) -> Result<String, ValidationError> {
    let provider = collapse_whitespace(raw);
    if provider.is_empty() {
        return Err(ValidationError::new(
            IntakeField::InsuranceProvider,
            "insurance provider must not be empty",
        ));
    }
    Ok(provider)
}

/// Insurance ID: ASCII letters and digits only, at least `min_length` long.
/// Normalized to upper case.
pub fn validate_insurance_id(raw: &str, min_length: usize) -> Result<String, ValidationError> {
    let field = IntakeField::InsuranceId;
    let id = raw.trim();
    if id.is_empty() {
        return Err(ValidationError::new(field, "insurance ID must not be empty"));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            field,
            "insurance ID must contain only letters and digits",
        ));
    }
    if id.chars().count() < min_length {
        return Err(ValidationError::new(
            field,
            format!("insurance ID must be at least {min_length} characters long"),
        ));
    }
    Ok(id.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn catalog() -> Vec<String> {
        vec!["Dr. Smith".to_string(), "Dr. Iyer".to_string()]
    }

    #[test]
    fn name_is_trimmed_and_collapsed() {
        assert_eq!(validate_name("  Jane    Doe ").unwrap(), "Jane Doe");
    }

    #[test]
    fn name_rejects_empty_and_numeric() {
        assert_eq!(
            validate_name("   ").unwrap_err().reason,
            "name must not be empty"
        );
        assert_eq!(
            validate_name("12345").unwrap_err().reason,
            "name must not be purely numeric"
        );
        assert!(validate_name("!!!").is_err());
        assert!(validate_name("Jane 2nd").is_ok());
    }

    #[test]
    fn dob_accepts_several_formats() {
        let expected = NaiveDate::from_ymd_opt(1990, 4, 2).unwrap();
        for raw in ["1990-04-02", "1990/04/02", "April 2, 1990", "Apr 2 1990", "2 April 1990"] {
            assert_eq!(validate_date_of_birth(raw, today()).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn dob_rejects_future_dates() {
        let err = validate_date_of_birth("2099-01-01", today()).unwrap_err();
        assert_eq!(err.field, IntakeField::DateOfBirth);
        assert_eq!(err.reason, "date of birth must be a valid past calendar date");
    }

    #[test]
    fn dob_rejects_impossible_dates() {
        assert!(validate_date_of_birth("1990-02-30", today()).is_err());
        assert!(validate_date_of_birth("yesterday", today()).is_err());
    }

    #[test]
    fn dob_age_bounds() {
        // Turning 131 tomorrow is still 130; turning 131 today is not.
        assert!(validate_date_of_birth("1895-10-17", today()).is_ok());
        let err = validate_date_of_birth("1895-10-16", today()).unwrap_err();
        assert!(err.reason.contains("130"));
        // Born today is age zero.
        assert!(validate_date_of_birth("2026-10-16", today()).is_ok());
    }

    #[test]
    fn age_counts_whole_years() {
        let dob = NaiveDate::from_ymd_opt(1990, 10, 17).unwrap();
        assert_eq!(age_on(dob, today()), 35);
        let dob = NaiveDate::from_ymd_opt(1990, 10, 16).unwrap();
        assert_eq!(age_on(dob, today()), 36);
    }

    #[test]
    fn catalog_match_normalizes_spelling() {
        let known = catalog();
        assert_eq!(
            validate_catalog_entry(IntakeField::Doctor, "dr smith", &known, false).unwrap(),
            "Dr. Smith"
        );
        assert_eq!(
            validate_catalog_entry(IntakeField::Doctor, "DR. IYER", &known, false).unwrap(),
            "Dr. Iyer"
        );
    }

    #[test]
    fn catalog_article_is_optional() {
        let known = vec!["The Harbor Clinic".to_string(), "Downtown Clinic".to_string()];
        for reply in ["The Harbor Clinic", "the harbor clinic", "Harbor Clinic"] {
            assert_eq!(
                validate_catalog_entry(IntakeField::Location, reply, &known, false).unwrap(),
                "The Harbor Clinic",
                "{reply}"
            );
        }
        assert_eq!(
            validate_catalog_entry(IntakeField::Location, "the Downtown Clinic", &known, false)
                .unwrap(),
            "Downtown Clinic"
        );
        // A bare "the" is not a location.
        assert!(validate_catalog_entry(IntakeField::Location, "the", &known, false).is_err());
    }

    #[test]
    fn catalog_unknown_lists_alternatives() {
        let err =
            validate_catalog_entry(IntakeField::Doctor, "Dr. Who", &catalog(), false).unwrap_err();
        assert!(err.reason.contains("Dr. Smith, Dr. Iyer"), "{}", err.reason);
        assert!(err.reason.starts_with("doctor \"Dr. Who\""));
    }

    #[test]
    fn catalog_open_ended_accepts_free_text() {
        assert_eq!(
            validate_catalog_entry(IntakeField::Location, " Harbor   Clinic ", &catalog(), true)
                .unwrap(),
            "Harbor Clinic"
        );
        // Known entries still normalize in open-ended mode.
        assert_eq!(
            validate_catalog_entry(IntakeField::Doctor, "dr. smith", &catalog(), true).unwrap(),
            "Dr. Smith"
        );
        assert!(validate_catalog_entry(IntakeField::Location, " - ", &catalog(), true).is_err());
    }

    #[test]
    fn insurance_provider_non_empty() {
        assert_eq!(validate_insurance_provider(" Acme   Health ").unwrap(), "Acme Health");
        assert!(validate_insurance_provider("").is_err());
    }

    #[test]
    fn insurance_id_rules() {
        assert_eq!(validate_insurance_id("ah12345", 4).unwrap(), "AH12345");
        assert!(validate_insurance_id("AH-123", 4)
            .unwrap_err()
            .reason
            .contains("letters and digits"));
        assert_eq!(
            validate_insurance_id("A1", 4).unwrap_err().reason,
            "insurance ID must be at least 4 characters long"
        );
        assert!(validate_insurance_id("AB12", 4).is_ok());
        assert!(validate_insurance_id("AB12", 6).is_err());
        assert!(validate_insurance_id("  ", 4).is_err());
    }
}
