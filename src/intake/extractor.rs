//! Field extraction: pulls a candidate value out of free-form chat text.
//!
//! Extraction only finds *candidates*; whether a candidate is acceptable is
//! decided by the validators. The default [`RuleExtractor`] is pure pattern
//! matching, no LLM calls. Labelled input such as `dob=1990-04-02` or
//! `Doctor: Dr. Smith` is honoured for every field.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use super::model::IntakeField;

/// How the user referred to an offered slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReference {
    /// 1-based position in the offered list.
    Index(usize),
    /// A start time, optionally pinned to a date.
    Time {
        date: Option<NaiveDate>,
        time: NaiveTime,
    },
}

/// Pluggable extraction strategy, one capability per kind of answer.
pub trait FieldExtractor: Send + Sync {
    /// Candidate text for a patient field, or `None` if the utterance holds none.
    fn extract_field(&self, field: IntakeField, utterance: &str) -> Option<String>;

    /// Which offered slot the user picked.
    fn extract_slot(&self, utterance: &str) -> Option<SlotReference>;

    /// An explicit yes (`true`) or no (`false`). Ambiguous input is `None`.
    fn extract_answer(&self, utterance: &str) -> Option<bool>;
}

const MONTH: &str = r"(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?";

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "confirmed", "correct",
    "absolutely", "perfect", "great", "book",
];

const NEGATIVE: &[&str] = &[
    "no", "n", "nope", "nah", "cancel", "different", "another", "change", "other",
];

const ORDINALS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

/// Regex/rule based extractor.
pub struct RuleExtractor {
    name_label: Regex,
    dob_label: Regex,
    doctor_label: Regex,
    location_label: Regex,
    provider_label: Regex,
    id_label: Regex,
    name_lead_in: Regex,
    doctor_lead_in: Regex,
    location_lead_in: Regex,
    provider_lead_in: Regex,
    id_lead_in: Regex,
    iso_date: Regex,
    month_first_date: Regex,
    day_first_date: Regex,
    ordinal_suffix: Regex,
    month_word: Regex,
    courtesy: Regex,
    clock_time: Regex,
    meridiem_time: Regex,
    slot_number: Regex,
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor {
    pub fn new() -> Self {
        let label = |names: &str| {
            Regex::new(&format!(r"(?i)\b(?:{names})\s*[:=]\s*([^,;\n]+)")).unwrap()
        };
        let lead_in =
            |phrases: &str| Regex::new(&format!(r"(?i)^(?:{phrases})(?:\s+|$)")).unwrap();

        Self {
            name_label: label("full name|patient name|name"),
            dob_label: label("date of birth|birth date|birthdate|dob|born"),
            doctor_label: label("doctor|physician"),
            location_label: label("location|clinic|branch|site"),
            provider_label: label("insurance provider|insurance company|insurer|carrier|insurance|provider"),
            id_label: label("insurance id|member id|member number|policy number|policy id|id"),
            name_lead_in: lead_in(
                r"(?:hi|hello|hey)[,!.]?\s*(?:there[,!.]?)?\s*(?:my name is|my name's|name is|i am|i'm|im|this is|it's|it is|call me)?|my name is|my name's|name is|i am|i'm|im|this is|it's|it is|call me",
            ),
            doctor_lead_in: lead_in(
                r"i'?d like to see|i would like to see|i want to see|i'd like|i want|my doctor is|the doctor is|doctor is|please book|book|with|see",
            ),
            location_lead_in: lead_in(
                r"i'?d prefer|i prefer|i'd like|preferably|please|at the|at|in the|in",
            ),
            provider_lead_in: lead_in(
                r"my insurance is|my insurer is|my provider is|i'm insured (?:with|through)|i am insured (?:with|through)|insured (?:with|through)|i have|it's|it is",
            ),
            id_lead_in: lead_in(
                r"my (?:insurance |member |policy )?(?:id|number) is|(?:insurance |member |policy )?(?:id|number) is|it's|it is",
            ),
            iso_date: Regex::new(r"\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\b").unwrap(),
            month_first_date: Regex::new(&format!(
                r"(?i)\b{MONTH}\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"
            ))
            .unwrap(),
            day_first_date: Regex::new(&format!(
                r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH},?\s+\d{{4}}\b"
            ))
            .unwrap(),
            ordinal_suffix: Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").unwrap(),
            month_word: Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*")
                .unwrap(),
            courtesy: Regex::new(r"(?i)[\s,]+(?:please|thanks|thank you)[.!]*$").unwrap(),
            clock_time: Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap(),
            meridiem_time: Regex::new(r"(?i)\b(\d{1,2})\s*(am|pm)\b").unwrap(),
            slot_number: Regex::new(
                r"(?i)^(?:(?:i'?ll take|i want|i'd like|let's do|take|pick|choose)\s+)?(?:(?:the|slot|option|number|no\.?)\s*)*#?\s*(\d{1,3})(?:\s*(?:please|one))?[.!)]?$",
            )
            .unwrap(),
        }
    }

    fn label_for(&self, field: IntakeField) -> &Regex {
        match field {
            IntakeField::Name => &self.name_label,
            IntakeField::DateOfBirth => &self.dob_label,
            IntakeField::Doctor => &self.doctor_label,
            IntakeField::Location => &self.location_label,
            IntakeField::InsuranceProvider => &self.provider_label,
            IntakeField::InsuranceId => &self.id_label,
        }
    }

    fn labelled(&self, field: IntakeField, utterance: &str) -> Option<String> {
        let caps = self.label_for(field).captures(utterance)?;
        self.clean(caps.get(1)?.as_str())
    }

    fn find_date(&self, text: &str) -> Option<String> {
        let found = self
            .iso_date
            .find(text)
            .or_else(|| self.month_first_date.find(text))
            .or_else(|| self.day_first_date.find(text))?;
        let cleaned = self.ordinal_suffix.replace_all(found.as_str(), "$1");
        let cleaned = self.month_word.replace_all(&cleaned, "$1");
        let cleaned = cleaned.replace('.', "").replace(" of ", " ");
        Some(cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Trailing punctuation and courtesy words removed.
    fn clean(&self, text: &str) -> Option<String> {
        let text = trim_trailing_punctuation(text);
        non_empty(trim_trailing_punctuation(&self.courtesy.replace(text, "")))
    }

    fn unlabelled(&self, field: IntakeField, utterance: &str) -> Option<String> {
        match field {
            IntakeField::DateOfBirth => self.find_date(utterance),
            IntakeField::Name => {
                let rest = strip(&self.name_lead_in, utterance);
                self.clean(first_segment(&rest))
            }
            IntakeField::Doctor => self.clean(&strip(&self.doctor_lead_in, utterance)),
            IntakeField::Location => self.clean(&strip(&self.location_lead_in, utterance)),
            IntakeField::InsuranceProvider => {
                let rest = strip(&self.provider_lead_in, utterance);
                self.clean(first_segment(&rest))
            }
            IntakeField::InsuranceId => {
                let rest = strip(&self.id_lead_in, utterance.trim());
                let rest = trim_trailing_punctuation(&rest);
                if rest.split_whitespace().count() > 1 {
                    // Pick the token that looks like an identifier.
                    rest.split_whitespace()
                        .rev()
                        .find(|t| t.chars().any(|c| c.is_ascii_digit()))
                        .map(|t| trim_trailing_punctuation(t).to_string())
                        .or_else(|| non_empty(rest))
                } else {
                    non_empty(rest)
                }
            }
        }
    }

    fn extract_time(&self, utterance: &str) -> Option<NaiveTime> {
        if let Some(caps) = self.clock_time.captures(utterance) {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
            return to_time(hour, minute, caps.get(3).map(|m| m.as_str()));
        }
        let caps = self.meridiem_time.captures(utterance)?;
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        to_time(hour, 0, caps.get(2).map(|m| m.as_str()))
    }
}

impl FieldExtractor for RuleExtractor {
    fn extract_field(&self, field: IntakeField, utterance: &str) -> Option<String> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return None;
        }
        match self.labelled(field, utterance) {
            // A labelled date still has to look like a date.
            Some(value) if field == IntakeField::DateOfBirth => {
                self.find_date(&value).or(Some(value))
            }
            Some(value) => Some(value),
            None => self.unlabelled(field, utterance),
        }
    }

    fn extract_slot(&self, utterance: &str) -> Option<SlotReference> {
        let utterance = utterance.trim();
        if let Some(time) = self.extract_time(utterance) {
            let date = self
                .iso_date
                .find(utterance)
                .and_then(|m| NaiveDate::parse_from_str(&m.as_str().replace('/', "-"), "%Y-%m-%d").ok());
            return Some(SlotReference::Time { date, time });
        }
        if let Some(caps) = self.slot_number.captures(utterance) {
            return caps
                .get(1)?
                .as_str()
                .parse()
                .ok()
                .map(SlotReference::Index);
        }
        let lower = utterance.to_lowercase();
        words(&lower).find_map(|w| {
            ORDINALS
                .iter()
                .position(|o| *o == w)
                .map(|i| SlotReference::Index(i + 1))
        })
    }

    fn extract_answer(&self, utterance: &str) -> Option<bool> {
        let lower = utterance.to_lowercase();
        let yes = words(&lower).any(|w| AFFIRMATIVE.contains(&w));
        let no = words(&lower).any(|w| NEGATIVE.contains(&w));
        match (yes, no) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn first_segment(text: &str) -> &str {
    text.split([',', ';', '\n']).next().unwrap_or(text).trim()
}

fn strip(lead_in: &Regex, text: &str) -> String {
    lead_in.replace(text, "").trim().to_string()
}

fn trim_trailing_punctuation(text: &str) -> &str {
    text.trim()
        .trim_end_matches(['.', '!', '?', ',', ';'])
        .trim()
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn to_time(hour: u32, minute: u32, meridiem: Option<&str>) -> Option<NaiveTime> {
    let hour = match meridiem.map(str::to_lowercase).as_deref() {
        Some("am") if hour == 12 => 0,
        Some("am") if hour <= 12 => hour,
        Some("pm") if hour == 12 => 12,
        Some("pm") if hour < 12 => hour + 12,
        Some(_) => return None,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex() -> RuleExtractor {
        RuleExtractor::new()
    }

    fn field(f: IntakeField, text: &str) -> Option<String> {
        ex().extract_field(f, text)
    }

    #[test]
    fn name_plain_and_with_lead_in() {
        assert_eq!(field(IntakeField::Name, "Jane Doe").as_deref(), Some("Jane Doe"));
        assert_eq!(
            field(IntakeField::Name, "Hi, my name is Jane Doe.").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(field(IntakeField::Name, "I'm Jane Doe").as_deref(), Some("Jane Doe"));
        assert_eq!(
            field(IntakeField::Name, "Jane Doe, 1990-04-02").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(field(IntakeField::Name, "   "), None);
        assert_eq!(field(IntakeField::Name, "my name is"), None);
    }

    #[test]
    fn labelled_fields() {
        let text = "name=Jane Doe, dob=1990-04-02, doctor=Dr. Smith, location: Downtown Clinic";
        assert_eq!(field(IntakeField::Name, text).as_deref(), Some("Jane Doe"));
        assert_eq!(field(IntakeField::DateOfBirth, text).as_deref(), Some("1990-04-02"));
        assert_eq!(field(IntakeField::Doctor, text).as_deref(), Some("Dr. Smith"));
        assert_eq!(field(IntakeField::Location, text).as_deref(), Some("Downtown Clinic"));
    }

    #[test]
    fn dob_patterns() {
        assert_eq!(
            field(IntakeField::DateOfBirth, "I was born on 1990-04-02").as_deref(),
            Some("1990-04-02")
        );
        assert_eq!(
            field(IntakeField::DateOfBirth, "April 2nd, 1990").as_deref(),
            Some("Apr 2, 1990")
        );
        assert_eq!(
            field(IntakeField::DateOfBirth, "the 2nd of April 1990").as_deref(),
            Some("2 Apr 1990")
        );
        assert_eq!(
            field(IntakeField::DateOfBirth, "Sept. 14 1985").as_deref(),
            Some("Sep 14 1985")
        );
        assert_eq!(field(IntakeField::DateOfBirth, "not sure"), None);
        // Shape matches even if the calendar date is impossible.
        assert_eq!(
            field(IntakeField::DateOfBirth, "2099-13-45").as_deref(),
            Some("2099-13-45")
        );
    }

    #[test]
    fn doctor_and_location() {
        assert_eq!(field(IntakeField::Doctor, "Dr. Smith").as_deref(), Some("Dr. Smith"));
        assert_eq!(
            field(IntakeField::Doctor, "I'd like to see Dr. Smith please").as_deref(),
            Some("Dr. Smith")
        );
        assert_eq!(
            field(IntakeField::Location, "Downtown Clinic").as_deref(),
            Some("Downtown Clinic")
        );
        assert_eq!(
            field(IntakeField::Location, "at the Downtown Clinic.").as_deref(),
            Some("Downtown Clinic")
        );
        assert_eq!(
            field(IntakeField::Location, "The Harbor Clinic").as_deref(),
            Some("The Harbor Clinic")
        );
    }

    #[test]
    fn insurance_fields() {
        assert_eq!(
            field(IntakeField::InsuranceProvider, "Acme Health").as_deref(),
            Some("Acme Health")
        );
        assert_eq!(
            field(IntakeField::InsuranceProvider, "I'm insured with Acme Health, id AH12345")
                .as_deref(),
            Some("Acme Health")
        );
        assert_eq!(
            field(IntakeField::InsuranceProvider, "With Care Mutual").as_deref(),
            Some("With Care Mutual")
        );
        assert_eq!(
            field(IntakeField::InsuranceProvider, "insured through Acme Health").as_deref(),
            Some("Acme Health")
        );
        assert_eq!(field(IntakeField::InsuranceId, "AH12345").as_deref(), Some("AH12345"));
        assert_eq!(
            field(IntakeField::InsuranceId, "my member id is AH12345.").as_deref(),
            Some("AH12345")
        );
        assert_eq!(
            field(IntakeField::InsuranceId, "sure thing AH12345 ok").as_deref(),
            Some("AH12345")
        );
        assert_eq!(
            field(IntakeField::InsuranceId, "member id: AH12345").as_deref(),
            Some("AH12345")
        );
    }

    #[test]
    fn slot_by_index() {
        let e = ex();
        assert_eq!(e.extract_slot("1"), Some(SlotReference::Index(1)));
        assert_eq!(e.extract_slot(" #3 "), Some(SlotReference::Index(3)));
        assert_eq!(e.extract_slot("slot 2"), Some(SlotReference::Index(2)));
        assert_eq!(e.extract_slot("I'll take 4"), Some(SlotReference::Index(4)));
        assert_eq!(e.extract_slot("the second one"), Some(SlotReference::Index(2)));
        assert_eq!(e.extract_slot("0"), Some(SlotReference::Index(0)));
        assert_eq!(e.extract_slot("whenever"), None);
    }

    #[test]
    fn slot_by_time() {
        let e = ex();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(
            e.extract_slot("9:30"),
            Some(SlotReference::Time { date: None, time: t(9, 30) })
        );
        assert_eq!(
            e.extract_slot("2pm works"),
            Some(SlotReference::Time { date: None, time: t(14, 0) })
        );
        assert_eq!(
            e.extract_slot("12am"),
            Some(SlotReference::Time { date: None, time: t(0, 0) })
        );
        assert_eq!(
            e.extract_slot("2026-10-19 10:00"),
            Some(SlotReference::Time {
                date: NaiveDate::from_ymd_opt(2026, 10, 19),
                time: t(10, 0)
            })
        );
        assert_eq!(e.extract_slot("25:00"), None);
    }

    #[test]
    fn answers() {
        let e = ex();
        assert_eq!(e.extract_answer("yes"), Some(true));
        assert_eq!(e.extract_answer("Yes please!"), Some(true));
        assert_eq!(e.extract_answer("ok, book it"), Some(true));
        assert_eq!(e.extract_answer("no"), Some(false));
        assert_eq!(e.extract_answer("Nope, a different time"), Some(false));
        assert_eq!(e.extract_answer("yes... no"), None);
        assert_eq!(e.extract_answer("hmm"), None);
    }
}
