//! Availability model: the bookable slots for a doctor at a location.
//!
//! Slots come either from a fixed list or from a generator that lays out
//! back-to-back appointments over a window of days. Both sources are
//! deterministic: the same doctor and location always produce the same
//! ordered list for a given configuration and day.
//!
//! Confirmed bookings are recorded in a reservation ledger shared by every
//! clone of the model. Reserved slots are never listed again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A bookable appointment candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub doctor: String,
    pub location: String,
    pub start_time: NaiveDateTime,
    pub duration_minutes: u32,
}

impl SlotCandidate {
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// One-line description, e.g. `2026-10-17 09:00 with Dr. Smith at Downtown Clinic (30 min)`.
    pub fn label(&self) -> String {
        format!(
            "{} with {} at {} ({} min)",
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.doctor,
            self.location,
            self.duration_minutes
        )
    }
}

/// Slots-per-day override for one doctor/location pair. Zero means no capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCapacity {
    pub doctor: String,
    pub location: String,
    pub slots_per_day: u32,
}

/// Upper bound for `SlotGenerator::days`.
pub const MAX_GENERATED_DAYS: u32 = 366;

/// Upper bound for slots per day, one per minute of the day.
pub const MAX_SLOTS_PER_DAY: u32 = 24 * 60;

/// Generates consecutive slots starting at `first_start` on each of `days`
/// days beginning at `start_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotGenerator {
    /// First day of the window. When unset the window starts tomorrow,
    /// evaluated on every query, so a long-running process keeps offering
    /// future slots.
    pub start_date: Option<NaiveDate>,
    pub days: u32,
    pub first_start: NaiveTime,
    pub slots_per_day: u32,
    pub duration_minutes: u32,
    pub capacity: Vec<PairCapacity>,
}

impl Default for SlotGenerator {
    fn default() -> Self {
        Self {
            start_date: None,
            days: 3,
            first_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            slots_per_day: 4,
            duration_minutes: 30,
            capacity: Vec::new(),
        }
    }
}

impl SlotGenerator {
    fn slots_per_day_for(&self, doctor: &str, location: &str) -> u32 {
        let (doctor, location) = (match_key(doctor), match_key(location));
        self.capacity
            .iter()
            .find(|c| match_key(&c.doctor) == doctor && match_key(&c.location) == location)
            .map(|c| c.slots_per_day)
            .unwrap_or(self.slots_per_day)
    }

    fn first_day(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(|| {
            let today = chrono::Local::now().date_naive();
            today.succ_opt().unwrap_or(today)
        })
    }

    fn generate(&self, doctor: &str, location: &str) -> Vec<SlotCandidate> {
        let per_day = self.slots_per_day_for(doctor, location);
        let step = Duration::minutes(i64::from(self.duration_minutes));
        let first_day = self.first_day();
        let mut slots = Vec::new();

        for day in 0..self.days {
            let Some(date) = first_day
                .checked_add_signed(Duration::days(i64::from(day)))
            else {
                break;
            };
            let mut start = date.and_time(self.first_start);
            for _ in 0..per_day {
                // Slots never spill into the next day.
                if start.date() != date {
                    break;
                }
                slots.push(SlotCandidate {
                    doctor: doctor.to_string(),
                    location: location.to_string(),
                    start_time: start,
                    duration_minutes: self.duration_minutes,
                });
                start += step;
            }
        }
        slots
    }
}

/// Where slots come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSource {
    Fixed { slots: Vec<SlotCandidate> },
    Generated(SlotGenerator),
}

impl Default for SlotSource {
    fn default() -> Self {
        Self::Generated(SlotGenerator::default())
    }
}

type SlotKey = (String, String, NaiveDateTime);

fn slot_key(slot: &SlotCandidate) -> SlotKey {
    (match_key(&slot.doctor), match_key(&slot.location), slot.start_time)
}

/// Answers slot queries for doctor/location pairs.
#[derive(Debug, Clone)]
pub struct AvailabilityModel {
    source: SlotSource,
    reserved: Arc<Mutex<HashSet<SlotKey>>>,
}

impl AvailabilityModel {
    pub fn new(source: SlotSource) -> Self {
        Self {
            source,
            reserved: Arc::default(),
        }
    }

    fn reserved(&self) -> MutexGuard<'_, HashSet<SlotKey>> {
        // The set is valid after any panic mid-insert.
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ordered open slots for `doctor` at `location`, earliest first.
    ///
    /// Empty when the pair has no configured capacity or every slot is
    /// already reserved.
    pub fn list_slots(&self, doctor: &str, location: &str) -> Vec<SlotCandidate> {
        let mut slots = self.configured_slots(doctor, location);
        let reserved = self.reserved();
        if !reserved.is_empty() {
            slots.retain(|slot| !reserved.contains(&slot_key(slot)));
        }
        slots
    }

    /// Claim `slot` for one booking. Returns false if it was already taken.
    pub fn reserve(&self, slot: &SlotCandidate) -> bool {
        let claimed = self.reserved().insert(slot_key(slot));
        if claimed {
            tracing::debug!(doctor = %slot.doctor, location = %slot.location, start = %slot.start_time, "Slot reserved");
        }
        claimed
    }

    pub fn is_reserved(&self, slot: &SlotCandidate) -> bool {
        self.reserved().contains(&slot_key(slot))
    }

    fn configured_slots(&self, doctor: &str, location: &str) -> Vec<SlotCandidate> {
        match &self.source {
            SlotSource::Fixed { slots } => {
                let (doctor, location) = (match_key(doctor), match_key(location));
                let mut matching: Vec<SlotCandidate> = slots
                    .iter()
                    .filter(|s| match_key(&s.doctor) == doctor && match_key(&s.location) == location)
                    .cloned()
                    .collect();
                matching.sort_by(|a, b| a.start_time.cmp(&b.start_time));
                matching
            }
            SlotSource::Generated(generator) => generator.generate(doctor, location),
        }
    }

    pub fn has_capacity(&self, doctor: &str, location: &str) -> bool {
        !self.list_slots(doctor, location).is_empty()
    }

    /// Which of `locations` have at least one slot for `doctor`.
    pub fn locations_with_capacity<'a>(&self, doctor: &str, locations: &'a [String]) -> Vec<&'a str> {
        locations
            .iter()
            .filter(|l| self.has_capacity(doctor, l))
            .map(String::as_str)
            .collect()
    }
}

/// Comparison key for doctor and location names: lowercase alphanumeric
/// words separated by single spaces, so `Dr. Smith` and `dr  smith` match.
pub fn match_key(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> SlotGenerator {
        SlotGenerator {
            start_date: NaiveDate::from_ymd_opt(2026, 10, 19),
            days: 2,
            first_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            slots_per_day: 3,
            duration_minutes: 30,
            capacity: vec![PairCapacity {
                doctor: "Dr. Iyer".into(),
                location: "Downtown Clinic".into(),
                slots_per_day: 0,
            }],
        }
    }

    #[test]
    fn match_key_ignores_case_and_punctuation() {
        assert_eq!(match_key("Dr. Smith"), "dr smith");
        assert_eq!(match_key("  DR   smith "), "dr smith");
        assert_eq!(match_key("Bangalore - Indiranagar"), "bangalore indiranagar");
        assert_eq!(match_key("..."), "");
    }

    #[test]
    fn generated_slots_are_ordered_and_deterministic() {
        let model = AvailabilityModel::new(SlotSource::Generated(generator()));
        let first = model.list_slots("Dr. Smith", "Downtown Clinic");
        let second = model.list_slots("Dr. Smith", "Downtown Clinic");
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
        assert!(first.windows(2).all(|w| w[0].start_time < w[1].start_time));
        assert_eq!(first[0].start_time.to_string(), "2026-10-19 09:00:00");
        assert_eq!(first[2].start_time.to_string(), "2026-10-19 10:00:00");
        assert_eq!(first[3].start_time.to_string(), "2026-10-20 09:00:00");
    }

    #[test]
    fn zero_capacity_pair_yields_empty_list() {
        let model = AvailabilityModel::new(SlotSource::Generated(generator()));
        assert!(model.list_slots("dr iyer", "downtown clinic").is_empty());
        assert!(!model.has_capacity("Dr. Iyer", "Downtown Clinic"));
        assert!(model.has_capacity("Dr. Iyer", "Uptown"));
    }

    #[test]
    fn generated_slots_stop_at_midnight() {
        let late = SlotGenerator {
            first_start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            days: 1,
            slots_per_day: 5,
            ..generator()
        };
        let slots = late.generate("Dr. Smith", "Downtown Clinic");
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn fixed_slots_filter_by_pair_and_sort() {
        let at = |d: u32, h: u32| {
            NaiveDate::from_ymd_opt(2026, 10, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };
        let slot = |doctor: &str, start| SlotCandidate {
            doctor: doctor.into(),
            location: "Downtown Clinic".into(),
            start_time: start,
            duration_minutes: 60,
        };
        let model = AvailabilityModel::new(SlotSource::Fixed {
            slots: vec![
                slot("Dr. Smith", at(21, 14)),
                slot("Dr. Iyer", at(20, 9)),
                slot("Dr. Smith", at(20, 10)),
            ],
        });

        let slots = model.list_slots("dr smith", "DOWNTOWN CLINIC");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start_time, at(20, 10));
        assert_eq!(slots[1].start_time, at(21, 14));
        assert!(model.list_slots("Dr. Smith", "Uptown").is_empty());
    }

    #[test]
    fn locations_with_capacity_filters() {
        let model = AvailabilityModel::new(SlotSource::Generated(generator()));
        let locations = vec!["Downtown Clinic".to_string(), "Uptown".to_string()];
        assert_eq!(model.locations_with_capacity("Dr. Iyer", &locations), vec!["Uptown"]);
    }

    #[test]
    fn slot_label_and_end_time() {
        let slot = SlotCandidate {
            doctor: "Dr. Smith".into(),
            location: "Downtown Clinic".into(),
            start_time: NaiveDate::from_ymd_opt(2026, 10, 19)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            duration_minutes: 45,
        };
        assert_eq!(
            slot.label(),
            "2026-10-19 09:30 with Dr. Smith at Downtown Clinic (45 min)"
        );
        assert_eq!(slot.end_time().to_string(), "2026-10-19 10:15:00");
    }

    #[test]
    fn slot_source_serde_tagged() {
        let json = r#"{"kind": "generated", "days": 1, "slots_per_day": 2,
                       "start_date": "2026-10-19", "first_start": "08:00:00",
                       "duration_minutes": 20}"#;
        let source: SlotSource = serde_json::from_str(json).unwrap();
        let model = AvailabilityModel::new(source);
        let slots = model.list_slots("a", "b");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].start_time.to_string(), "2026-10-19 08:20:00");
    }

    #[test]
    fn reserved_slots_are_not_listed_again() {
        let model = AvailabilityModel::new(SlotSource::Generated(generator()));
        let first = model.list_slots("Dr. Smith", "Downtown Clinic")[0].clone();

        assert!(model.reserve(&first));
        assert!(!model.reserve(&first));
        assert!(model.is_reserved(&first));

        // Clones share the ledger; matching ignores spelling.
        let shared = model.clone();
        let slots = shared.list_slots("dr smith", "downtown clinic");
        assert_eq!(slots.len(), 5);
        assert!(!slots.iter().any(|s| s.start_time == first.start_time));
        assert_eq!(model.list_slots("Dr. Iyer", "Uptown").len(), 6);
    }

    #[test]
    fn fully_reserved_pair_has_no_capacity() {
        let model = AvailabilityModel::new(SlotSource::Generated(SlotGenerator {
            days: 1,
            slots_per_day: 1,
            ..generator()
        }));
        let only = model.list_slots("Dr. Smith", "Downtown Clinic");
        assert_eq!(only.len(), 1);
        assert!(model.reserve(&only[0]));
        assert!(!model.has_capacity("Dr. Smith", "Downtown Clinic"));
    }

    #[test]
    fn unset_start_date_follows_the_clock() {
        let model = AvailabilityModel::new(SlotSource::Generated(SlotGenerator {
            start_date: None,
            ..generator()
        }));
        let today = chrono::Local::now().date_naive();
        let slots = model.list_slots("Dr. Smith", "Downtown Clinic");
        assert!(slots[0].start_time.date() > today);
        assert!(slots.iter().all(|s| s.start_time.date() <= today + Duration::days(2)));
    }

    #[test]
    fn huge_generator_does_not_overflow() {
        let generator = SlotGenerator {
            days: 2,
            slots_per_day: u32::MAX,
            duration_minutes: 720,
            ..generator()
        };
        // Two slots fit in each day before midnight.
        assert_eq!(generator.generate("Dr. Smith", "Uptown").len(), 4);
    }
}
