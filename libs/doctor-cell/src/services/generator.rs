use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::models::{AvailabilityError, DayOfWeek, SlotCandidate, WeeklyAvailability};

pub const MAX_SLOT_DURATION_MINUTES: i64 = 24 * 60;
pub const MAX_RANGE_DAYS: i64 = 366;

/// Reject bad ranges and durations before anything is read or written.
pub fn validate_generation(
    start_date: NaiveDate,
    end_date: NaiveDate,
    slot_duration_minutes: i64,
) -> Result<(), AvailabilityError> {
    if slot_duration_minutes <= 0 || slot_duration_minutes > MAX_SLOT_DURATION_MINUTES {
        return Err(AvailabilityError::InvalidDuration(slot_duration_minutes));
    }

    if end_date < start_date {
        return Err(AvailabilityError::InvalidRange(format!(
            "end date {} is before start date {}",
            end_date, start_date
        )));
    }

    let span = (end_date - start_date).num_days() + 1;
    if span > MAX_RANGE_DAYS {
        return Err(AvailabilityError::InvalidRange(format!(
            "range of {} days exceeds the {} day limit",
            span, MAX_RANGE_DAYS
        )));
    }

    Ok(())
}

/// Partition each active day of the template into back-to-back slots of
/// `slot_duration_minutes`. A trailing remainder shorter than the duration is
/// dropped. Output is ordered by date, then start time.
pub fn generate_candidates(
    doctor_id: Uuid,
    template: &[WeeklyAvailability],
    start_date: NaiveDate,
    end_date: NaiveDate,
    slot_duration_minutes: i64,
) -> Result<Vec<SlotCandidate>, AvailabilityError> {
    validate_generation(start_date, end_date, slot_duration_minutes)?;

    let step = Duration::minutes(slot_duration_minutes);
    let mut candidates = Vec::new();

    for date in start_date.iter_days().take_while(|d| *d <= end_date) {
        let day = DayOfWeek::from(date.weekday());
        let Some(window) = template
            .iter()
            .find(|w| w.doctor_id == doctor_id && w.day_of_week == day)
        else {
            continue;
        };

        if !window.is_active || window.start_time >= window.end_time {
            continue;
        }

        let mut cursor = window.start_time;
        loop {
            let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
            if wrapped != 0 || slot_end > window.end_time {
                break;
            }

            candidates.push(SlotCandidate {
                doctor_id,
                slot_date: date,
                start_time: cursor,
                end_time: slot_end,
            });
            cursor = slot_end;
        }
    }

    Ok(candidates)
}
