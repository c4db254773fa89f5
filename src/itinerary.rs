// Day-by-day itinerary derived from the attraction and restaurant stages

use chrono::{Days, NaiveDate};

use crate::models::{calculate_days, Activity, ItineraryDay, Place, StageResult};

pub const FREE_TIME: &str = "Free time";

struct Slot {
    time: &'static str,
    kind: &'static str,
    duration: &'static str,
}

const MORNING: Slot = Slot {
    time: "09:00",
    kind: "attraction",
    duration: "3 hours",
};
const LUNCH: Slot = Slot {
    time: "12:00",
    kind: "meal",
    duration: "1.5 hours",
};
const AFTERNOON: Slot = Slot {
    time: "14:00",
    kind: "attraction",
    duration: "3 hours",
};
const DINNER: Slot = Slot {
    time: "18:00",
    kind: "meal",
    duration: "2 hours",
};

impl Slot {
    fn fill(&self, name: &str) -> Activity {
        Activity {
            time: self.time.to_string(),
            kind: self.kind.to_string(),
            name: name.to_string(),
            duration: self.duration.to_string(),
        }
    }
}

// A failed stage contributes nothing
fn places_of(stage: Option<&StageResult<Vec<Place>>>) -> &[Place] {
    stage
        .and_then(StageResult::ready)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Builds one day per calendar date from `start` to `end`, inclusive.
///
/// Day `i` takes `attractions[i]` in the morning and `attractions[i + 1]` in
/// the afternoon, so consecutive days share an attraction. Lunch is always
/// `restaurants[0]` and dinner `restaurants[1]`. Missing entries drop the
/// slot, except the afternoon which falls back to free time.
pub fn generate_itinerary(
    start: NaiveDate,
    end: NaiveDate,
    attractions: Option<&StageResult<Vec<Place>>>,
    restaurants: Option<&StageResult<Vec<Place>>>,
) -> Vec<ItineraryDay> {
    let attractions = places_of(attractions);
    let restaurants = places_of(restaurants);
    let days = calculate_days(start, end);

    (0..days)
        .map(|i| {
            let idx = i as usize;
            let mut activities = Vec::with_capacity(4);

            if let Some(morning) = attractions.get(idx) {
                activities.push(MORNING.fill(&morning.name));
            }
            if let Some(lunch) = restaurants.first() {
                activities.push(LUNCH.fill(&lunch.name));
            }
            activities.push(AFTERNOON.fill(
                attractions
                    .get(idx + 1)
                    .map_or(FREE_TIME, |place| place.name.as_str()),
            ));
            if let Some(dinner) = restaurants.get(1) {
                activities.push(DINNER.fill(&dinner.name));
            }

            ItineraryDay {
                day: i + 1,
                date: start
                    .checked_add_days(Days::new(u64::from(i)))
                    .unwrap_or(end),
                activities,
            }
        })
        .collect()
}
