// Budget estimate: per-day and flat base rates scaled by the travel style

use crate::{
    config::BudgetRates,
    models::{BudgetBreakdown, TravelStyle},
};

// Rounds half away from zero, to the nearest currency unit
fn scaled(amount: u64, multiplier: f64) -> u64 {
    (amount as f64 * multiplier).round() as u64
}

pub fn estimate_budget(rates: &BudgetRates, days: u32, style: TravelStyle) -> BudgetBreakdown {
    let days = u64::from(days);
    let m = style.multiplier();

    BudgetBreakdown {
        flights: scaled(rates.flights, m),
        accommodation: scaled(rates.accommodation_per_day * days, m),
        meals: scaled(rates.meals_per_day * days, m),
        attractions: scaled(rates.attractions_per_day * days, m),
        transportation: scaled(rates.transportation_per_day * days, m),
        shopping: scaled(rates.shopping, m),
        emergency: scaled(rates.emergency, m),
    }
}
