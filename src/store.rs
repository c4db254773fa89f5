// Plan store: committed plans keyed by id. The store is bounded; committing
// into a full store drops the oldest plan. A capacity of 1 keeps only the
// latest plan.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::debug;

use crate::{error::PlannerError, models::Plan};

#[derive(Default)]
struct Plans {
    by_id: HashMap<String, Plan>,
    // Commit order, oldest first; the back is the current plan
    order: VecDeque<String>,
}

pub struct PlanStore {
    max_plans: usize,
    plans: RwLock<Plans>,
}

impl PlanStore {
    pub fn new(max_plans: usize) -> Self {
        Self {
            max_plans: max_plans.max(1),
            plans: RwLock::new(Plans::default()),
        }
    }

    pub fn commit(&self, plan: Plan) {
        let mut plans = self.plans.write();

        if plans.by_id.contains_key(&plan.id) {
            plans.order.retain(|id| id != &plan.id);
        } else {
            while plans.by_id.len() >= self.max_plans {
                let Some(oldest) = plans.order.pop_front() else {
                    break;
                };
                plans.by_id.remove(&oldest);
                debug!(plan_id = %oldest, "superseded plan dropped");
            }
        }

        plans.order.push_back(plan.id.clone());
        plans.by_id.insert(plan.id.clone(), plan);
    }

    pub fn get(&self, id: &str) -> Option<Plan> {
        self.plans.read().by_id.get(id).cloned()
    }

    pub fn current(&self) -> Option<Plan> {
        let plans = self.plans.read();
        plans.order.back().and_then(|id| plans.by_id.get(id)).cloned()
    }

    // Applies `f` to the stored plan in place and returns a snapshot of the
    // result. Unknown ids leave the store untouched.
    pub fn update<F>(&self, id: &str, f: F) -> Result<Plan, PlannerError>
    where
        F: FnOnce(&mut Plan),
    {
        let mut plans = self.plans.write();
        let plan = plans
            .by_id
            .get_mut(id)
            .ok_or_else(|| PlannerError::PlanNotFound { id: id.to_string() })?;
        f(plan);
        Ok(plan.clone())
    }

    pub fn len(&self) -> usize {
        self.plans.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut plans = self.plans.write();
        plans.by_id.clear();
        plans.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanRequest;
    use chrono::NaiveDate;

    fn plan(id: &str) -> Plan {
        let request = PlanRequest::new(
            "Beijing",
            "Shanghai",
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
        )
        .unwrap();
        Plan::new(id.to_string(), &request)
    }

    #[test]
    fn test_single_slot_store_keeps_latest() {
        let store = PlanStore::new(1);
        store.commit(plan("plan_1"));
        store.commit(plan("plan_2"));

        assert_eq!(store.len(), 1);
        assert!(store.get("plan_1").is_none());
        assert_eq!(store.current().map(|p| p.id), Some("plan_2".to_string()));
    }

    #[test]
    fn test_oldest_plan_is_dropped_when_full() {
        let store = PlanStore::new(2);
        store.commit(plan("a"));
        store.commit(plan("b"));
        store.commit(plan("c"));

        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert_eq!(store.current().unwrap().id, "c");
    }

    #[test]
    fn test_recommit_moves_plan_to_current() {
        let store = PlanStore::new(3);
        store.commit(plan("a"));
        store.commit(plan("b"));
        store.commit(plan("a"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.current().unwrap().id, "a");
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let store = PlanStore::new(2);
        store.commit(plan("a"));
        let before = store.get("a");

        let result = store.update("missing", |p| p.origin = "Tokyo".to_string());
        assert!(matches!(result, Err(PlannerError::PlanNotFound { ref id }) if id == "missing"));
        assert_eq!(store.get("a"), before);
    }

    #[test]
    fn test_update_mutates_in_place() {
        let store = PlanStore::new(2);
        store.commit(plan("a"));

        let updated = store
            .update("a", |p| {
                p.interests.insert("food".to_string());
            })
            .unwrap();
        assert!(updated.interests.contains("food"));
        assert!(store.get("a").unwrap().interests.contains("food"));

        store.clear();
        assert!(store.is_empty());
        assert!(store.current().is_none());
    }
}
