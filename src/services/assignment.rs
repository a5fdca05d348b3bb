//! Agent and date assignment
//!
//! Each cluster gets one (agent, date) slot sampled uniformly from the
//! agents × business days matrix. A used-slot set keeps slots unique; when
//! sampling keeps hitting used slots the cluster is forced onto a random slot
//! and flagged as degraded.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::defaults::MAX_ASSIGNMENT_ATTEMPTS;
use crate::error::PlanError;
use crate::types::{Agent, ClusterId, RouteAssignment};

/// `business_days` working dates from `start`, skipping the weekly rest day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub business_days: usize,
    pub rest_day: Weekday,
}

impl DateWindow {
    pub fn new(start: NaiveDate, business_days: usize, rest_day: Weekday) -> Self {
        Self {
            start,
            business_days,
            rest_day,
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(self.business_days);
        let mut day = self.start;
        while dates.len() < self.business_days {
            if day.weekday() != self.rest_day {
                dates.push(day);
            }
            day += Duration::days(1);
        }
        dates
    }
}

/// agents × dates, addressed by (agent index, date index)
struct SlotMatrix<'a> {
    agents: &'a [Agent],
    dates: Vec<NaiveDate>,
}

impl SlotMatrix<'_> {
    fn len(&self) -> usize {
        self.agents.len() * self.dates.len()
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (usize, usize) {
        (rng.gen_range(0..self.agents.len()), rng.gen_range(0..self.dates.len()))
    }

    fn assignment(&self, cluster_id: ClusterId, slot: (usize, usize), degraded: bool) -> RouteAssignment {
        let agent = &self.agents[slot.0];
        RouteAssignment {
            cluster_id,
            agent_id: agent.id.clone(),
            date: self.dates[slot.1],
            territory: agent.territory.clone(),
            degraded,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentOutcome {
    /// One per cluster, in input order
    pub assignments: Vec<RouteAssignment>,
    pub degraded: usize,
}

#[derive(Debug, Clone)]
pub struct AssignmentScheduler {
    max_attempts: usize,
    fail_on_degraded: bool,
}

impl Default for AssignmentScheduler {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AssignmentScheduler {
    pub fn new(fail_on_degraded: bool) -> Self {
        Self {
            max_attempts: MAX_ASSIGNMENT_ATTEMPTS,
            fail_on_degraded,
        }
    }

    #[cfg(test)]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Assign every cluster an (agent, date) slot.
    ///
    /// Slots are unique as long as none of the returned assignments is
    /// degraded.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        entity: &str,
        clusters: &[ClusterId],
        agents: &[Agent],
        window: &DateWindow,
        rng: &mut R,
    ) -> Result<AssignmentOutcome, PlanError> {
        if clusters.is_empty() {
            return Ok(AssignmentOutcome::default());
        }
        if agents.is_empty() {
            return Err(PlanError::NoAgents(entity.to_string()));
        }

        let matrix = SlotMatrix {
            agents,
            dates: window.dates(),
        };
        if matrix.dates.is_empty() {
            return Err(PlanError::EmptyDateWindow);
        }

        info!(
            "Assigning {} clusters to {} agents over {} days ({} slots)",
            clusters.len(),
            agents.len(),
            matrix.dates.len(),
            matrix.len()
        );
        if clusters.len() > matrix.len() {
            warn!(
                "{} clusters exceed {} available slots, some assignments will collide",
                clusters.len(),
                matrix.len()
            );
        }

        let mut used: HashSet<(usize, usize)> = HashSet::with_capacity(clusters.len());
        let mut outcome = AssignmentOutcome {
            assignments: Vec::with_capacity(clusters.len()),
            degraded: 0,
        };

        for &cluster_id in clusters {
            let mut found = None;
            let mut attempts = 0;

            // a full matrix cannot yield a free slot
            while attempts < self.max_attempts && used.len() < matrix.len() {
                attempts += 1;
                let slot = matrix.sample(rng);
                if used.insert(slot) {
                    found = Some(slot);
                    break;
                }
            }

            let assignment = match found {
                Some(slot) => matrix.assignment(cluster_id, slot, false),
                None => {
                    if self.fail_on_degraded {
                        return Err(PlanError::AssignmentExhausted { cluster_id, attempts });
                    }
                    let slot = matrix.sample(rng);
                    used.insert(slot);
                    outcome.degraded += 1;
                    let assignment = matrix.assignment(cluster_id, slot, true);
                    warn!(
                        "Cluster {} forced onto agent {} on {} after {} attempts (slot may collide)",
                        cluster_id, assignment.agent_id, assignment.date, attempts
                    );
                    assignment
                }
            };

            debug!(
                "Cluster {} -> agent {} on {}",
                cluster_id, assignment.agent_id, assignment.date
            );
            outcome.assignments.push(assignment);
        }

        Ok(outcome)
    }
}
