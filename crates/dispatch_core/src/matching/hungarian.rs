//! Hungarian (Kuhn-Munkres) global assignment, used once a pool reaches
//! `hungarian_threshold` jobs/bidders.
//!
//! Scores are scaled to `i64` costs (`kuhn_munkres` needs an integer cost
//! matrix), with an `INFEASIBLE` sentinel for job/driver pairs that were
//! never bid on. The matrix is kept square by taking whichever of
//! jobs/drivers is smaller as rows, padding the rest with infeasible
//! entries.

use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};

use super::algorithm::MatchingAlgorithm;
use super::scoring::score_pool;
use super::types::{Assignment, MatchContext, MatchOutcome, PoolEntry};

/// Scale factor converting a `[0, 1]` utility score into an i64 weight.
const SCALE: f64 = 1_000_000.0;

/// Sentinel for (job, driver) pairs with no bid between them; never chosen
/// as long as at least one feasible pair exists in the same row/column.
const INFEASIBLE: i64 = i64::MIN / 4;

struct CostMatrix(Vec<Vec<i64>>);

impl Weights<i64> for CostMatrix {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |r| r.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        CostMatrix(
            self.0
                .iter()
                .map(|row| row.iter().map(|&w| w.saturating_neg()).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
pub struct HungarianMatching;

impl MatchingAlgorithm for HungarianMatching {
    fn assign(&self, pool: &[PoolEntry], ctx: &MatchContext<'_>) -> MatchOutcome {
        let mut no_bids = Vec::new();
        let mut bidding_jobs = Vec::new();
        for (job_index, entry) in pool.iter().enumerate() {
            if entry.bids.is_empty() {
                no_bids.push(entry.job.id.clone());
            } else {
                bidding_jobs.push(job_index);
            }
        }
        if bidding_jobs.is_empty() {
            return MatchOutcome {
                assignments: Vec::new(),
                returned_to_pending: Vec::new(),
                no_bids,
            };
        }

        let candidates = score_pool(pool, ctx);

        let mut drivers: Vec<&str> = candidates.iter().map(|c| c.bid.driver_id.as_str()).collect();
        drivers.sort_unstable();
        drivers.dedup();

        // Kuhn-Munkres requires rows <= columns; use the smaller side as rows.
        let jobs_as_rows = bidding_jobs.len() <= drivers.len();
        let (rows, cols) = if jobs_as_rows {
            (bidding_jobs.len(), drivers.len())
        } else {
            (drivers.len(), bidding_jobs.len())
        };

        let mut matrix = vec![vec![INFEASIBLE; cols]; rows];
        for candidate in &candidates {
            let job_row = bidding_jobs
                .iter()
                .position(|&idx| idx == candidate.job_index)
                .expect("scored candidate must reference a bidding job");
            let driver_col = drivers
                .iter()
                .position(|&id| id == candidate.bid.driver_id)
                .expect("scored candidate must reference a known driver");
            let weight = score_to_weight(candidate.score);
            if jobs_as_rows {
                matrix[job_row][driver_col] = weight;
            } else {
                matrix[driver_col][job_row] = weight;
            }
        }

        let weights = CostMatrix(matrix);
        let has_feasible = (0..weights.rows()).any(|r| (0..weights.columns()).any(|c| weights.at(r, c) > INFEASIBLE));
        if !has_feasible {
            let returned_to_pending = bidding_jobs.iter().map(|&idx| pool[idx].job.id.clone()).collect();
            return MatchOutcome {
                assignments: Vec::new(),
                returned_to_pending,
                no_bids,
            };
        }

        let (_total, solution) = kuhn_munkres(&weights);

        let mut assignments = Vec::new();
        let mut assigned_job_indices = std::collections::HashSet::new();
        if jobs_as_rows {
            for (job_row, &driver_col) in solution.iter().enumerate() {
                if weights.at(job_row, driver_col) <= INFEASIBLE {
                    continue;
                }
                let job_index = bidding_jobs[job_row];
                let driver_id = drivers[driver_col];
                push_assignment(&mut assignments, pool, &candidates, job_index, driver_id, ctx);
                assigned_job_indices.insert(job_index);
            }
        } else {
            for (driver_col, &job_row) in solution.iter().enumerate() {
                if weights.at(driver_col, job_row) <= INFEASIBLE {
                    continue;
                }
                let job_index = bidding_jobs[job_row];
                let driver_id = drivers[driver_col];
                push_assignment(&mut assignments, pool, &candidates, job_index, driver_id, ctx);
                assigned_job_indices.insert(job_index);
            }
        }

        let returned_to_pending = bidding_jobs
            .into_iter()
            .filter(|idx| !assigned_job_indices.contains(idx))
            .map(|idx| pool[idx].job.id.clone())
            .collect();

        MatchOutcome {
            assignments,
            returned_to_pending,
            no_bids,
        }
    }

    fn name(&self) -> &'static str {
        "hungarian"
    }
}

fn score_to_weight(score: f64) -> i64 {
    let w = score * SCALE;
    if w >= i64::MAX as f64 {
        i64::MAX
    } else if w <= INFEASIBLE as f64 {
        INFEASIBLE + 1
    } else {
        w as i64
    }
}

fn push_assignment(
    assignments: &mut Vec<Assignment>,
    pool: &[PoolEntry],
    candidates: &[super::scoring::ScoredCandidate],
    job_index: usize,
    driver_id: &str,
    ctx: &MatchContext<'_>,
) {
    let Some(candidate) = candidates
        .iter()
        .find(|c| c.job_index == job_index && c.bid.driver_id == driver_id)
    else {
        return;
    };
    assignments.push(Assignment {
        job_id: pool[job_index].job.id.clone(),
        driver_id: driver_id.to_string(),
        score: candidate.score,
        eta_min: ctx.eta_model.predict(candidate.bid.distance_km, ctx.now, None),
        distance_km: candidate.bid.distance_km,
    });
}
