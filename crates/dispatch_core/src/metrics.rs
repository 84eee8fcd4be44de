//! Operational counters, incremented at decision points without affecting
//! behavior.
//!
//! Plain `AtomicU64` fields with `Ordering::Relaxed` throughout; exact
//! accounting isn't required for a counter, and nothing here is ever
//! consulted for correctness — only for visibility into what the engine
//! is doing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub bids_received: AtomicU64,
    pub auctions_opened: AtomicU64,
    pub matches_made: AtomicU64,
    pub no_bid_jobs: AtomicU64,
    pub spoof_demotions: AtomicU64,
}

impl Metrics {
    pub fn bid_received(&self) {
        self.bids_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auction_opened(&self) {
        self.auctions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn match_made(&self) {
        self.matches_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn no_bid_job(&self) {
        self.no_bid_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spoof_demotion(&self) {
        self.spoof_demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bids_received: self.bids_received.load(Ordering::Relaxed),
            auctions_opened: self.auctions_opened.load(Ordering::Relaxed),
            matches_made: self.matches_made.load(Ordering::Relaxed),
            no_bid_jobs: self.no_bid_jobs.load(Ordering::Relaxed),
            spoof_demotions: self.spoof_demotions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub bids_received: u64,
    pub auctions_opened: u64,
    pub matches_made: u64,
    pub no_bid_jobs: u64,
    pub spoof_demotions: u64,
}
