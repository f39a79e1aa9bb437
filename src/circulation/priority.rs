//! Request Priority
//!
//! `priority = 0.5 * success + 0.3 * interest_match + 0.2 * proximity`,
//! every input clamped to [0, 100]. Higher ranks first; ties go to the
//! earlier request.

use std::cmp::Ordering;

use super::types::{Book, BookRequest, UserId};

pub const SUCCESS_WEIGHT: f64 = 0.5;
pub const INTEREST_WEIGHT: f64 = 0.3;
pub const PROXIMITY_WEIGHT: f64 = 0.2;

/// Distance at which proximity drops to zero
pub const PROXIMITY_FALLOFF_KM: f64 = 50.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Normalized priority inputs, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityInputs {
    pub success: f64,
    pub interest_match: f64,
    pub proximity: f64,
}

impl PriorityInputs {
    /// Inputs used while member profiles and locations are not wired in
    pub const STUB: PriorityInputs = PriorityInputs {
        success: 50.0,
        interest_match: 0.0,
        proximity: 50.0,
    };

    pub fn score(&self) -> f64 {
        clamp_unit(self.success) * SUCCESS_WEIGHT
            + clamp_unit(self.interest_match) * INTEREST_WEIGHT
            + clamp_unit(self.proximity) * PROXIMITY_WEIGHT
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

/// Source of priority inputs for a (book, member) pair
pub trait PriorityModel: Send + Sync {
    fn inputs(&self, book: &Book, user_id: UserId) -> PriorityInputs;
}

/// Constant inputs for every request
#[derive(Debug, Default, Clone, Copy)]
pub struct StubPriorityModel;

impl PriorityModel for StubPriorityModel {
    fn inputs(&self, _book: &Book, _user_id: UserId) -> PriorityInputs {
        PriorityInputs::STUB
    }
}

/// Ranking order for requests on the same book
pub fn compare_rank(a: &BookRequest, b: &BookRequest) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.requested_at.cmp(&b.requested_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Great-circle distance between two coordinates
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// 100 next door, falling linearly to 0 at `PROXIMITY_FALLOFF_KM`
pub fn proximity_from_distance(km: f64) -> f64 {
    clamp_unit(100.0 * (1.0 - km / PROXIMITY_FALLOFF_KM))
}
