// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The SM-2 scheduling recurrence.

use crate::types::card::Scheduling;
use crate::types::timestamp::Timestamp;

/// The easiness factor never drops below this.
pub const MIN_EASINESS: f64 = 1.3;

/// The lowest rating that counts as a successful recall.
const PASSING_RATING: i64 = 3;

pub const MIN_RATING: i64 = 0;
pub const MAX_RATING: i64 = 5;

pub fn is_valid_rating(rating: i64) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Computes a card's scheduling after a review rated `rating` at `now`.
///
/// Ratings outside `[0, 5]` leave the scheduling untouched. Callers are
/// expected to reject them before getting here.
pub fn rate(scheduling: Scheduling, rating: i64, now: Timestamp) -> Scheduling {
    if !is_valid_rating(rating) {
        return scheduling;
    }
    let q = (MAX_RATING - rating) as f64;
    let easiness = (scheduling.easiness + 0.1 - q * (0.08 + q * 0.02)).max(MIN_EASINESS);
    let repetitions = if rating < PASSING_RATING {
        0
    } else {
        scheduling.repetitions + 1
    };
    // The old interval is scaled by the new easiness.
    let interval = match repetitions {
        1 => 1.0,
        2 => 6.0,
        _ => scheduling.interval * easiness,
    };
    let next_due = now.truncate_to_minute().plus_days(interval.ceil() as i64);
    Scheduling {
        repetitions,
        interval,
        easiness,
        next_due: Some(next_due),
    }
}
