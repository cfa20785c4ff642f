// SPDX-License-Identifier: MPL-2.0

mod types;

pub use types::{
    Comment, CounterField, CounterSnapshot, DeltaMap, Engagement, EngagementCounters,
    EngagementKind, EntityRef, Post, Profile, ProfileCounter, Reply, TargetType,
};
