mod fake_adapter;
mod fixtures;

pub use fake_adapter::{FakeAdapter, FakeAdapterStats, FakeQueryOutcome};
pub use fixtures::{profile_for, row};
