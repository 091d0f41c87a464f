//! Execution strategies, one per calculation family

pub mod economy;
pub mod household;

pub use economy::EconomyStrategy;
pub use household::HouseholdStrategy;
