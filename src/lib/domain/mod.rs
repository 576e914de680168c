pub mod commitment;
pub mod identity;
pub mod outcome;
pub mod proof;
