//! Partition records parsed from `scontrol show partition --oneliner`.

use serde::Serialize;

use super::limit::TimeLimit;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub name: String,
    pub node_count: u32,
    pub node_list: String,
    pub is_default: bool,
    /// `State=` value, e.g. `UP`, `DOWN`, `DRAIN`, `INACTIVE`.
    pub availability: String,
    pub max_time: TimeLimit,
}

impl Partition {
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.availability.eq_ignore_ascii_case("UP")
    }
}
