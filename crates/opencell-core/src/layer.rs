use serde::{Deserialize, Serialize};

/// A technology layer. Geometry records reference layers by handle; the
/// routing `number` orders layers bottom-to-top and drives via top/bottom
/// layer bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Position in the stack, increasing upward.
    pub number: i32,
}

impl Layer {
    pub fn new(name: &str, number: i32) -> Self {
        Self {
            name: name.to_string(),
            number,
        }
    }
}
