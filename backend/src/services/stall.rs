//! Progress evaluation for a single accepted update.

/// Thresholds for deciding that a traveller is moving away from the destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallPolicy {
    /// Growth in distance, in meters, that counts as a regression.
    pub regression_meters: f64,
    /// A `NoProgress` notification fires while the counter is above this.
    pub notify_after: u32,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            regression_meters: 100.0,
            notify_after: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressDecision {
    /// Within the arrival radius; the session ends.
    Arrived,
    /// Still travelling. `notify` is set when this update crossed into or
    /// stayed in the stalled range by regressing again.
    Travelling { stall_count: u32, notify: bool },
}

impl StallPolicy {
    /// `previous_distance` is the value the client last received, carried
    /// back in its snapshot. Arrival is decided before anything else.
    pub fn evaluate(
        &self,
        previous_distance: f64,
        new_distance: f64,
        radius: f64,
        stall_count: u32,
    ) -> ProgressDecision {
        if new_distance - radius <= 0.0 {
            return ProgressDecision::Arrived;
        }

        if previous_distance - new_distance <= -self.regression_meters {
            let stall_count = stall_count.saturating_add(1);
            ProgressDecision::Travelling {
                stall_count,
                notify: stall_count > self.notify_after,
            }
        } else {
            ProgressDecision::Travelling {
                stall_count: 0,
                notify: false,
            }
        }
    }
}
