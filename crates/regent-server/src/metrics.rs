// Metrics descriptions for the election node
// The libraries record through the metrics facade; an installed recorder picks them up

use metrics::{describe_counter, describe_gauge};

/// Describe every leader election metric. Call once at startup.
pub fn init_metrics() {
    describe_gauge!(
        "leader_elected",
        "1 while the candidate of a role is leader, 0 otherwise"
    );
    describe_counter!(
        "leader_granted_total",
        "Total number of times leadership was granted"
    );
    describe_counter!(
        "leader_revoked_total",
        "Total number of times leadership was revoked"
    );
    describe_counter!(
        "leader_election_errors_total",
        "Total number of lock errors seen by the election loop"
    );
    describe_counter!(
        "leader_election_restarts_total",
        "Total number of election restarts after an interruption"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_without_recorder() {
        init_metrics();
        init_metrics();
    }
}
