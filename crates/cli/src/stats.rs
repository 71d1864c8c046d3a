//! Run statistics.

use std::time::Duration;

use dataflow::DataflowStatus;
use facade::ConnectionState;

/// Statistics from a dataflow run
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Graph changes applied after the initial load
    pub reconfigurations: u64,

    /// Components alive when the run ended
    pub components: Vec<(String, String)>,

    /// Whether the dataflow was still started at the end
    pub started: bool,

    /// Server connection at the end, if a server was used
    pub connection: Option<ConnectionState>,
}

impl RunStats {
    pub fn collect(
        duration: Duration,
        initial_generation: u64,
        status: &DataflowStatus,
        connection: Option<ConnectionState>,
    ) -> Self {
        Self {
            duration,
            reconfigurations: status.generation.saturating_sub(initial_generation),
            components: status
                .components()
                .map(|(id, class)| (id.to_string(), class.to_string()))
                .collect(),
            started: status.started,
            connection,
        }
    }

    /// Graph changes per minute
    pub fn reconfiguration_rate(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.reconfigurations as f64 / minutes
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "  Reconfigurations: {} ({:.2}/min)",
            self.reconfigurations,
            self.reconfiguration_rate()
        );
        println!("  Started: {}", self.started);
        if let Some(state) = self.connection {
            println!("  Server connection: {state}");
        }

        println!("\nComponents ({}):", self.components.len());
        for (id, class) in &self.components {
            println!("  - {id} ({class})");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_from_empty_status() {
        let status = DataflowStatus::default();
        let stats = RunStats::collect(Duration::from_secs(30), 0, &status, None);
        assert_eq!(stats.reconfigurations, 0);
        assert!(stats.components.is_empty());
        assert!(!stats.started);
    }

    #[test]
    fn test_reconfiguration_rate() {
        let stats = RunStats {
            duration: Duration::from_secs(120),
            reconfigurations: 4,
            components: Vec::new(),
            started: true,
            connection: Some(ConnectionState::Connected),
        };
        assert!((stats.reconfiguration_rate() - 2.0).abs() < f64::EPSILON);
    }
}
