use hostmon_common::config::ReportConfig;

/// Inclusive time range over snapshot timestamps. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    start: Option<f64>,
    stop: Option<f64>,
}

impl TimeWindow {
    pub fn new(start: Option<f64>, stop: Option<f64>) -> Self {
        Self { start, stop }
    }

    /// The window configured in `[report]`.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.start_time, config.stop_time)
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        if self.start.is_some_and(|start| timestamp < start) {
            return false;
        }
        if self.stop.is_some_and(|stop| timestamp > stop) {
            return false;
        }
        true
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn stop(&self) -> Option<f64> {
        self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let window = TimeWindow::new(Some(10.0), Some(20.0));
        assert!(window.contains(10.0));
        assert!(window.contains(20.0));
        assert!(!window.contains(9.99));
        assert!(!window.contains(20.01));
    }

    #[test]
    fn missing_bounds_are_open() {
        assert!(TimeWindow::unbounded().contains(0.0));
        assert!(TimeWindow::new(Some(5.0), None).contains(1e12));
        assert!(!TimeWindow::new(None, Some(5.0)).contains(6.0));
    }

    #[test]
    fn reads_report_config() {
        let config = ReportConfig {
            start_time: Some(1.0),
            ..ReportConfig::default()
        };
        let window = TimeWindow::from_config(&config);
        assert_eq!(window.start(), Some(1.0));
        assert_eq!(window.stop(), None);
    }
}
