use std::time::{Duration, Instant};

/// 告警节流：累计达到阈值或距上次触发超过间隔时触发，触发后清零。
#[derive(Debug, Clone)]
pub struct AlarmRule {
    threshold: u64,
    interval: Duration,
    last_fire: Option<Instant>,
    pending_count: u64,
}

impl AlarmRule {
    pub fn new(threshold: u64, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            last_fire: None,
            pending_count: 0,
        }
    }

    pub fn add_log(&mut self) -> bool {
        self.add_log_at(Instant::now())
    }

    /// 从未触发过的规则第一次必然触发。
    pub fn add_log_at(&mut self, now: Instant) -> bool {
        self.pending_count += 1;
        let due = match self.last_fire {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if self.pending_count >= self.threshold || due {
            self.last_fire = Some(now);
            self.pending_count = 0;
            return true;
        }
        false
    }

    pub fn pending_count(&self) -> u64 {
        self.pending_count
    }

    pub fn reset(&mut self) {
        self.last_fire = None;
        self.pending_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_log_fires() {
        let mut rule = AlarmRule::new(10, Duration::from_secs(60));
        assert!(rule.add_log());
        assert_eq!(rule.pending_count(), 0);
    }

    #[test]
    fn test_threshold_fires_within_interval() {
        let start = Instant::now();
        let mut rule = AlarmRule::new(3, Duration::from_secs(60));
        assert!(rule.add_log_at(start));
        assert!(!rule.add_log_at(start + Duration::from_secs(1)));
        assert!(!rule.add_log_at(start + Duration::from_secs(2)));
        assert_eq!(rule.pending_count(), 2);
        assert!(rule.add_log_at(start + Duration::from_secs(3)));
        assert_eq!(rule.pending_count(), 0);
    }

    #[test]
    fn test_interval_fires_below_threshold() {
        let start = Instant::now();
        let mut rule = AlarmRule::new(100, Duration::from_secs(5));
        assert!(rule.add_log_at(start));
        assert!(!rule.add_log_at(start + Duration::from_secs(4)));
        assert!(rule.add_log_at(start + Duration::from_secs(5)));

        rule.reset();
        assert!(rule.add_log_at(start + Duration::from_secs(6)));
    }
}
