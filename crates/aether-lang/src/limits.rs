use std::{
    fmt::{self, Display, Formatter},
    time::{Duration, Instant},
};

use serde::Serialize;

pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 200;

/// Usage ratio at which a limit warning is reported, in percent.
const WARNING_THRESHOLD: u64 = 80;

/// Resource bounds for one evaluation. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: Option<u64>,
    pub max_recursion_depth: Option<u32>,
    pub max_duration: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            max_duration: None,
        }
    }
}

impl Limits {
    pub fn unlimited() -> Self {
        Self {
            max_steps: None,
            max_recursion_depth: None,
            max_duration: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = Some(depth);
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Steps,
    Recursion,
    Duration,
}

impl Display for LimitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Steps => write!(f, "Steps"),
            LimitKind::Recursion => write!(f, "Recursion"),
            LimitKind::Duration => write!(f, "Duration"),
        }
    }
}

/// Reported once per evaluation and kind when usage first reaches the
/// warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitWarning {
    pub kind: LimitKind,
    pub used: u64,
    pub limit: u64,
}

impl Display for LimitWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} usage at {} of {} ({}%)",
            self.kind,
            self.used,
            self.limit,
            u128::from(self.used) * 100 / u128::from(self.limit.max(1))
        )
    }
}

/// Counters of the most recent evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub max_depth: u32,
    #[serde(rename = "elapsed_ms")]
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_millis())
}

/// Cooperative limit enforcement for a single evaluation.
#[derive(Debug)]
pub struct LimitMonitor {
    limits: Limits,
    steps: u64,
    depth: u32,
    max_depth: u32,
    started: Instant,
    steps_warned: bool,
    depth_warned: bool,
    pending_warning: Option<LimitWarning>,
}

impl LimitMonitor {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            steps: 0,
            depth: 0,
            max_depth: 0,
            started: Instant::now(),
            steps_warned: false,
            depth_warned: false,
            pending_warning: None,
        }
    }

    #[inline(always)]
    fn crosses_threshold(used: u64, limit: u64) -> bool {
        limit > 0 && u128::from(used) * 100 >= u128::from(limit) * u128::from(WARNING_THRESHOLD)
    }

    /// Accounts for one evaluated node. The step that would go past
    /// `max_steps` is refused, so at most `max_steps` steps are ever counted.
    pub fn step(&mut self) -> Result<(), LimitKind> {
        if let Some(max_steps) = self.limits.max_steps {
            if self.steps >= max_steps {
                return Err(LimitKind::Steps);
            }

            self.steps += 1;

            if !self.steps_warned && Self::crosses_threshold(self.steps, max_steps) {
                self.steps_warned = true;
                self.pending_warning = Some(LimitWarning {
                    kind: LimitKind::Steps,
                    used: self.steps,
                    limit: max_steps,
                });
            }
        } else {
            self.steps += 1;
        }

        self.check_duration()
    }

    pub fn check_duration(&self) -> Result<(), LimitKind> {
        match self.limits.max_duration {
            Some(max_duration) if self.started.elapsed() > max_duration => {
                Err(LimitKind::Duration)
            }
            _ => Ok(()),
        }
    }

    pub fn enter_call(&mut self) -> Result<(), LimitKind> {
        let depth = self.depth + 1;

        if let Some(max_depth) = self.limits.max_recursion_depth {
            if depth > max_depth {
                return Err(LimitKind::Recursion);
            }

            if !self.depth_warned && Self::crosses_threshold(depth as u64, max_depth as u64) {
                self.depth_warned = true;
                self.pending_warning = Some(LimitWarning {
                    kind: LimitKind::Recursion,
                    used: depth as u64,
                    limit: max_depth as u64,
                });
            }
        }

        self.depth = depth;
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn take_warning(&mut self) -> Option<LimitWarning> {
        self.pending_warning.take()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            steps: self.steps,
            max_depth: self.max_depth,
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_steps, None);
        assert_eq!(limits.max_recursion_depth, Some(200));
        assert_eq!(limits.max_duration, None);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(10)]
    fn test_step_limit_never_exceeded(#[case] max_steps: u64) {
        let mut monitor = LimitMonitor::new(Limits::unlimited().with_max_steps(max_steps));
        for _ in 0..max_steps {
            assert_eq!(monitor.step(), Ok(()));
        }
        assert_eq!(monitor.step(), Err(LimitKind::Steps));
        assert_eq!(monitor.stats().steps, max_steps);
    }

    #[test]
    fn test_recursion_limit() {
        let mut monitor = LimitMonitor::new(Limits::unlimited().with_max_recursion_depth(2));
        assert_eq!(monitor.enter_call(), Ok(()));
        assert_eq!(monitor.enter_call(), Ok(()));
        assert_eq!(monitor.enter_call(), Err(LimitKind::Recursion));
        assert_eq!(monitor.depth(), 2);
        monitor.exit_call();
        monitor.exit_call();
        assert_eq!(monitor.depth(), 0);
        assert_eq!(monitor.stats().max_depth, 2);
    }

    #[test]
    fn test_duration_limit() {
        let monitor = LimitMonitor::new(Limits::unlimited().with_max_duration(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(monitor.check_duration(), Err(LimitKind::Duration));
    }

    #[test]
    fn test_warning_reported_once() {
        let mut monitor = LimitMonitor::new(Limits::unlimited().with_max_steps(10));
        let mut warnings = Vec::new();
        for _ in 0..10 {
            monitor.step().unwrap();
            warnings.extend(monitor.take_warning());
        }
        assert_eq!(
            warnings,
            vec![LimitWarning {
                kind: LimitKind::Steps,
                used: 8,
                limit: 10
            }]
        );
    }

    #[rstest]
    #[case::below(7, 10, false)]
    #[case::at_threshold(8, 10, true)]
    #[case::zero_limit(0, 0, false)]
    #[case::max_limit_fresh(1, u64::MAX, false)]
    #[case::max_limit_near(u64::MAX - 1, u64::MAX, true)]
    #[case::max_used(u64::MAX, u64::MAX, true)]
    fn test_crosses_threshold(#[case] used: u64, #[case] limit: u64, #[case] expected: bool) {
        assert_eq!(LimitMonitor::crosses_threshold(used, limit), expected);
    }

    #[test]
    fn test_max_steps_at_u64_max() {
        let mut monitor = LimitMonitor::new(Limits::unlimited().with_max_steps(u64::MAX));
        for _ in 0..100 {
            assert_eq!(monitor.step(), Ok(()));
        }
        assert_eq!(monitor.take_warning(), None);
        assert_eq!(monitor.stats().steps, 100);
    }

    #[test]
    fn test_warning_display_at_u64_max() {
        let warning = LimitWarning {
            kind: LimitKind::Steps,
            used: u64::MAX,
            limit: u64::MAX,
        };
        assert!(warning.to_string().ends_with("(100%)"));
    }

    #[test]
    fn test_unlimited_never_warns() {
        let mut monitor = LimitMonitor::new(Limits::unlimited());
        for _ in 0..1_000 {
            monitor.step().unwrap();
            monitor.enter_call().unwrap();
        }
        assert_eq!(monitor.take_warning(), None);
    }
}
