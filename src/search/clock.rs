use std::time::{Duration, Instant};

/// What the front-end knows about the time situation when `go` arrives
#[derive(Copy, Clone, Debug, Default)]
pub struct ClockSetting {
    /// Remaining time on our clock
    pub time_left: Duration,
    /// Increment added after every move
    pub increment: Duration,
    /// Moves until the next time control, 0 when the whole game must fit
    pub moves_to_go: i32,
    /// Moves already played, used to estimate the remaining game length
    pub moves_played: i32,
    /// Fixed time per move (`go movetime`)
    pub exact_time_per_move: Option<Duration>,
    /// Depth limit, 0 for none
    pub depth_limit: i32,
    /// Node budget, 0 for none
    pub node_target: u64,
    pub analyze: bool,
    pub ponder: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ClockMode {
    #[default]
    Search,
    Analyze,
    Ponder,
    Stopped,
}

/// How worried the root search currently is; scales the average budget
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SearchFinding {
    #[default]
    Normal,
    /// Best-move value dropped by at least a fifth of a pawn
    Critical,
    /// The previous best move failed low
    SuddenDeath,
}

const AVERAGE_MOVE_COUNT_PER_GAME: i32 = 60;
const KEEP_TIME_FOR_MOVES: i32 = 35;
const MIN_DEPTH: i32 = 5;
const CRITICAL_DROP: i32 = 20;
const MIN_REMAINING_TIME_MS: i64 = 2000;

/// Decides whether to start or abort iterations. Two budgets exist: the
/// average (target) time and a hard maximum; instability findings from the
/// root search inflate the average.
pub struct ClockManager {
    start: Instant,
    mode: ClockMode,
    setting: ClockSetting,
    finding: SearchFinding,
    depth: i32,
    /// Deepest fully completed iteration, anchor for drop detection
    completed_depth: i32,
    /// Value of the completed iteration per depth, for drop detection
    values: [i32; 128],
    average_ms: i64,
    max_ms: i64,
}

impl Default for ClockManager {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            mode: ClockMode::Search,
            setting: ClockSetting::default(),
            finding: SearchFinding::default(),
            depth: 0,
            completed_depth: 0,
            values: [0; 128],
            average_ms: i64::MAX,
            max_ms: i64::MAX,
        }
    }
}

impl ClockManager {
    pub fn start_calculating_move(setting: ClockSetting) -> Self {
        let mut clock = Self {
            start: Instant::now(),
            setting,
            mode: if setting.ponder {
                ClockMode::Ponder
            } else if setting.analyze {
                ClockMode::Analyze
            } else {
                ClockMode::Search
            },
            ..Self::default()
        };
        clock.max_ms = clock.compute_max_time();
        clock.average_ms = clock.compute_average_time();
        clock
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    pub const fn mode(&self) -> ClockMode {
        self.mode
    }

    pub const fn setting(&self) -> &ClockSetting {
        &self.setting
    }

    pub fn set_calculation_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    pub fn stop_search(&mut self) {
        self.mode = ClockMode::Stopped;
    }

    pub const fn is_search_stopped(&self) -> bool {
        matches!(self.mode, ClockMode::Stopped)
    }

    /// The GUI predicted our reply correctly: keep the elapsed time and
    /// start spending it for real
    pub fn ponder_hit(&mut self) {
        if self.mode == ClockMode::Ponder {
            self.mode = ClockMode::Search;
        }
    }

    pub fn stop_on_node_target(&mut self, node_count: u64) -> bool {
        if self.mode == ClockMode::Stopped {
            return true;
        }
        if self.setting.node_target == 0 {
            return false;
        }
        if node_count > self.setting.node_target {
            self.stop_search();
            return true;
        }
        false
    }

    /// Hard cap: nothing may run past the maximum budget
    pub fn emergency_abort(&mut self) -> bool {
        if self.mode == ClockMode::Stopped {
            return true;
        }
        if self.depth <= MIN_DEPTH || self.mode != ClockMode::Search {
            return false;
        }
        if self.elapsed_ms() > self.max_ms {
            self.stop_search();
            return true;
        }
        false
    }

    /// Soft cap checked between root moves
    pub fn should_abort(&mut self) -> bool {
        if self.mode == ClockMode::Stopped {
            return true;
        }
        if self.depth <= MIN_DEPTH || self.mode != ClockMode::Search {
            return false;
        }
        if self.elapsed_ms() > self.average_ms / 10 * 8 {
            self.stop_search();
            return true;
        }
        false
    }

    /// Whether starting another full iteration is likely to finish in budget
    pub fn may_compute_next_depth(&self, depth: i32) -> bool {
        if self.mode == ClockMode::Stopped {
            return false;
        }
        if depth <= MIN_DEPTH {
            return true;
        }
        if self.mode != ClockMode::Search {
            return true;
        }
        let budget = self.max_ms.min(self.average_ms / 10 * 7);
        self.elapsed_ms() < budget
    }

    /// Records a completed iteration value that landed inside the window
    pub fn set_search_result(&mut self, depth: i32, value: i32) {
        if (depth as usize) < self.values.len() {
            self.values[depth as usize] = value;
        }
        self.completed_depth = depth;
        if self.finding != SearchFinding::Normal && depth > 0 {
            let prev = self.values[(depth as usize).saturating_sub(1)];
            if value >= prev {
                self.finding = SearchFinding::Normal;
            }
        }
        self.average_ms = self.compute_average_time();
    }

    /// Root instability: a fail low or a large value drop buys more time
    pub fn set_searched_root_move(&mut self, fail_low: bool, value: i32) {
        if fail_low {
            self.finding = SearchFinding::SuddenDeath;
        } else if self.completed_depth > 4 && value < self.values[self.completed_depth as usize] - CRITICAL_DROP {
            self.finding = SearchFinding::Critical;
        }
        self.average_ms = self.compute_average_time();
    }

    fn is_infinite_search(&self) -> bool {
        self.setting.analyze || self.setting.depth_limit > 0 || self.setting.node_target > 0
    }

    fn compute_moves_to_go(&self) -> i32 {
        let mut moves_to_go = self.setting.moves_to_go;
        if moves_to_go == 0 {
            moves_to_go = (AVERAGE_MOVE_COUNT_PER_GAME - self.setting.moves_played / 2).max(KEEP_TIME_FOR_MOVES);
        }
        moves_to_go.max(1)
    }

    fn compute_average_time(&self) -> i64 {
        if self.is_infinite_search() {
            return i64::MAX;
        }
        if let Some(exact) = self.setting.exact_time_per_move {
            return exact.as_millis() as i64;
        }
        let time_left = self.setting.time_left.as_millis() as i64;
        let moves_to_go = self.compute_moves_to_go() as i64;

        // moves_to_go + 2 keeps a safety margin against losing on time
        let mut average = time_left / (moves_to_go + 2);
        average *= match self.finding {
            SearchFinding::Normal => 1,
            SearchFinding::Critical => 4,
            SearchFinding::SuddenDeath => 15,
        };
        average + self.setting.increment.as_millis() as i64
    }

    fn compute_max_time(&self) -> i64 {
        if self.is_infinite_search() {
            return i64::MAX;
        }
        if let Some(exact) = self.setting.exact_time_per_move {
            return exact.as_millis() as i64;
        }
        let time_left = self.setting.time_left.as_millis() as i64;
        let increment = self.setting.increment.as_millis() as i64;
        let moves_to_go = self.compute_moves_to_go() as i64;

        let mut max_time = time_left / 3;
        // Never less than the fair share, never into the reserve
        max_time = max_time.max(time_left / (moves_to_go + 1));
        max_time = max_time.min(time_left - MIN_REMAINING_TIME_MS);
        max_time = max_time.max(increment - 50);
        if time_left - max_time < MIN_REMAINING_TIME_MS {
            max_time = time_left / 5;
        }
        max_time.max(1)
    }
}

#[cfg(test)]
mod clock_tests {
    use super::*;

    fn timed_setting(secs: u64) -> ClockSetting {
        ClockSetting { time_left: Duration::from_secs(secs), ..ClockSetting::default() }
    }

    #[test]
    fn analyze_mode_never_stops() {
        let setting = ClockSetting { analyze: true, ..ClockSetting::default() };
        let mut clock = ClockManager::start_calculating_move(setting);
        clock.set_calculation_depth(30);
        assert!(!clock.should_abort());
        assert!(!clock.emergency_abort());
        assert!(clock.may_compute_next_depth(30));
    }

    #[test]
    fn minimum_depth_always_runs() {
        let mut clock = ClockManager::start_calculating_move(timed_setting(0));
        clock.set_calculation_depth(MIN_DEPTH);
        assert!(!clock.should_abort());
        assert!(clock.may_compute_next_depth(3));
    }

    #[test]
    fn stop_is_sticky() {
        let mut clock = ClockManager::start_calculating_move(timed_setting(60));
        clock.stop_search();
        assert!(clock.should_abort());
        assert!(clock.emergency_abort());
        assert!(!clock.may_compute_next_depth(1));
    }

    #[test]
    fn ponder_switches_to_search() {
        let setting = ClockSetting { ponder: true, time_left: Duration::from_secs(60), ..ClockSetting::default() };
        let mut clock = ClockManager::start_calculating_move(setting);
        assert_eq!(clock.mode(), ClockMode::Ponder);
        clock.set_calculation_depth(20);
        assert!(!clock.should_abort());
        clock.ponder_hit();
        assert_eq!(clock.mode(), ClockMode::Search);
    }

    #[test]
    fn moves_to_go_estimate() {
        let setting = ClockSetting { moves_played: 20, ..timed_setting(60) };
        let clock = ClockManager::start_calculating_move(setting);
        assert_eq!(clock.compute_moves_to_go(), 50);

        let setting = ClockSetting { moves_played: 80, ..timed_setting(60) };
        let clock = ClockManager::start_calculating_move(setting);
        assert_eq!(clock.compute_moves_to_go(), KEEP_TIME_FOR_MOVES);
    }

    #[test]
    fn instability_inflates_average() {
        let mut clock = ClockManager::start_calculating_move(timed_setting(120));
        let normal = clock.average_ms;
        clock.set_calculation_depth(8);
        clock.set_search_result(8, 50);
        clock.set_searched_root_move(false, 50 - CRITICAL_DROP - 5);
        assert_eq!(clock.average_ms, normal * 4);
        clock.set_searched_root_move(true, 0);
        assert_eq!(clock.average_ms, normal * 15);
    }

    #[test]
    fn node_target_stops() {
        let setting = ClockSetting { node_target: 1000, ..ClockSetting::default() };
        let mut clock = ClockManager::start_calculating_move(setting);
        assert!(!clock.stop_on_node_target(999));
        assert!(clock.stop_on_node_target(1001));
        assert!(clock.is_search_stopped());
    }
}
