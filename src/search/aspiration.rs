use super::search::{INFINITY, NEAR_CHECKMATE};

/// How the value has been moving across re-searches at the current depth
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowState {
    Search,
    Rising,
    Dropping,
    Alternating,
}

const STABLE_DEPTH: i32 = 8;
/// Mate-class values widen the corresponding side all the way
const MATE_BAND: i32 = 2000;
const MAX_RETRIES: i32 = 4;

/// Bounds for the next root search. Starts narrow around the previous
/// value, widens whichever side a result falls out of, and gives up to the
/// full window after repeated failures or alternation.
pub struct AspirationWindow {
    state: WindowState,
    retry_count: i32,
    alternate_count: i32,
    alpha: i32,
    beta: i32,
    position_value: i32,
    search_depth: i32,
}

impl Default for AspirationWindow {
    fn default() -> Self {
        Self {
            state: WindowState::Search,
            retry_count: 0,
            alternate_count: 0,
            alpha: -INFINITY,
            beta: INFINITY,
            position_value: 0,
            search_depth: 0,
        }
    }
}

impl AspirationWindow {
    pub fn init_search(&mut self) {
        *self = Self::default();
    }

    pub const fn alpha(&self) -> i32 {
        self.alpha
    }

    pub const fn beta(&self) -> i32 {
        self.beta
    }

    pub const fn state(&self) -> WindowState {
        self.state
    }

    pub const fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn is_inside(&self, value: i32) -> bool {
        value > self.alpha && value < self.beta
    }

    /// Opens a window around the previous value for a fresh depth
    pub fn new_depth(&mut self, depth: i32) {
        self.search_depth = depth;
        self.state = WindowState::Search;
        self.alternate_count = 0;
        self.retry_count /= 2;
        let size = self.window_size(0);
        self.set_window(size);
    }

    /// Feeds a search result back; when it fell outside the window the state
    /// advances and the window widens for the re-search
    pub fn set_search_result(&mut self, value: i32) {
        if !self.is_inside(value) {
            self.state = match self.state {
                WindowState::Search => {
                    if value > self.position_value {
                        WindowState::Rising
                    } else {
                        WindowState::Dropping
                    }
                }
                WindowState::Rising => {
                    if value > self.position_value {
                        WindowState::Rising
                    } else {
                        WindowState::Alternating
                    }
                }
                WindowState::Dropping => {
                    if value < self.position_value {
                        WindowState::Dropping
                    } else {
                        WindowState::Alternating
                    }
                }
                WindowState::Alternating => WindowState::Alternating,
            };
            self.retry_count += 1;
        }
        if self.state == WindowState::Alternating {
            self.alternate_count += 1;
        }
        let delta = value - self.position_value;
        self.position_value = value;
        let size = self.window_size(delta);
        self.set_window(size);
    }

    fn window_size(&self, value_delta: i32) -> i32 {
        let depth_related = (STABLE_DEPTH - self.search_depth).max(0) * 10;
        let delta_related = value_delta.abs();
        let value_related = self.position_value.abs() / 20;
        let retry_related = self.retry_count * 30;
        15 + delta_related + depth_related + value_related + retry_related
    }

    fn set_window(&mut self, size: i32) {
        let value = self.position_value;
        match self.state {
            WindowState::Rising => {
                // Only the failed side widens; alpha keeps its bound
                self.beta = value + size;
            }
            WindowState::Dropping => {
                self.alpha = value - size;
                self.beta = value + size;
            }
            _ => {
                self.alpha = value - size;
                self.beta = value + size;
            }
        }
        if self.alternate_count >= 2 || self.retry_count >= MAX_RETRIES {
            self.alpha = -INFINITY;
            self.beta = INFINITY;
        }
        if self.alpha < -MATE_BAND {
            self.alpha = -INFINITY;
        }
        if self.beta > MATE_BAND {
            self.beta = INFINITY;
        }
        debug_assert!((-INFINITY..NEAR_CHECKMATE).contains(&self.alpha));
    }
}

#[cfg(test)]
mod aspiration_tests {
    use super::*;

    #[test]
    fn initial_window_is_narrow_at_high_depth() {
        let mut w = AspirationWindow::default();
        w.new_depth(8);
        assert_eq!(w.alpha(), -15);
        assert_eq!(w.beta(), 15);
    }

    #[test]
    fn fail_high_widens_beta_only() {
        let mut w = AspirationWindow::default();
        w.new_depth(8);
        let alpha_before = w.alpha();
        w.set_search_result(200);
        assert_eq!(w.state(), WindowState::Rising);
        assert_eq!(w.retry_count(), 1);
        assert_eq!(w.alpha(), alpha_before);
        assert!(w.beta() > 215);
    }

    #[test]
    fn windows_widen_monotonically_and_terminate() {
        let mut w = AspirationWindow::default();
        w.new_depth(8);
        let mut last_width = w.beta() - w.alpha();
        // Keep failing high; the window must reach full range quickly
        for i in 0..MAX_RETRIES {
            w.set_search_result(w.beta() + 1);
            let width = w.beta() - w.alpha();
            assert!(width >= last_width, "window shrank on retry {i}");
            last_width = width;
        }
        assert_eq!(w.alpha(), -INFINITY);
        assert_eq!(w.beta(), INFINITY);
    }

    #[test]
    fn alternation_gives_up_the_window() {
        let mut w = AspirationWindow::default();
        w.new_depth(10);
        w.set_search_result(w.beta() + 1);
        assert_eq!(w.state(), WindowState::Rising);
        w.set_search_result(w.alpha() - 1);
        assert_eq!(w.state(), WindowState::Alternating);
        w.set_search_result(w.beta() + 1);
        assert_eq!(w.alpha(), -INFINITY);
        assert_eq!(w.beta(), INFINITY);
    }

    #[test]
    fn mate_scores_open_the_mated_side() {
        let mut w = AspirationWindow::default();
        w.new_depth(12);
        w.set_search_result(2400);
        assert_eq!(w.beta(), INFINITY);
    }
}
