use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Spinner per phase of a multi-phase operation, numbered `Phase n/total`.
pub struct PhaseProgress {
    total: usize,
    current: usize,
    visible: bool,
    pb: Option<ProgressBar>,
}

impl PhaseProgress {
    pub fn new(title: &str, total: usize) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright(title).underlined());
        Self {
            total,
            current: 0,
            visible: true,
            pb: None,
        }
    }

    /// Tracks phases without drawing anything.
    pub fn hidden() -> Self {
        Self {
            total: 0,
            current: 0,
            visible: false,
            pb: None,
        }
    }

    pub fn start(&mut self, message: &str) {
        self.current += 1;
        if self.current > self.total {
            self.total = self.current;
        }
        let text = bright_yellow(format!("{}: {message}", self.label())).to_string();
        self.pb = Some(create_spinner(text, self.visible));
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.pb.take() {
            pb.finish_with_message(
                bright_green(format!("{}: {message} ✓", self.label())).to_string(),
            );
        }
    }

    fn label(&self) -> String {
        format!("Phase {}/{}", self.current, self.total)
    }
}

impl Drop for PhaseProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.abandon();
        }
    }
}

fn create_spinner(message: String, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
