#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    RED,
    GREEN,
}

/// Progress message sent from the acquisition thread to the UI.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, color: BarColor) -> Self {
        Self { progress, color }
    }
}
