//! UI components for imgfetch.

pub mod downloader;
pub mod error_dialog;
pub mod status;

// Theme-aware colors for the UI
pub mod colors {
    use eframe::egui::{Color32, Visuals};

    /// Primary action (DOWNLOAD)
    pub const ACTION: Color32 = Color32::from_rgb(59, 130, 246); // Blue

    /// Error red, also used for STOP
    pub const ERROR: Color32 = Color32::from_rgb(239, 68, 68);

    /// Get muted text color based on theme
    pub fn muted(visuals: &Visuals) -> Color32 {
        if visuals.dark_mode {
            Color32::from_rgb(156, 163, 175)
        } else {
            Color32::from_rgb(100, 100, 110)
        }
    }
}
