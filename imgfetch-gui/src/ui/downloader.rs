//! The downloader form: location, URL, DOWNLOAD/STOP, progress.

use eframe::egui::{self, RichText, Rounding, Vec2};

use imgfetch_core::{truncate_path, ProgressDisplay, PROGRESS_SCALE};

use crate::app::ImgfetchApp;
use crate::ui::colors;

/// Longest location label before middle components collapse.
const LOCATION_MAX_LEN: usize = 30;

/// Indicator state driven by the progress reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub value: u32,
    pub status: String,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            value: 0,
            status: "Ready".to_string(),
        }
    }
}

impl ProgressView {
    pub fn fraction(&self) -> f32 {
        self.value.min(PROGRESS_SCALE) as f32 / PROGRESS_SCALE as f32
    }
}

impl ProgressDisplay for ProgressView {
    fn set_value(&mut self, value: u32) {
        self.value = value;
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

/// Render the downloader form.
pub fn render(app: &mut ImgfetchApp, ui: &mut egui::Ui) {
    let running = app.is_running();
    let muted = colors::muted(ui.visuals());

    egui::Grid::new("downloader_grid")
        .num_columns(2)
        .spacing([12.0, 10.0])
        .show(ui, |ui| {
            // -----------------------------------------------------------------
            // Location
            // -----------------------------------------------------------------
            ui.label("Location:");
            let destination = app.destination();
            let truncated = truncate_path(&destination, LOCATION_MAX_LEN);
            let link = ui
                .add_enabled(!running, egui::Link::new(truncated))
                .on_hover_text(destination.display().to_string());
            if link.clicked() {
                app.open_folder_dialog();
            }
            ui.end_row();

            // -----------------------------------------------------------------
            // URL
            // -----------------------------------------------------------------
            ui.label("URL:");
            ui.horizontal(|ui| {
                let presets = app.settings.urls.clone();
                ui.add_enabled_ui(!running, |ui| {
                    egui::ComboBox::from_id_salt("url_presets")
                        .selected_text("")
                        .width(24.0)
                        .show_ui(ui, |ui| {
                            for url in &presets {
                                ui.selectable_value(&mut app.url_input, url.clone(), url.as_str());
                            }
                        });
                    ui.add(
                        egui::TextEdit::singleline(&mut app.url_input)
                            .desired_width(f32::INFINITY)
                            .hint_text("https://"),
                    );
                });
            });
            ui.end_row();

            // -----------------------------------------------------------------
            // Toggle + status
            // -----------------------------------------------------------------
            ui.label("");
            ui.horizontal(|ui| {
                let (label, fill) = if running {
                    ("STOP", colors::ERROR)
                } else {
                    ("DOWNLOAD", colors::ACTION)
                };
                let button = egui::Button::new(RichText::new(label).strong())
                    .fill(fill)
                    .rounding(Rounding::same(6.0));
                if ui.add_sized(Vec2::new(110.0, 26.0), button).clicked() {
                    app.toggle_download();
                }

                ui.label(RichText::new(&app.progress.status).color(muted));
            });
            ui.end_row();

            // -----------------------------------------------------------------
            // Progress
            // -----------------------------------------------------------------
            ui.label("Progress:");
            ui.add(egui::ProgressBar::new(app.progress.fraction()).show_percentage());
            ui.end_row();
        });
}
