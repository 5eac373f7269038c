//! Status bar at the bottom of the window.

use eframe::egui::{self, RichText};

use crate::app::ImgfetchApp;
use crate::ui::colors;

/// Render the status bar.
pub fn render(app: &ImgfetchApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());

    ui.horizontal(|ui| {
        if let Some((msg, _)) = &app.status_message {
            ui.label(RichText::new(msg).size(11.0).color(muted));
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(
                RichText::new(format!("v{}", imgfetch_core::VERSION))
                    .size(11.0)
                    .color(muted),
            );

            let stage = match app.pipeline_state {
                imgfetch_core::PipelineState::Idle => None,
                imgfetch_core::PipelineState::Downloading => Some("Downloading"),
                imgfetch_core::PipelineState::Extracting => Some("Extracting"),
            };
            if let Some(stage) = stage {
                ui.separator();
                ui.label(RichText::new(stage).size(11.0).color(muted));
            }
        });
    });
}
