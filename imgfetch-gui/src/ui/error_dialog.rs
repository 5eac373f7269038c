//! Modal shown when a run fails.

use eframe::egui::{self, RichText, Vec2};

use crate::app::ImgfetchApp;
use crate::ui::colors;

/// Render the error dialog for `app.error_message`.
pub fn render(app: &mut ImgfetchApp, ctx: &egui::Context) {
    let Some(message) = app.error_message.clone() else {
        return;
    };

    let mut dismissed = false;
    egui::Window::new("Error")
        .collapsible(false)
        .resizable(false)
        .default_width(380.0)
        .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
        .show(ctx, |ui| {
            ui.label(RichText::new(&message).color(colors::ERROR));
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("  OK  ").clicked() {
                    dismissed = true;
                }
            });
        });

    if dismissed || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
        app.error_message = None;
    }
}
