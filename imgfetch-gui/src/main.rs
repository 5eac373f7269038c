//! imgfetch GUI Application
//!
//! Downloads a firmware image archive and unpacks it next to the tools that
//! flash it.

mod app;
mod ui;

use eframe::egui;

fn main() -> eframe::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imgfetch=debug".parse().unwrap())
                .add_directive("imgfetch_core=debug".parse().unwrap())
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting imgfetch v{}", imgfetch_core::VERSION);

    // Create tokio runtime for the pipeline and dialogs
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let handle = runtime.handle().clone();
    let _guard = handle.enter();

    // Window configuration
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 190.0])
            .with_min_inner_size([420.0, 170.0])
            .with_resizable(false)
            .with_title("Downloader"),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "imgfetch",
        options,
        Box::new(|cc| Ok(Box::new(app::ImgfetchApp::new(cc, runtime)?))),
    )
}
