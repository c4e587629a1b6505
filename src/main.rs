mod domain;
mod infrastructure;
mod presentation;

use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 760.0])
            .with_min_inner_size([420.0, 480.0])
            .with_title("Glucometer Link"),
        ..Default::default()
    };

    eframe::run_native(
        "Glucometer Link",
        options,
        Box::new(|cc| Ok(Box::new(presentation::app::GlucometerApp::new(cc)?))),
    )
}
