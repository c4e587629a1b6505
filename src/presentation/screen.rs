//! Bluetooth Glucometer Screen
//!
//! Renders the current [`SessionView`](crate::domain::view::SessionView) and
//! turns button clicks into session intents. Nothing here touches the registry.

use crate::domain::view::{DeviceRow, RowAction};
use crate::presentation::app::GlucometerApp;
use crate::presentation::components::Components;
use crate::presentation::theme::BrutalistPalette;
use eframe::egui;

pub fn render(app: &mut GlucometerApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Please connect to your bluetooth Glucometer");
    ui.add_space(20.0);

    ui_scan_panel(app, ui);
    ui.add_space(15.0);

    ui_status_panel(app, ui);

    let palette = BrutalistPalette::new(app.is_dark_mode);

    let discovered = app.view.discovered.clone();
    device_list(
        app,
        ui,
        &palette,
        "Discovered Devices:",
        "No Bluetooth devices found",
        &discovered,
    );
    ui.add_space(15.0);

    let connected = app.view.connected.clone();
    device_list(
        app,
        ui,
        &palette,
        "Connected Devices:",
        "No connected devices",
        &connected,
    );
}

fn ui_scan_panel(app: &mut GlucometerApp, ui: &mut egui::Ui) {
    ui.horizontal(|ui| {
        let scanning = app.view.is_scanning;
        let scan_button = egui::Button::new(app.view.scan_label());
        if ui
            .add_enabled(!scanning && app.view.started, scan_button)
            .clicked()
        {
            app.session.request_scan();
        }

        if scanning {
            ui.spinner();
            if ui.button("Stop").clicked() {
                app.session.request_stop_scan();
            }
        } else if !app.view.started {
            ui.spinner();
            ui.label("Starting Bluetooth...");
        }
    });
}

fn ui_status_panel(app: &GlucometerApp, ui: &mut egui::Ui) {
    if let Some(msg) = &app.view.status {
        let (bg, fg) = BrutalistPalette::new(app.is_dark_mode).severity_colors(msg.severity);
        Components::status_banner(ui, &msg.message, bg, fg);
        ui.add_space(15.0);
    }
}

fn device_list(
    app: &mut GlucometerApp,
    ui: &mut egui::Ui,
    palette: &BrutalistPalette,
    title: &str,
    empty_text: &str,
    rows: &[DeviceRow],
) {
    Components::brutalist_card(ui, title, |ui| {
        if rows.is_empty() {
            ui.label(egui::RichText::new(empty_text).color(palette.muted));
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt(title)
            .max_height(220.0)
            .show(ui, |ui| {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        ui.separator();
                    }
                    let busy = app.view.is_pending(&row.id);
                    match Components::device_row(ui, row, palette, busy) {
                        Some(RowAction::Connect) => app.session.request_connect(&row.id),
                        Some(RowAction::Disconnect) => app.session.request_disconnect(&row.id),
                        None => {}
                    }
                }
            });
    });
}
