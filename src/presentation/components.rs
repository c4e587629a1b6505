use crate::domain::view::{DeviceRow, RowAction};
use crate::presentation::theme::BrutalistPalette;
use eframe::egui;

pub struct Components;

impl Components {
    pub fn heading(ui: &mut egui::Ui, text: &str) {
        ui.label(egui::RichText::new(text).heading().strong());
    }

    pub fn brutalist_card<R>(
        ui: &mut egui::Ui,
        title: &str,
        add_contents: impl FnOnce(&mut egui::Ui) -> R,
    ) -> R {
        let stroke = ui.style().visuals.widgets.noninteractive.bg_stroke;
        let bg = ui.style().visuals.widgets.noninteractive.bg_fill;

        egui::Frame::none()
            .inner_margin(egui::Margin::same(15.0))
            .stroke(stroke)
            .fill(bg)
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(title).strong().size(18.0));
                    ui.add_space(8.0);
                    add_contents(ui)
                })
                .inner
            })
            .inner
    }

    pub fn status_banner(
        ui: &mut egui::Ui,
        text: &str,
        bg_color: egui::Color32,
        text_color: egui::Color32,
    ) {
        ui.add_sized(
            [ui.available_width(), 35.0],
            egui::Label::new(
                egui::RichText::new(text)
                    .color(text_color)
                    .background_color(bg_color)
                    .size(16.0)
                    .strong(),
            )
            .wrap_mode(egui::TextWrapMode::Wrap),
        );
    }

    /// One peripheral: name, id, signal and its Connect/Disconnect button.
    ///
    /// Returns the action when the button was clicked.
    pub fn device_row(
        ui: &mut egui::Ui,
        row: &DeviceRow,
        palette: &BrutalistPalette,
        busy: bool,
    ) -> Option<RowAction> {
        let mut clicked = None;
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(egui::RichText::new(row.display_name()).strong());
                let mut detail = row.id.clone();
                if let Some(rssi) = row.rssi {
                    detail.push_str(&format!("  ({} dBm)", rssi));
                }
                ui.label(egui::RichText::new(detail).small().color(palette.muted));
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let action = row.action();
                let label = match action {
                    RowAction::Connect => "Connect",
                    RowAction::Disconnect => "Disconnect",
                };
                if ui.add_enabled(!busy, egui::Button::new(label)).clicked() {
                    clicked = Some(action);
                }
            });
        });
        clicked
    }
}
