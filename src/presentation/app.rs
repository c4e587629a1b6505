use crate::domain::settings::SettingsService;
use crate::domain::view::SessionView;
use crate::infrastructure::bluetooth::{AdapterController, BtleplugPlatform};
use crate::infrastructure::logging::{init_logger, LoggingGuard};
use crate::infrastructure::permissions::{DesktopPermissions, PermissionGate};
use crate::infrastructure::session::{SessionConfig, SessionHandle, SessionManager};
use crate::presentation::screen;
use anyhow::Context;
use eframe::egui;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct GlucometerApp {
    pub(crate) settings: SettingsService,
    pub(crate) session: SessionHandle,
    /// Snapshot taken at the start of each frame
    pub(crate) view: SessionView,
    pub(crate) is_dark_mode: bool,

    session_thread: Option<JoinHandle<()>>,
    _logging_guard: Option<LoggingGuard>,
}

impl GlucometerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> anyhow::Result<Self> {
        let settings = SettingsService::new()?;

        let logging_guard = init_logger(&settings.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {:#}", e))
            .ok();

        tracing::info!("Starting Glucometer Link");

        let is_dark_mode = settings.get().dark_mode;
        crate::presentation::theme::configure_neubrutalism(&cc.egui_ctx, is_dark_mode);

        let (session, session_thread) = spawn_session(&settings, cc.egui_ctx.clone())?;

        Ok(Self {
            settings,
            view: session.view(),
            session,
            is_dark_mode,
            session_thread: Some(session_thread),
            _logging_guard: logging_guard,
        })
    }

    pub(crate) fn toggle_dark_mode(&mut self, ctx: &egui::Context) {
        self.is_dark_mode = !self.is_dark_mode;
        crate::presentation::theme::configure_neubrutalism(ctx, self.is_dark_mode);
        if let Err(e) = self.settings.set_dark_mode(self.is_dark_mode) {
            tracing::warn!("Failed to save settings: {:#}", e);
        }
    }
}

/// Run the session on its own thread with a current-thread runtime.
fn spawn_session(
    settings: &SettingsService,
    ctx: egui::Context,
) -> anyhow::Result<(SessionHandle, JoinHandle<()>)> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime for Bluetooth")?;

    let platform = Arc::new(BtleplugPlatform::new(settings.get().connect_timeout()));
    let controller = Arc::new(AdapterController::new(platform));
    let gate = PermissionGate::new(Arc::new(DesktopPermissions));
    let (manager, handle) =
        SessionManager::new(controller, gate, SessionConfig::from(settings.get()));

    let mut updates = handle.watch();
    let thread = std::thread::Builder::new()
        .name("ble-session".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let repaint = tokio::spawn(async move {
                    while updates.changed().await.is_ok() {
                        ctx.request_repaint();
                    }
                });
                manager.run().await;
                repaint.abort();
            });
        })
        .context("Failed to spawn Bluetooth thread")?;

    Ok((handle, thread))
}

impl eframe::App for GlucometerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.view = self.session.view();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.label(egui::RichText::new("Glucometer Link").strong());

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.toggle_dark_mode(ctx);
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(640.0);
                    ui.add_space(20.0);
                    screen::render(self, ui);
                    ui.add_space(50.0);
                });
            });
        });
    }
}

impl Drop for GlucometerApp {
    fn drop(&mut self) {
        self.session.shutdown();
        if let Some(thread) = self.session_thread.take() {
            if thread.join().is_err() {
                eprintln!("Bluetooth thread panicked");
            }
        }
    }
}
