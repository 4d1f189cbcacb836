use std::path::PathBuf;

use client_core::{PreviewImage, SwatchDisplay, DEFAULT_SERVER_URL, PALETTE_SIZE_RANGE};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::protocol::ImageSize;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{
    classify_upload_failure, err_label, UiErrorContext, UiEvent,
};
use crate::controller::orchestration::dispatch_backend_command;

const SWATCH_EDGE: f32 = 56.0;
const DEFAULT_PALETTE_SIZE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusBannerSeverity {
    Error,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    severity: StatusBannerSeverity,
    message: String,
}

pub struct ChromaDeskApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    server_url: String,
    num_colors: u8,

    selected_path: Option<PathBuf>,
    selected_filename: Option<String>,
    preview: Option<PreviewImage>,
    preview_texture: Option<egui::TextureHandle>,

    swatches: Vec<SwatchDisplay>,
    palette_source: Option<String>,
    analyzed_size: Option<ImageSize>,

    uploading: bool,
    status: String,
    status_banner: Option<StatusBanner>,
}

impl ChromaDeskApp {
    pub fn new(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            server_url: DEFAULT_SERVER_URL.to_string(),
            num_colors: DEFAULT_PALETTE_SIZE,
            selected_path: None,
            selected_filename: None,
            preview: None,
            preview_texture: None,
            swatches: Vec::new(),
            palette_source: None,
            analyzed_size: None,
            uploading: false,
            status: "No image selected".to_string(),
            status_banner: None,
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => {
                    self.status = message;
                }
                UiEvent::PreviewLoaded { filename, image } => {
                    self.preview = Some(image);
                    self.preview_texture = None;
                    self.status = format!("Selected {filename}; preview ready");
                    self.selected_filename = Some(filename);
                    self.status_banner = None;
                }
                UiEvent::SwatchesReady {
                    swatches,
                    image_size,
                    source,
                } => {
                    self.uploading = false;
                    self.status = format!("Received {} dominant colors", swatches.len());
                    self.swatches = swatches;
                    self.analyzed_size = image_size;
                    self.palette_source = source;
                    self.status_banner = None;
                }
                UiEvent::Error(err) => {
                    if err.context() == UiErrorContext::Upload {
                        self.uploading = false;
                        self.status = classify_upload_failure(err.message());
                    } else {
                        self.status =
                            format!("{} error: {}", err_label(err.category()), err.message());
                    }
                    self.status_banner = Some(StatusBanner {
                        severity: StatusBannerSeverity::Error,
                        message: self.status.clone(),
                    });
                }
            }
        }
    }

    fn pick_image(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
            .pick_file();
        if let Some(path) = picked {
            self.selected_filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string);
            self.selected_path = Some(path.clone());
            self.status = "Loading preview...".to_string();
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::SelectImage { path },
                &mut self.status,
            );
        }
    }

    fn try_upload(&mut self) {
        if self.selected_path.is_none() {
            self.status = "Select an image before uploading".to_string();
            self.status_banner = Some(StatusBanner {
                severity: StatusBannerSeverity::Error,
                message: "Please select an image first.".to_string(),
            });
            return;
        }

        let server_url = self.server_url.trim().to_string();
        if server_url.is_empty() {
            self.status = "Server URL is required".to_string();
            self.status_banner = Some(StatusBanner {
                severity: StatusBannerSeverity::Error,
                message: "Please enter the analysis service URL.".to_string(),
            });
            return;
        }

        self.status_banner = None;
        self.status = "Uploading image for analysis...".to_string();
        let queued = dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::Upload {
                server_url,
                num_colors: self.num_colors,
            },
            &mut self.status,
        );
        self.uploading = queued;
    }

    fn ensure_preview_texture(&mut self, ctx: &egui::Context) {
        if self.preview_texture.is_some() {
            return;
        }
        let Some(preview) = &self.preview else {
            return;
        };
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [preview.width, preview.height],
            &preview.rgba,
        );
        self.preview_texture = Some(ctx.load_texture(
            "selected-image-preview",
            color_image,
            egui::TextureOptions::LINEAR,
        ));
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        if let Some(banner) = self.status_banner.clone() {
            let (fill, stroke) = match banner.severity {
                StatusBannerSeverity::Error => (
                    egui::Color32::from_rgb(111, 53, 53),
                    egui::Stroke::new(1.0, egui::Color32::from_rgb(175, 96, 96)),
                ),
            };

            egui::Frame::NONE
                .fill(fill)
                .stroke(stroke)
                .corner_radius(8.0)
                .inner_margin(egui::Margin::symmetric(10, 8))
                .show(ui, |ui| {
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(&banner.message).color(egui::Color32::WHITE));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Dismiss").clicked() {
                                self.status_banner = None;
                            }
                        });
                    });
                });
            ui.add_space(6.0);
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Choose image...").clicked() {
                self.pick_image();
            }
            match &self.selected_filename {
                Some(name) => {
                    ui.label(egui::RichText::new(name).strong());
                }
                None => {
                    ui.weak("No image selected");
                }
            }
        });

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            ui.label("Server URL");
            ui.add(
                egui::TextEdit::singleline(&mut self.server_url)
                    .hint_text(DEFAULT_SERVER_URL)
                    .desired_width(240.0),
            );
            ui.add(
                egui::Slider::new(&mut self.num_colors, PALETTE_SIZE_RANGE).text("colors"),
            );

            let can_upload = !self.uploading && self.selected_path.is_some();
            if ui
                .add_enabled(can_upload, egui::Button::new("Upload image"))
                .clicked()
            {
                self.try_upload();
            }
            if self.uploading {
                ui.spinner();
            }
        });
    }

    fn show_preview(&mut self, ui: &mut egui::Ui) {
        if let Some(texture) = &self.preview_texture {
            ui.add_space(10.0);
            let size = texture.size_vec2();
            ui.add(egui::Image::new((texture.id(), size)).fit_to_exact_size(size));
        }
    }

    fn show_swatch_strip(&mut self, ui: &mut egui::Ui) {
        if self.swatches.is_empty() {
            return;
        }

        ui.add_space(12.0);
        ui.separator();
        ui.horizontal(|ui| {
            ui.strong("Dominant colors");
            if let Some(source) = &self.palette_source {
                ui.weak(format!("from {source}"));
            }
            if let Some(size) = self.analyzed_size {
                ui.weak(format!("({}x{} px)", size.width, size.height));
            }
        });
        ui.add_space(6.0);

        let mut copied: Option<String> = None;
        ui.horizontal_wrapped(|ui| {
            for row in &self.swatches {
                ui.vertical(|ui| {
                    ui.set_max_width(SWATCH_EDGE + 8.0);
                    let (rect, response) = ui.allocate_exact_size(
                        egui::vec2(SWATCH_EDGE, SWATCH_EDGE),
                        egui::Sense::click(),
                    );
                    let fill = egui::Color32::from_rgb(row.rgb[0], row.rgb[1], row.rgb[2]);
                    ui.painter()
                        .rect_filled(rect, egui::CornerRadius::same(6), fill);
                    if response.hovered() {
                        ui.painter().rect_stroke(
                            rect,
                            egui::CornerRadius::same(6),
                            egui::Stroke::new(1.5, ui.visuals().strong_text_color()),
                            egui::StrokeKind::Middle,
                        );
                    }
                    let response = response.on_hover_text(row.tooltip());
                    if response.clicked() {
                        copied = Some(row.hex.clone());
                    }
                    ui.small(row.hex.as_str());
                    ui.small(row.percentage_label());
                });
            }
        });

        if let Some(hex) = copied {
            self.copy_hex_to_clipboard(&hex);
        }
    }

    fn copy_hex_to_clipboard(&mut self, hex: &str) {
        match arboard::Clipboard::new() {
            Ok(mut clipboard) => match clipboard.set_text(hex.to_string()) {
                Ok(()) => self.status = format!("Copied {hex} to clipboard"),
                Err(err) => self.status = format!("Failed to copy {hex}: {err}"),
            },
            Err(err) => self.status = format!("Clipboard unavailable: {err}"),
        }
    }
}

impl eframe::App for ChromaDeskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.ensure_preview_texture(ctx);

        // Backend events arrive over a channel, so poll for them even when
        // the user is not interacting with the window.
        ctx.request_repaint_after(std::time::Duration::from_millis(200));

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                ui.small("Status:");
                ui.small(egui::RichText::new(&self.status).weak());
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Chroma Desk");
            ui.weak("Bring the image, we give you the colors.");
            ui.add_space(8.0);

            self.show_status_banner(ui);
            self.show_controls(ui);

            egui::ScrollArea::vertical().show(ui, |ui| {
                self.show_preview(ui);
                self.show_swatch_strip(ui);
            });
        });
    }
}
