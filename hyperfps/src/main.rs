use std::sync::Arc;

use hyperfps_core::{
    AppConfig, ConfigStore, FileConfigStore, RefreshRate, TileSnapshot, ToggleCoordinator,
    ToggleError,
};
use iced::keyboard::{self, Event as KeyboardEvent, Key};
use iced::widget::{button, column, container, row, text, text_input, toggler};
use iced::{Element, Subscription, Task, Theme};
use log::{error, info};

const PERMISSION_HINT: &str = "Grant it once with: adb shell pm grant <package> android.permission.WRITE_SECURE_SETTINGS";

pub fn main() -> iced::Result {
    env_logger::init();

    // Without the settings file there is nothing to toggle.
    let services = match Services::start() {
        Ok(services) => services,
        Err(e) => {
            error!("startup failed: {}", e);
            eprintln!("HyperFPS could not start: {}", e);
            std::process::exit(1);
        }
    };

    iced::application(
        move || HyperFpsApp::new(services.clone()),
        HyperFpsApp::update,
        HyperFpsApp::view,
    )
    .title("HyperFPS - Refresh Rate Toggle")
    .subscription(HyperFpsApp::subscription)
    .theme(HyperFpsApp::theme)
    .run()
}

#[derive(Clone)]
struct Services {
    store: Arc<FileConfigStore>,
    coordinator: Arc<ToggleCoordinator>,
}

impl Services {
    fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load()?;
        let store = Arc::new(FileConfigStore::open_default()?);
        info!("tile settings at {}", store.path().display());

        let coordinator = ToggleCoordinator::start(
            store.clone(),
            Arc::new(config.rate_controller()),
            config.coordinator_options(),
        )?;

        Ok(Self {
            store,
            coordinator: Arc::new(coordinator),
        })
    }
}

struct HyperFpsApp {
    services: Services,
    status_message: Option<String>,

    // Display state
    current_rate: Option<RefreshRate>,
    tile: Option<TileSnapshot>,

    // Direct rate form
    direct_input: String,
    applying_direct: bool,

    // Tile preset form
    off_input: String,
    on_input: String,
    saving_presets: bool,

    applying_toggle: bool,
}

#[derive(Debug, Clone)]
enum Message {
    // Direct rate
    DirectInputChanged(String),
    ApplyDirect,
    DirectApplied(Result<RefreshRate, String>),

    // Presets
    OffInputChanged(String),
    OnInputChanged(String),
    SavePresets,
    PresetsSaved(Result<(RefreshRate, RefreshRate), String>),

    // Tile
    ToggleTile,
    TileToggled(Result<TileSnapshot, String>),

    // Sync
    CurrentRateLoaded(Result<Option<RefreshRate>, String>),
    SyncFromDevice,
    Synced(Result<Option<RefreshRate>, String>),

    // Keyboard event
    KeyboardEvent(KeyboardEvent),
}

fn describe(e: &ToggleError) -> String {
    if e.is_permission_denied() {
        format!("{}. {}", e, PERMISSION_HINT)
    } else {
        e.to_string()
    }
}

impl HyperFpsApp {
    fn new(services: Services) -> (Self, Task<Message>) {
        let mut app = Self {
            off_input: services.store.off_rate().to_string(),
            on_input: services.store.on_rate().to_string(),
            services,
            status_message: None,
            current_rate: None,
            tile: None,
            direct_input: String::new(),
            applying_direct: false,
            saving_presets: false,
            applying_toggle: false,
        };

        app.refresh_tile();

        // Read the current rate off the UI thread
        let coordinator = app.services.coordinator.clone();
        let load = Task::perform(
            async move {
                coordinator
                    .refresh_applied_rate()
                    .map_err(|e| describe(&e))
            },
            Message::CurrentRateLoaded,
        );

        (app, load)
    }

    /// The tile only ever shows what the coordinator reports.
    fn refresh_tile(&mut self) {
        match self.services.coordinator.snapshot() {
            Ok(snapshot) => self.tile = Some(snapshot),
            Err(e) => self.status_message = Some(format!("Tile error: {}", describe(&e))),
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        // Clear previous messages on new actions
        if !matches!(
            message,
            Message::CurrentRateLoaded(_) | Message::SyncFromDevice | Message::KeyboardEvent(_)
        ) {
            self.status_message = None;
        }

        match message {
            Message::DirectInputChanged(value) => {
                self.direct_input = value;
            }

            Message::ApplyDirect => {
                let rate = match self.direct_input.parse::<RefreshRate>() {
                    Ok(rate) => rate,
                    Err(e) => {
                        self.status_message = Some(e.to_string());
                        return Task::none();
                    }
                };

                self.applying_direct = true;
                let coordinator = self.services.coordinator.clone();
                return Task::perform(
                    async move {
                        coordinator
                            .set_rate_directly(rate)
                            .map_err(|e| describe(&e))
                    },
                    Message::DirectApplied,
                );
            }

            Message::DirectApplied(result) => {
                self.applying_direct = false;
                match result {
                    Ok(rate) => {
                        self.current_rate = Some(rate);
                        self.status_message = Some(format!("Refresh rate set to {} Hz", rate));
                    }
                    Err(e) => {
                        self.status_message = Some(format!("Apply failed: {}", e));
                    }
                }
            }

            Message::OffInputChanged(value) => {
                self.off_input = value;
            }

            Message::OnInputChanged(value) => {
                self.on_input = value;
            }

            Message::SavePresets => {
                let parsed = self
                    .off_input
                    .parse::<RefreshRate>()
                    .and_then(|off| Ok((off, self.on_input.parse::<RefreshRate>()?)));
                let (off, on) = match parsed {
                    Ok(rates) => rates,
                    Err(e) => {
                        self.status_message = Some(e.to_string());
                        return Task::none();
                    }
                };

                self.saving_presets = true;
                let store = self.services.store.clone();
                return Task::perform(
                    async move {
                        store.set_off_rate(off).map_err(|e| e.to_string())?;
                        store.set_on_rate(on).map_err(|e| e.to_string())?;
                        Ok::<_, String>((off, on))
                    },
                    Message::PresetsSaved,
                );
            }

            Message::PresetsSaved(result) => {
                self.saving_presets = false;
                match result {
                    Ok((off, on)) => {
                        self.status_message =
                            Some(format!("Tile presets saved - OFF: {} Hz, ON: {} Hz", off, on));
                    }
                    Err(e) => {
                        self.status_message = Some(format!("Save failed: {}", e));
                    }
                }
                self.refresh_tile();
            }

            Message::ToggleTile => {
                if self.applying_toggle {
                    return Task::none();
                }

                self.applying_toggle = true;
                let coordinator = self.services.coordinator.clone();
                return Task::perform(
                    async move { coordinator.toggle_requested().map_err(|e| describe(&e)) },
                    Message::TileToggled,
                );
            }

            Message::TileToggled(result) => {
                self.applying_toggle = false;
                match result {
                    Ok(snapshot) => {
                        self.current_rate = Some(snapshot.subtitle_rate);
                        self.tile = Some(snapshot);
                    }
                    Err(e) => {
                        self.status_message = Some(format!("Toggle failed: {}", e));
                        self.refresh_tile();
                    }
                }
            }

            Message::CurrentRateLoaded(result) => match result {
                Ok(rate) => self.current_rate = rate,
                Err(e) => self.status_message = Some(format!("Sync error: {}", e)),
            },

            Message::SyncFromDevice => {
                let coordinator = self.services.coordinator.clone();
                return Task::perform(
                    async move {
                        coordinator
                            .refresh_applied_rate()
                            .map_err(|e| describe(&e))
                    },
                    Message::Synced,
                );
            }

            Message::Synced(result) => {
                match result {
                    Ok(rate) => {
                        self.current_rate = rate;
                        self.status_message = Some("Synced!".to_string());
                    }
                    Err(e) => {
                        self.status_message = Some(format!("Sync error: {}", e));
                    }
                }
                self.refresh_tile();
            }

            Message::KeyboardEvent(event) => {
                if let KeyboardEvent::KeyPressed { key, modifiers, .. } = event {
                    // Check for Ctrl+Shift+Win (Logo) modifier combination
                    let has_modifiers =
                        modifiers.control() && modifiers.shift() && modifiers.logo();

                    if has_modifiers {
                        match key.as_ref() {
                            Key::Character(c) if c == "/" => {
                                return self.update(Message::ToggleTile);
                            }
                            Key::Character(c) if c == "." || c == ">" => {
                                return self.update(Message::SyncFromDevice);
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        Task::none()
    }

    fn view(&self) -> Element<'_, Message> {
        let title = text("HyperFPS").size(32);

        // Status message
        let status = if let Some(ref msg) = self.status_message {
            text(msg).size(14)
        } else {
            text("").size(14)
        };

        let current = match self.current_rate {
            Some(rate) => text(format!("Current refresh rate: {} Hz", rate)).size(18),
            None => text("Current refresh rate: unknown").size(18),
        };

        // Quick toggle (renders the coordinator snapshot only)
        let tile_section = match &self.tile {
            Some(tile) => {
                let mut tile_toggle = toggler(tile.is_active)
                    .label(format!("{} - {}Hz", tile.label, tile.subtitle_rate));
                if !self.applying_toggle {
                    tile_toggle = tile_toggle.on_toggle(|_| Message::ToggleTile);
                }
                column![tile_toggle]
            }
            None => column![text("Tile unavailable").size(14)],
        }
        .spacing(5);

        // Direct refresh rate
        let mut direct_input = text_input("e.g. 60, 120, 144, 165", &self.direct_input);
        let mut apply_button = button(text(if self.applying_direct {
            "Applying..."
        } else {
            "Apply"
        }));
        if !self.applying_direct {
            direct_input = direct_input
                .on_input(Message::DirectInputChanged)
                .on_submit(Message::ApplyDirect);
            apply_button = apply_button.on_press(Message::ApplyDirect);
        }
        let direct_section = column![
            text("Set refresh rate now").size(20),
            text("Enter a target refresh rate and apply it immediately").size(14),
            row![direct_input, apply_button].spacing(10),
        ]
        .spacing(5);

        // Tile presets
        let mut off_input = text_input("e.g. 60", &self.off_input);
        let mut on_input = text_input("e.g. 120", &self.on_input);
        let mut save_button = button(text(if self.saving_presets {
            "Saving..."
        } else {
            "Save settings"
        }));
        if !self.saving_presets {
            off_input = off_input.on_input(Message::OffInputChanged);
            on_input = on_input.on_input(Message::OnInputChanged);
            save_button = save_button.on_press(Message::SavePresets);
        }
        let presets_section = column![
            text("Quick toggle settings").size(20),
            text("OFF refresh rate (Hz)").size(14),
            off_input,
            text("ON refresh rate (Hz)").size(14),
            on_input,
            save_button,
        ]
        .spacing(5);

        // Sync button
        let sync_button = button("Sync from Device").on_press(Message::SyncFromDevice);

        // Keyboard shortcuts hint
        let shortcuts_hint =
            text("Shortcuts: Ctrl+Shift+Win+/ (toggle) | Ctrl+Shift+Win+. (sync)").size(12);

        // Main layout
        let content = column![
            title,
            status,
            current,
            tile_section,
            direct_section,
            presets_section,
            sync_button,
            text(PERMISSION_HINT).size(12),
            shortcuts_hint,
        ]
        .spacing(15)
        .padding(20);

        container(content).into()
    }

    fn subscription(&self) -> Subscription<Message> {
        keyboard::listen().map(Message::KeyboardEvent)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
