use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::executor;
use iced::time::{every as iced_time_every};
use iced::theme::{self, Theme};
use iced::widget::{
    Column, Row, button, column, container, horizontal_rule, row, scrollable, slider, text, text_input,
};
use log::{info, warn};
use tokio_util::sync::{CancellationToken};

use crate::config::types::SessionConfig;
use crate::device::constants::{KNOWN_MODES, SPEED_MAX};
use crate::device::types::{DeviceEvent, DeviceState, SessionCommand, SessionHandle};
use crate::error::AppRunError;
use crate::gui::preview::{preview_interval, Preview};
use crate::gui::style::LampStyleSheet;
use crate::gui::subscription::session_subscription;
use crate::gui::types::Message;
use crate::protocol::command::Command as LightCommand;
use crate::state::DeviceSnapshot;

/// How many lines the diagnostic console keeps.
const CONSOLE_LINES: usize = 200;

pub struct ApplicationFlags {
    pub config: SessionConfig,
}

pub struct AmpelApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,
    config: SessionConfig,

    // commands for the session task, available once the session subscription has started
    session: Option<SessionHandle>,

    // latest state from the device
    device_state: DeviceState,
    snapshot: DeviceSnapshot,
    raw_status: Option<String>,
    console: Vec<String>,

    // form state
    speed: u32,
    direct_input: String,

    // local animation, never sent to the device
    preview: Option<Preview>,
}

impl AmpelApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn push_console(&mut self, line: String) {
        self.console.push(line);
        if self.console.len() > CONSOLE_LINES {
            let excess = self.console.len() - CONSOLE_LINES;
            self.console.drain(..excess);
        }
    }

    fn send_command(&mut self, command: SessionCommand) -> Command<Message> {
        let Some(handle) = self.session.clone() else {
            warn!("Session not started yet, dropping {:?}", command);
            self.push_console("Bluetooth is not ready yet".to_string());
            return Command::none();
        };

        let fut = async move {
            let mut handle = handle;
            handle.send(command).await
        };

        Command::perform(fut, Message::CommandSent)
    }

    fn preview_mode(&self) -> String {
        self.snapshot.mode.clone().unwrap_or_else(|| KNOWN_MODES[1].to_string())
    }
}

impl Application for AmpelApplication {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (AmpelApplication, Command<Self::Message>) {
        let app = AmpelApplication {
            app_cancel: CancellationToken::new(),
            config: flags.config,
            session: None,
            device_state: DeviceState::Disconnected,
            snapshot: DeviceSnapshot::default(),
            raw_status: None,
            console: Vec::new(),
            speed: 0,
            direct_input: String::new(),
            preview: None,
        };

        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from(concat!("Ampel Remote ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::DeviceEvent(DeviceEvent::SessionStarted(handle)) => {
                info!("Session started");
                self.session = Some(handle);
            },
            Message::DeviceEvent(DeviceEvent::StateChange(state)) => {
                self.device_state = state;
            },
            Message::DeviceEvent(DeviceEvent::Snapshot(snapshot)) => {
                if let Some(speed) = snapshot.speed {
                    self.speed = speed.min(SPEED_MAX);
                }
                if let (Some(preview), Some(mode)) = (&mut self.preview, &snapshot.mode) {
                    if preview.mode != *mode {
                        *preview = Preview::new(mode);
                    }
                }
                self.snapshot = snapshot;
            },
            Message::DeviceEvent(DeviceEvent::Console(line)) => {
                self.push_console(line);
            },
            Message::DeviceEvent(DeviceEvent::RawStatus(raw)) => {
                self.raw_status = Some(raw);
            },
            Message::CommandSent(false) => {
                self.push_console("Bluetooth session stopped".to_string());
            },
            Message::Connect => {
                return self.send_command(SessionCommand::Connect);
            },
            Message::Disconnect => {
                return self.send_command(SessionCommand::Disconnect);
            },
            Message::Refresh => {
                return self.send_command(SessionCommand::Refresh);
            },
            Message::SelectMode(mode) => {
                if self.preview.is_some() {
                    self.preview = Some(Preview::new(&mode));
                }
                return self.send_command(SessionCommand::Send(LightCommand::Mode(mode)));
            },
            Message::SpeedChange(speed) => {
                self.speed = speed;
            },
            Message::SpeedRelease => {
                return self.send_command(SessionCommand::Send(LightCommand::Speed(self.speed)));
            },
            Message::DirectInput(value) => {
                self.direct_input = value;
            },
            Message::SendDirect => {
                let command = self.direct_input.trim().to_string();
                if !command.is_empty() {
                    return self.send_command(SessionCommand::Send(LightCommand::Direct(command)));
                }
            },
            Message::ToggleLamp(index) => {
                return self.send_command(SessionCommand::ToggleLamp(index));
            },
            Message::TogglePreview => {
                self.preview = match self.preview {
                    Some(_) => None,
                    None => Some(Preview::new(&self.preview_mode())),
                };
            },
            Message::PreviewTick => {
                if let Some(preview) = &mut self.preview {
                    preview.advance();
                }
            },

            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            event::listen().map(Message::EventOccurred),
            session_subscription(self.app_cancel.clone(), self.config.clone()).map(Message::DeviceEvent),
        ];

        if self.preview.is_some() {
            subscriptions.push(iced_time_every(preview_interval(self.speed)).map(|_| Message::PreviewTick));
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        let connected = self.device_state.is_connected();

        let mut connect_button = button(text("Connect"));
        if !connected && !self.device_state.is_busy() {
            connect_button = connect_button.on_press(Message::Connect);
        }
        let mut disconnect_button = button(text("Disconnect")).style(theme::Button::Destructive);
        let mut refresh_button = button(text("Refresh")).style(theme::Button::Secondary);
        if connected {
            disconnect_button = disconnect_button.on_press(Message::Disconnect);
            refresh_button = refresh_button.on_press(Message::Refresh);
        }

        let mode_buttons = Row::with_children(
            KNOWN_MODES
                .iter()
                .map(|mode| {
                    let selected = self.snapshot.mode.as_deref() == Some(*mode);
                    button(text(*mode))
                        .style(if selected { theme::Button::Primary } else { theme::Button::Secondary })
                        .on_press(Message::SelectMode(mode.to_string()))
                })
                .map(Element::from)
        ).spacing(10);

        let leds = match &self.preview {
            Some(preview) => preview.frame(),
            None => self.snapshot.leds,
        };

        let lamps = Row::with_children(
            leds.render()
                .into_iter()
                .map(|lamp| {
                    button(
                        container(text(lamp.value.to_string()).size(12))
                            .width(Length::Fill)
                            .center_x()
                    )
                        .width(64)
                        .height(64)
                        .style(theme::Button::Custom(Box::new(LampStyleSheet { lamp })))
                        .on_press(Message::ToggleLamp(lamp.index))
                })
                .map(Element::from)
        ).spacing(20).align_items(Alignment::Center);

        let preview_button = button(text(if self.preview.is_some() { "Stop preview" } else { "Preview" }))
            .style(theme::Button::Secondary)
            .on_press(Message::TogglePreview);

        let console = scrollable(
            Column::with_children(
                self.console
                    .iter()
                    .map(|line| text(line).size(12))
                    .map(Element::from)
            )
            .width(Length::Fill)
        ).height(140);

        let raw_status = self.raw_status.as_deref().unwrap_or("–");

        container(
            column![
                row![connect_button, disconnect_button, refresh_button, text(self.device_state.label())]
                    .spacing(10)
                    .align_items(Alignment::Center),

                horizontal_rule(10),

                mode_buttons,

                row![
                    text("Speed"),
                    slider(0..=SPEED_MAX, self.speed, Message::SpeedChange)
                        .on_release(Message::SpeedRelease),
                    text(self.speed.to_string()).width(40),
                ].spacing(10).align_items(Alignment::Center),

                row![
                    text_input("rot, 0:1023,2:0 or 1023 0 0", &self.direct_input)
                        .on_input(Message::DirectInput)
                        .on_submit(Message::SendDirect),
                    button(text("Send")).on_press(Message::SendDirect),
                ].spacing(10),

                row![lamps, preview_button].spacing(30).align_items(Alignment::Center),

                horizontal_rule(10),

                text("Last status").size(14),
                text(raw_status).size(12),

                text("Log").size(14),
                console,
            ]
                .spacing(20)
                .width(Length::Fill),
        )
        .width(Length::Fill)
        .padding(20)
        .into()
    }
}

pub fn run_application(config: SessionConfig) -> Result<(), AppRunError> {
    let flags = ApplicationFlags { config };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("ampel-remote".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(640.0, 760.0);

    // this function will call process::exit() unless there was a startup error
    AmpelApplication::run(settings)?;
    Ok(())
}
