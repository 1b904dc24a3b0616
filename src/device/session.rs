//! The connection session: one task that owns the connection to the light, the last known
//! device state and the poll timer.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Discovering -> Ready -> Polling | Subscribed -> Disconnected
//! ```
//!
//! Every failure is logged, mirrored to the console event stream and otherwise swallowed. Only a
//! failed connect or discovery (and a lost link) drop the session back to `Disconnected`.

use std::time::Duration;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use log::{debug, info, log, warn, Level};
use tokio::time::{interval, interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::types::SessionConfig;
use crate::device::constants::{make_led_uuid, make_light_service_uuid, make_mode_uuid, make_speed_uuid, make_status_uuid, IS_CONNECTED_DEADLINE};
use crate::device::link::{DeviceChooser, GattLink, Notification, NotificationStream};
use crate::device::types::{DeviceEvent, DeviceState, SessionCommand, SessionHandle, StatusUpdate, UpdateOrigin};
use crate::error::DeviceError;
use crate::protocol::command::{CharacteristicKind, Command};
use crate::protocol::direct::DirectCommand;
use crate::protocol::status::{decode_status, DeviceStatus};
use crate::state::DeviceSnapshot;

struct Characteristics<C> {
    mode: C,
    speed: C,
    led: C,
    status: Option<C>,
}

impl<C> Characteristics<C> {
    fn get(&self, kind: CharacteristicKind) -> &C {
        match kind {
            CharacteristicKind::Mode => &self.mode,
            CharacteristicKind::Speed => &self.speed,
            CharacteristicKind::Led => &self.led,
        }
    }
}

struct Connection<L: GattLink> {
    link: L,
    name: String,
    characteristics: Characteristics<L::Characteristic>,
}

enum UpdateSource {
    Subscribed(NotificationStream),
    Polling(Interval),
}

struct Updates {
    source: UpdateSource,
    link_check: Interval,
}

// the notification stream is not Sync, so it is kept apart from the link which is borrowed
// across reads and writes
struct Active<L: GattLink> {
    connection: Connection<L>,
    updates: Updates,
}

enum Wake {
    Cancelled,
    Command(Option<SessionCommand>),
    Notification(Notification),
    StreamEnded,
    PollTick,
    LinkCheck,
}

async fn next_wake(updates: Option<&mut Updates>) -> Wake {
    let Some(updates) = updates else {
        return std::future::pending().await;
    };

    let link_check = &mut updates.link_check;
    match &mut updates.source {
        UpdateSource::Subscribed(stream) => tokio::select! {
            _ = link_check.tick() => Wake::LinkCheck,
            notification = stream.next() => match notification {
                Some(notification) => Wake::Notification(notification),
                None => Wake::StreamEnded,
            },
        },
        UpdateSource::Polling(poll) => tokio::select! {
            _ = link_check.tick() => Wake::LinkCheck,
            _ = poll.tick() => Wake::PollTick,
        },
    }
}

async fn discover<L: GattLink>(link: &L) -> Result<Characteristics<L::Characteristic>, DeviceError> {
    link.discover_services().await?;

    let service = make_light_service_uuid();
    if !link.has_service(service) {
        return Err(DeviceError::MissingService { uuid: service });
    }

    let find = |uuid, name| {
        link.characteristic(service, uuid).ok_or(DeviceError::MissingCharacteristic { name })
    };

    Ok(Characteristics {
        mode: find(make_mode_uuid(), "MODE")?,
        speed: find(make_speed_uuid(), "SPEED")?,
        led: find(make_led_uuid(), "LED")?,
        status: link.characteristic(service, make_status_uuid()),
    })
}

enum ReadResult {
    Value(Vec<u8>),
    Unreadable,
    Failed(String),
}

async fn read_characteristic<L: GattLink>(link: &L, characteristic: &L::Characteristic, name: &str) -> ReadResult {
    if !link.can_read(characteristic) {
        return ReadResult::Unreadable;
    }

    match link.read(characteristic).await {
        Ok(value) => ReadResult::Value(value),
        Err(err) => ReadResult::Failed(format!("{} read failed: {}", name, err)),
    }
}

fn value_text(value: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(value).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// Create the command channel of a session.
pub fn session_channel() -> (SessionHandle, Receiver<SessionCommand>) {
    let (sender, receiver) = channel::<SessionCommand>(32);
    (SessionHandle::new(sender), receiver)
}

pub struct Session<C: DeviceChooser> {
    chooser: C,
    config: SessionConfig,
    state: DeviceState,
    active: Option<Active<C::Link>>,
    snapshot: DeviceSnapshot,
    senders: Vec<Sender<DeviceEvent>>,
}

impl<C: DeviceChooser> Session<C> {
    pub fn new(chooser: C, config: SessionConfig, senders: Vec<Sender<DeviceEvent>>) -> Self {
        Session {
            chooser,
            config,
            state: DeviceState::Disconnected,
            active: None,
            snapshot: DeviceSnapshot::default(),
            senders,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    /// Process commands until `cancel` is cancelled or every [`SessionHandle`] is dropped.
    pub async fn run(mut self, cancel: CancellationToken, mut commands: Receiver<SessionCommand>) {
        'mainloop: loop {
            let wake = tokio::select! {
                _ = cancel.cancelled() => Wake::Cancelled,
                command = commands.next() => Wake::Command(command),
                wake = next_wake(self.active.as_mut().map(|active| &mut active.updates)) => wake,
            };

            match wake {
                Wake::Cancelled | Wake::Command(None) => break 'mainloop,
                // a scan can take a while, cancellation must not wait for it
                Wake::Command(Some(command)) => tokio::select! {
                    _ = cancel.cancelled() => break 'mainloop,
                    _ = self.handle_command(command) => {},
                },
                Wake::Notification(notification) => {
                    if notification.uuid == make_status_uuid() {
                        self.handle_payload(UpdateOrigin::Notification, &notification.value).await;
                    }
                },
                Wake::StreamEnded => self.lost_connection("Status notifications stopped, device disconnected").await,
                Wake::PollTick => self.poll().await,
                Wake::LinkCheck => self.check_link().await,
            }
        }

        if self.active.is_some() {
            self.disconnect().await;
        }
        else {
            // cancelled in the middle of connecting
            self.set_state(DeviceState::Disconnected).await;
        }
        info!("Session stopped");
    }

    pub async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => self.connect().await,
            SessionCommand::Disconnect => self.disconnect().await,
            SessionCommand::Send(command) => self.send(command).await,
            SessionCommand::ToggleLamp(index) => match Command::toggle(self.snapshot.leds, index) {
                Some(command) => self.send(command).await,
                None => self.console(Level::Warn, format!("There is no lamp {}", index)).await,
            },
            SessionCommand::Refresh => self.refresh().await,
        }
    }

    fn connection(&self) -> Option<&Connection<C::Link>> {
        self.active.as_ref().map(|active| &active.connection)
    }

    async fn emit(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.send(event.clone()).await {
                debug!("Dropping device event, receiver is gone: {}", err);
            }
        }
    }

    async fn console(&mut self, level: Level, line: String) {
        log!(level, "{}", line);
        self.emit(DeviceEvent::Console(line)).await;
    }

    async fn set_state(&mut self, state: DeviceState) {
        if self.state != state {
            info!("{}", state.label());
            self.state = state.clone();
            self.emit(DeviceEvent::StateChange(state)).await;
        }
    }

    async fn connect(&mut self) {
        if self.active.is_some() {
            info!("Already connected; tearing down the previous connection first");
            self.disconnect().await;
        }

        self.set_state(DeviceState::Connecting).await;
        self.console(Level::Info, "Scanning...".to_string()).await;

        match self.establish().await {
            Ok(active) => {
                let name = active.connection.name.clone();
                let subscribed = matches!(active.updates.source, UpdateSource::Subscribed(_));
                self.active = Some(active);

                if subscribed {
                    self.set_state(DeviceState::Subscribed { name }).await;
                    if self.status_readable() {
                        self.read_status().await;
                    }
                } else {
                    self.set_state(DeviceState::Polling { name }).await;
                }
            },
            Err(err) => {
                self.console(Level::Error, format!("Connection failed: {}", err)).await;
                self.set_state(DeviceState::Disconnected).await;
            },
        }
    }

    async fn establish(&mut self) -> Result<Active<C::Link>, DeviceError> {
        let link = self.chooser.request_device().await?;
        let name = link.name().await;
        self.console(Level::Info, format!("Device selected: {}", name)).await;

        link.connect().await?;
        self.console(Level::Info, "GATT connected".to_string()).await;
        self.set_state(DeviceState::Discovering).await;

        let characteristics = match discover(&link).await {
            Ok(characteristics) => characteristics,
            Err(err) => {
                // do not leave the peripheral half connected
                if let Err(disconnect_err) = link.disconnect().await {
                    warn!("Failed to disconnect after discovery error: {}", disconnect_err);
                }
                return Err(err);
            },
        };

        self.console(Level::Info, "Characteristics ready".to_string()).await;
        self.set_state(DeviceState::Ready { name: name.clone() }).await;

        let source = self.subscribe_or_poll(&link, &characteristics).await;

        let link_check_interval = self.config.link_check_interval;
        let mut link_check = interval_at(Instant::now() + link_check_interval, link_check_interval);
        link_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Active {
            connection: Connection { link, name, characteristics },
            updates: Updates { source, link_check },
        })
    }

    async fn subscribe_or_poll(&mut self, link: &C::Link, characteristics: &Characteristics<<C::Link as GattLink>::Characteristic>) -> UpdateSource {
        match &characteristics.status {
            Some(status) if link.can_notify(status) => match link.subscribe(status).await {
                Ok(stream) => {
                    self.console(Level::Info, "Status notifications active".to_string()).await;
                    return UpdateSource::Subscribed(stream);
                },
                Err(err) => {
                    self.console(Level::Warn, format!("Status notifications unavailable ({}); polling instead", err)).await;
                },
            },
            Some(_) => {
                self.console(Level::Info, "Status characteristic does not notify; polling instead".to_string()).await;
            },
            None => {
                self.console(Level::Info, "No status characteristic; polling instead".to_string()).await;
            },
        }

        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        UpdateSource::Polling(poll)
    }

    async fn disconnect(&mut self) {
        // dropping the active connection also drops the poll timer and the notification stream
        match self.active.take() {
            None => {
                self.console(Level::Info, "Not connected".to_string()).await;
            },
            Some(active) => {
                match active.connection.link.disconnect().await {
                    Ok(()) => self.console(Level::Info, "Disconnected".to_string()).await,
                    Err(err) => self.console(Level::Warn, format!("Disconnect error: {}", err)).await,
                }
            },
        }

        self.set_state(DeviceState::Disconnected).await;
    }

    async fn lost_connection(&mut self, reason: &str) {
        self.active = None;
        self.console(Level::Warn, reason.to_string()).await;
        self.set_state(DeviceState::Disconnected).await;
    }

    async fn check_link(&mut self) {
        let Some(connection) = self.connection() else {
            return;
        };

        let deadline = Duration::from_millis(IS_CONNECTED_DEADLINE);
        let result = timeout(deadline, connection.link.is_connected()).await;

        match result {
            Err(_) => self.lost_connection("Checking for connection status took too long").await,
            Ok(Err(err)) => self.lost_connection(&format!("Error checking for connection state: {}", err)).await,
            Ok(Ok(false)) => self.lost_connection("Device disconnected").await,
            Ok(Ok(true)) => {},
        }
    }

    async fn send(&mut self, command: Command) {
        if let Command::Direct(text) = &command {
            // keep the interface responsive, even without a connection
            match DirectCommand::parse(text).apply(self.snapshot.leds) {
                Some(leds) => {
                    if leds != self.snapshot.leds {
                        self.snapshot.leds = leds;
                        self.emit(DeviceEvent::Snapshot(self.snapshot.clone())).await;
                    }
                },
                None => debug!("Direct command {:?} not understood locally", text),
            }
        }

        let kind = command.characteristic();
        let result = match self.connection() {
            None => None,
            Some(connection) => Some(
                connection.link.write(connection.characteristics.get(kind), &command.payload()).await
            ),
        };

        match result {
            None => self.console(Level::Warn, format!("{} characteristic not available", kind)).await,
            Some(Ok(())) => self.console(Level::Info, format!("{} sent: {}", kind, command.text())).await,
            Some(Err(err)) => {
                self.console(Level::Warn, format!("{} write failed: {}", kind, err)).await;
                self.emit(DeviceEvent::WriteFailed(kind)).await;
            },
        }
    }

    async fn refresh(&mut self) {
        let subscribed = match &self.active {
            None => {
                self.console(Level::Info, "Not connected".to_string()).await;
                return;
            },
            Some(active) => matches!(active.updates.source, UpdateSource::Subscribed(_)),
        };

        if subscribed {
            self.read_status().await;
        } else {
            self.poll().await;
        }
    }

    fn status_readable(&self) -> bool {
        match self.connection() {
            Some(Connection { link, characteristics: Characteristics { status: Some(status), .. }, .. }) => link.can_read(status),
            _ => false,
        }
    }

    async fn read_status(&mut self) {
        let result = match self.connection() {
            Some(Connection { link, characteristics: Characteristics { status: Some(status), .. }, .. }) => {
                read_characteristic(link, status, "STATUS").await
            },
            _ => return,
        };

        match result {
            ReadResult::Value(value) => self.handle_payload(UpdateOrigin::Read, &value).await,
            ReadResult::Unreadable => {
                self.console(Level::Info, "Status characteristic is not readable, waiting for notifications".to_string()).await;
            },
            ReadResult::Failed(message) => self.console(Level::Warn, message).await,
        }
    }

    // re-read mode, speed and led, used when the peripheral does not push status updates
    async fn poll(&mut self) {
        let results = match self.connection() {
            None => return,
            Some(Connection { link, characteristics, .. }) => [
                read_characteristic(link, &characteristics.mode, "MODE").await,
                read_characteristic(link, &characteristics.speed, "SPEED").await,
                read_characteristic(link, &characteristics.led, "LED").await,
            ],
        };

        let mut values: [Option<Vec<u8>>; 3] = [None, None, None];
        for (slot, result) in values.iter_mut().zip(results) {
            match result {
                ReadResult::Value(value) => *slot = Some(value),
                ReadResult::Unreadable => {},
                ReadResult::Failed(message) => self.console(Level::Warn, message).await,
            }
        }

        let [mode, speed, led] = values;
        let mut status = DeviceStatus {
            mode: mode.as_deref().and_then(value_text),
            speed: speed.as_deref().and_then(value_text).and_then(|text| text.parse::<u32>().ok()),
            led: None,
        };

        // the led characteristic may carry a full status object, it only fills what the
        // mode and speed reads left open
        if let Some(led) = led {
            let decoded = self.decode_payload(&led).await;
            status.mode = status.mode.or(decoded.mode);
            status.speed = status.speed.or(decoded.speed);
            status.led = decoded.led;
        }

        self.apply_update(StatusUpdate { origin: UpdateOrigin::Read, status }).await;
    }

    // shared by notifications, status reads and polled led reads
    async fn decode_payload(&mut self, value: &[u8]) -> DeviceStatus {
        let payload = decode_status(value);

        if let Some(raw) = payload.raw_json() {
            info!("Status: {}", raw);
            self.emit(DeviceEvent::RawStatus(format!("{:#}", raw))).await;
        }

        payload.resolve(self.snapshot.leds)
    }

    async fn handle_payload(&mut self, origin: UpdateOrigin, value: &[u8]) {
        let status = self.decode_payload(value).await;
        if status.is_empty() {
            debug!("Ignoring status payload {:?}", String::from_utf8_lossy(value));
            return;
        }

        self.apply_update(StatusUpdate { origin, status }).await;
    }

    async fn apply_update(&mut self, update: StatusUpdate) {
        debug!("Status update ({:?}): {:?}", update.origin, update.status);

        if self.snapshot.apply(&update.status) {
            self.emit(DeviceEvent::Snapshot(self.snapshot.clone())).await;
        }
    }
}

/// Run a session for `chooser`, announcing its [`SessionHandle`] to `senders` first.
pub async fn run_session<C: DeviceChooser>(chooser: C, config: SessionConfig, cancel: CancellationToken, mut senders: Vec<Sender<DeviceEvent>>) {
    let (handle, commands) = session_channel();

    for sender in &mut senders {
        if let Err(err) = sender.send(DeviceEvent::SessionStarted(handle.clone())).await {
            debug!("Could not announce session: {}", err);
        }
    }
    drop(handle);

    let mut session = Session::new(chooser, config, senders);
    session.emit(DeviceEvent::StateChange(DeviceState::Disconnected)).await;
    session.run(cancel, commands).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    use crate::device::testing::{MockChooser, MockLink};
    use crate::state::LedState;

    struct Harness {
        handle: SessionHandle,
        events: Receiver<DeviceEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(chooser: MockChooser) -> Harness {
            let (event_sender, events) = channel::<DeviceEvent>(4096);
            let (handle, commands) = session_channel();
            let session = Session::new(chooser, SessionConfig::default(), vec![event_sender]);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(session.run(cancel.clone(), commands));

            Harness { handle, events, cancel, task }
        }

        async fn send(&mut self, command: SessionCommand) {
            assert!(self.handle.send(command).await);
        }

        async fn wait_for_state(&mut self, predicate: impl Fn(&DeviceState) -> bool) -> DeviceState {
            loop {
                match self.events.next().await {
                    Some(DeviceEvent::StateChange(state)) if predicate(&state) => return state,
                    Some(_) => continue,
                    None => panic!("session stopped"),
                }
            }
        }

        async fn wait_for_snapshot(&mut self, predicate: impl Fn(&DeviceSnapshot) -> bool) -> DeviceSnapshot {
            loop {
                match self.events.next().await {
                    Some(DeviceEvent::Snapshot(snapshot)) if predicate(&snapshot) => return snapshot,
                    Some(_) => continue,
                    None => panic!("session stopped"),
                }
            }
        }

        async fn wait_for_console(&mut self, needle: &str) -> String {
            loop {
                match self.events.next().await {
                    Some(DeviceEvent::Console(line)) if line.contains(needle) => return line,
                    Some(_) => continue,
                    None => panic!("session stopped"),
                }
            }
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.expect("Failed to join session task");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_with_notifications() {
        let link = MockLink::light(Some(true));
        let mut harness = Harness::start(MockChooser::new(link.clone()));

        harness.send(SessionCommand::Connect).await;
        assert_eq!(harness.wait_for_state(|s| *s == DeviceState::Connecting).await, DeviceState::Connecting);
        harness.wait_for_state(|s| *s == DeviceState::Discovering).await;
        harness.wait_for_state(|s| matches!(s, DeviceState::Ready { .. })).await;
        let state = harness.wait_for_state(|s| s.is_connected()).await;
        assert_eq!(state, DeviceState::Subscribed { name: "Ampel".to_string() });

        assert!(link.notify(r#"{"mode":"blinken","speed":42,"led":[1023,0,0]}"#));
        let snapshot = harness.wait_for_snapshot(|s| s.mode.is_some()).await;
        assert_eq!(snapshot.mode.as_deref(), Some("blinken"));
        assert_eq!(snapshot.speed, Some(42));
        assert_eq!(snapshot.leds, LedState([1023, 0, 0]));

        assert!(link.notify("0:0,2:512"));
        let snapshot = harness.wait_for_snapshot(|s| s.leds.0[2] == 512).await;
        assert_eq!(snapshot.leds, LedState([0, 0, 512]));
        assert_eq!(snapshot.speed, Some(42));

        harness.stop().await;
        assert!(!link.is_link_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_polling_without_status_characteristic() {
        let link = MockLink::light(None);
        link.set_value(make_mode_uuid(), "lauflicht");
        link.set_value(make_speed_uuid(), "77");
        link.set_value(make_led_uuid(), "gelb");

        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;

        let state = harness.wait_for_state(|s| s.is_connected()).await;
        assert_eq!(state, DeviceState::Polling { name: "Ampel".to_string() });

        let snapshot = harness.wait_for_snapshot(|s| s.mode.is_some()).await;
        assert_eq!(snapshot.mode.as_deref(), Some("lauflicht"));
        assert_eq!(snapshot.speed, Some(77));
        assert_eq!(snapshot.leds, LedState([0, 1023, 0]));

        link.set_value(make_led_uuid(), r#"{"led":[1,2,3]}"#);
        let snapshot = harness.wait_for_snapshot(|s| s.leds == LedState([1, 2, 3])).await;
        assert_eq!(snapshot.mode.as_deref(), Some("lauflicht"));

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn status_without_notify_is_polled() {
        let link = MockLink::light(Some(false));
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;

        let state = harness.wait_for_state(|s| s.is_connected()).await;
        assert!(matches!(state, DeviceState::Polling { .. }));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_polling() {
        let link = MockLink::light(None);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        sleep(Duration::from_secs(5)).await;
        assert!(link.reads() > 0);

        harness.send(SessionCommand::Disconnect).await;
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        let reads = link.reads();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(link.reads(), reads);
        assert!(!link.is_link_connected());
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn peripheral_drop_stops_polling() {
        let link = MockLink::light(None);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        link.drop_link();
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        let reads = link.reads();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(link.reads(), reads);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn notification_stream_end_disconnects() {
        let link = MockLink::light(Some(true));
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        link.drop_link();
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_characteristic_is_fatal() {
        let link = MockLink::light(None);
        link.remove_characteristic(make_speed_uuid());
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;

        let line = harness.wait_for_console("Connection failed").await;
        assert!(line.contains("SPEED"), "{}", line);
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        assert!(!link.is_link_connected());
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn chooser_failure_returns_to_disconnected() {
        let mut harness = Harness::start(MockChooser::empty());
        harness.send(SessionCommand::Connect).await;

        harness.wait_for_state(|s| *s == DeviceState::Connecting).await;
        harness.wait_for_console("Connection failed").await;
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn writes_go_to_their_characteristics() {
        let link = MockLink::light(Some(true));
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        harness.send(SessionCommand::Send(Command::Mode("fading".to_string()))).await;
        harness.wait_for_console("MODE sent: fading").await;
        harness.send(SessionCommand::Send(Command::Speed(128))).await;
        harness.wait_for_console("SPEED sent: 128").await;
        harness.send(SessionCommand::ToggleLamp(1)).await;
        harness.wait_for_console("DIRECT sent: 1:1023").await;

        assert_eq!(link.writes(), vec![
            (make_mode_uuid(), "fading".to_string()),
            (make_speed_uuid(), "128".to_string()),
            (make_led_uuid(), "1:1023".to_string()),
        ]);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_are_swallowed() {
        let link = MockLink::light(Some(true));
        link.fail_writes();
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        harness.send(SessionCommand::Send(Command::Mode("stop".to_string()))).await;
        harness.wait_for_console("MODE write failed").await;

        // still connected and accepting commands
        harness.send(SessionCommand::Send(Command::Speed(1))).await;
        harness.wait_for_console("SPEED write failed").await;
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_are_reported_as_events() {
        let link = MockLink::light(Some(true));
        link.fail_writes();
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        harness.send(SessionCommand::Send(Command::Speed(9))).await;
        let kind = loop {
            match harness.events.next().await {
                Some(DeviceEvent::WriteFailed(kind)) => break kind,
                Some(_) => continue,
                None => panic!("session stopped"),
            }
        };
        assert_eq!(kind, CharacteristicKind::Speed);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn initial_status_read_fills_snapshot() {
        let link = MockLink::light(Some(true));
        link.set_value(make_status_uuid(), r#"{"mode":"fading","speed":3,"led":[0,1023,0]}"#);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;

        harness.wait_for_state(|s| matches!(s, DeviceState::Subscribed { .. })).await;
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.mode.as_deref(), Some("fading"));
        assert_eq!(snapshot.speed, Some(3));
        assert_eq!(snapshot.leds, LedState([0, 1023, 0]));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_rereads_status_when_subscribed() {
        let link = MockLink::light(Some(true));
        link.set_value(make_status_uuid(), "rot");
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_snapshot(|s| s.leds == LedState([1023, 0, 0])).await;

        link.set_value(make_status_uuid(), "gruen");
        harness.send(SessionCommand::Refresh).await;
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.leds, LedState([0, 0, 1023]));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_polls_immediately_when_not_subscribed() {
        let link = MockLink::light(None);
        link.set_value(make_led_uuid(), "rot");
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_snapshot(|s| s.leds == LedState([1023, 0, 0])).await;
        let started = Instant::now();

        link.set_value(make_led_uuid(), "gelb");
        harness.send(SessionCommand::Refresh).await;
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.leds, LedState([0, 1023, 0]));
        // answered before the next poll tick
        assert!(started.elapsed() < SessionConfig::default().poll_interval);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_with_notify_only_status_is_reported() {
        let link = MockLink::light(Some(true));
        link.set_readable(make_status_uuid(), false);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| matches!(s, DeviceState::Subscribed { .. })).await;

        harness.send(SessionCommand::Refresh).await;
        harness.wait_for_console("not readable").await;
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polled_json_status_fills_mode_and_speed() {
        let link = MockLink::light(None);
        link.set_value(make_led_uuid(), r#"{"mode":"blinken","speed":5,"led":[1,2,3]}"#);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;

        let snapshot = harness.wait_for_snapshot(|s| s.leds == LedState([1, 2, 3])).await;
        assert_eq!(snapshot.mode.as_deref(), Some("blinken"));
        assert_eq!(snapshot.speed, Some(5));

        // the mode characteristic wins over the status object
        link.set_value(make_mode_uuid(), "fading");
        let snapshot = harness.wait_for_snapshot(|s| s.mode.as_deref() == Some("fading")).await;
        assert_eq!(snapshot.speed, Some(5));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_running_scan() {
        let mut harness = Harness::start(MockChooser::stalled());
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| *s == DeviceState::Connecting).await;

        let Harness { cancel, task, mut events, handle } = harness;
        cancel.cancel();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("Session ignored cancellation while scanning")
            .expect("Failed to join session task");
        drop(handle);

        let mut last_state = None;
        while let Some(event) = events.next().await {
            if let DeviceEvent::StateChange(state) = event {
                last_state = Some(state);
            }
        }
        assert_eq!(last_state, Some(DeviceState::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn direct_command_applies_locally_while_disconnected() {
        let mut harness = Harness::start(MockChooser::empty());

        harness.send(SessionCommand::Send(Command::Direct("rot".to_string()))).await;
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.leds, LedState([1023, 0, 0]));
        harness.wait_for_console("DIRECT characteristic not available").await;

        harness.send(SessionCommand::ToggleLamp(0)).await;
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.leds, LedState([0, 0, 0]));

        harness.send(SessionCommand::Send(Command::Mode("stop".to_string()))).await;
        harness.wait_for_console("MODE characteristic not available").await;
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_notifications_keep_last_state() {
        let link = MockLink::light(Some(true));
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        assert!(link.notify("1 2 3"));
        harness.wait_for_snapshot(|s| s.leds == LedState([1, 2, 3])).await;

        assert!(link.notify("hello world"));
        assert!(link.notify("{mode:"));
        assert!(link.notify(r#"{"speed":128}"#));
        let snapshot = harness.wait_for_snapshot(|_| true).await;
        assert_eq!(snapshot.speed, Some(128));
        assert_eq!(snapshot.leds, LedState([1, 2, 3]));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_tears_down_first() {
        let link = MockLink::light(None);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| *s == DeviceState::Disconnected).await;
        harness.wait_for_state(|s| s.is_connected()).await;
        assert_eq!(link.connects(), 2);

        // one poll timer: about one read pass (three reads) per second
        let reads = link.reads();
        sleep(Duration::from_millis(10_500)).await;
        let passes = (link.reads() - reads) / 3;
        assert!((10..=11).contains(&passes), "{} poll passes", passes);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_session() {
        let link = MockLink::light(None);
        let mut harness = Harness::start(MockChooser::new(link.clone()));
        harness.send(SessionCommand::Connect).await;
        harness.wait_for_state(|s| s.is_connected()).await;

        let Harness { handle, task, mut events, .. } = harness;
        drop(handle);
        task.await.expect("Failed to join session task");

        assert!(!link.is_link_connected());
        let mut last_state = None;
        while let Some(event) = events.next().await {
            if let DeviceEvent::StateChange(state) = event {
                last_state = Some(state);
            }
        }
        assert_eq!(last_state, Some(DeviceState::Disconnected));
    }
}
