use std::error::Error;
use std::process::ExitCode;
use clap::{Parser, Subcommand};
use futures::channel::mpsc::{channel, Receiver};
use futures::StreamExt;
use log::{error, info, LevelFilter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ampel_remote::{init_logging, log_level_from_env};
use ampel_remote::config::args::SessionArgs;
use ampel_remote::device::btle::BtleChooser;
use ampel_remote::device::session::{session_channel, Session};
use ampel_remote::device::types::{DeviceEvent, DeviceState, SessionCommand, SessionHandle};
use ampel_remote::protocol::command::{CharacteristicKind, Command};
use ampel_remote::protocol::direct::DirectCommand;
use ampel_remote::protocol::status::{decode_status, StatusPayload};
use ampel_remote::state::{DeviceSnapshot, LedState};

#[cfg(target_os = "macos")]
embed_plist::embed_info_plist!(concat!(env!("OUT_DIR"), "/Info.plist"));

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Control the bluetooth traffic light from the command line.\n\nExample: ampel-cli direct \"0:1023,2:0\"", long_about = None)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Select a program, e.g. "lauflicht", "blinken", "fading" or "stop"
    Mode { mode: String },

    /// Set the speed of the running program
    Speed { speed: u32 },

    /// Send a direct LED command: "rot", "0:1023,2:0" or "1023 0 0"
    Direct { command: String },

    /// Switch a single lamp (0 = red, 1 = yellow, 2 = green) on or off
    Toggle {
        #[arg(value_parser = clap::value_parser!(u8).range(0..3))]
        index: u8,
    },

    /// Print status updates until interrupted
    Watch {
        /// Print every state as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Decode a status payload without connecting to the light
    Decode {
        payload: String,

        /// LED state the payload is applied to
        #[arg(long, value_parser = parse_leds, default_value = "0,0,0")]
        led: LedState,

        #[arg(long)]
        json: bool,
    },
}

fn parse_leds(value: &str) -> Result<LedState, String> {
    match DirectCommand::parse(value) {
        DirectCommand::Triple(values) => Ok(LedState(values)),
        _ => Err(format!("expected three numbers, got {:?}", value)),
    }
}

fn print_snapshot(snapshot: &DeviceSnapshot, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    }
    else {
        println!(
            "mode={} speed={} led={}",
            snapshot.mode.as_deref().unwrap_or("?"),
            snapshot.speed.map(|speed| speed.to_string()).unwrap_or("?".to_string()),
            snapshot.leds,
        );
    }
    Ok(())
}

fn decode(payload: &str, led: LedState, json: bool) -> Result<(), Box<dyn Error>> {
    let decoded = decode_status(payload.as_bytes());
    let status = decoded.resolve(led);

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    match &decoded {
        StatusPayload::Json { .. } => println!("format: json"),
        StatusPayload::Direct(DirectCommand::Unrecognized) => println!("format: unrecognized (no update)"),
        StatusPayload::Direct(command) => println!("format: direct {:?}", command),
    }

    let mut snapshot = DeviceSnapshot { leds: led, ..DeviceSnapshot::default() };
    snapshot.apply(&status);
    print_snapshot(&snapshot, false)
}

struct RunningSession {
    handle: SessionHandle,
    events: Receiver<DeviceEvent>,
    task: JoinHandle<()>,
    failed_writes: Vec<CharacteristicKind>,
}

impl RunningSession {
    fn start(cli: &Cli) -> RunningSession {
        let config = cli.session.clone().into_config();
        let (event_sender, events) = channel::<DeviceEvent>(256);
        let (handle, commands) = session_channel();

        let session = Session::new(BtleChooser::new(&config), config, vec![event_sender]);
        let task = tokio::spawn(session.run(CancellationToken::new(), commands));

        RunningSession { handle, events, task, failed_writes: Vec::new() }
    }

    async fn send(&mut self, command: SessionCommand) -> Result<(), Box<dyn Error>> {
        if !self.handle.send(command).await {
            return Err("bluetooth session stopped".into());
        }
        Ok(())
    }

    /// Wait for the next state change; console lines are logged on the way.
    async fn next_state(&mut self) -> Option<DeviceState> {
        while let Some(event) = self.events.next().await {
            match event {
                DeviceEvent::StateChange(state) => return Some(state),
                DeviceEvent::Console(line) => eprintln!("{}", line),
                DeviceEvent::WriteFailed(kind) => self.failed_writes.push(kind),
                _ => {},
            }
        }
        None
    }

    async fn connect(&mut self) -> Result<(), Box<dyn Error>> {
        self.send(SessionCommand::Connect).await?;
        loop {
            match self.next_state().await {
                Some(DeviceState::Polling { .. }) | Some(DeviceState::Subscribed { .. }) => return Ok(()),
                Some(DeviceState::Disconnected) | None => return Err("could not connect to the light".into()),
                Some(_) => {},
            }
        }
    }

    async fn disconnect(mut self) -> Result<(), Box<dyn Error>> {
        self.send(SessionCommand::Disconnect).await?;
        while let Some(state) = self.next_state().await {
            if state == DeviceState::Disconnected {
                break;
            }
        }

        drop(self.handle);
        self.task.await?;
        check_writes(&self.failed_writes)
    }
}

// the session swallows write errors, the exit code must not
fn check_writes(failed: &[CharacteristicKind]) -> Result<(), Box<dyn Error>> {
    if failed.is_empty() {
        return Ok(());
    }

    let names = failed.iter().map(|kind| kind.to_string()).collect::<Vec<_>>().join(", ");
    Err(format!("write failed: {}", names).into())
}

async fn one_shot(cli: &Cli, commands: Vec<SessionCommand>) -> Result<(), Box<dyn Error>> {
    let mut session = RunningSession::start(cli);
    session.connect().await?;

    for command in commands {
        session.send(command).await?;
    }

    session.disconnect().await
}

async fn watch(cli: &Cli, json: bool) -> Result<(), Box<dyn Error>> {
    let mut session = RunningSession::start(cli);
    session.connect().await?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted");
                return session.disconnect().await;
            },
            event = session.events.next() => match event {
                Some(DeviceEvent::Snapshot(snapshot)) => print_snapshot(&snapshot, json)?,
                Some(DeviceEvent::Console(line)) => eprintln!("{}", line),
                Some(DeviceEvent::StateChange(DeviceState::Disconnected)) | None => {
                    return Err("the light disconnected".into());
                },
                Some(_) => {},
            },
        }
    }
}

async fn run_cli(cli: Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        CliCommand::Mode { mode } => one_shot(&cli, vec![
            SessionCommand::Send(Command::Mode(mode.clone())),
        ]).await,
        CliCommand::Speed { speed } => one_shot(&cli, vec![
            SessionCommand::Send(Command::Speed(*speed)),
        ]).await,
        CliCommand::Direct { command } => one_shot(&cli, vec![
            SessionCommand::Send(Command::Direct(command.clone())),
        ]).await,
        // refresh first, the toggle is computed from the current lamp state
        CliCommand::Toggle { index } => one_shot(&cli, vec![
            SessionCommand::Refresh,
            SessionCommand::ToggleLamp(usize::from(*index)),
        ]).await,
        CliCommand::Watch { json } => watch(&cli, *json).await,
        CliCommand::Decode { payload, led, json } => decode(payload, *led, *json),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { LevelFilter::Debug } else { log_level_from_env(LevelFilter::Warn) };
    if let Err(err) = init_logging(level) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        },
    }
}
