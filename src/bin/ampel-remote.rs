use clap::Parser;
use log::{error, info, LevelFilter};
use ampel_remote::{init_logging, log_level_from_env, run};
use ampel_remote::config::args::SessionArgs;
use ampel_remote::error::AppRunError;

// This embedded Info.plist is used when launching the binary directly, instead of an app bundle.
#[cfg(target_os = "macos")]
embed_plist::embed_info_plist!(concat!(env!("OUT_DIR"), "/Info.plist"));

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Remote control for the bluetooth traffic light", long_about = None)]
struct Args {
    #[command(flatten)]
    session: SessionArgs,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    let level = if args.verbose { LevelFilter::Debug } else { log_level_from_env(LevelFilter::Info) };
    init_logging(level)?;
    info!(concat!("Ampel Remote ", env!("CARGO_PKG_VERSION")));

    match run(args.session.into_config()) {
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
