use anyhow::Context;
use clap::{ArgAction, Parser};
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use oww_rhasspy::config::{load_config, DEFAULT_CONFIG_FILE};
use oww_rhasspy::error::BridgeError;
use oww_rhasspy::inference::{RmsInference, DEFAULT_FULL_SCALE_RMS, DEFAULT_RMS_LABEL};
use oww_rhasspy::publish::{JsonLinesPublisher, LogPublisher, Publisher};
use oww_rhasspy::Bridge;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Wake word detection for Rhasspy UDP audio streams, publishing Hermes hotword messages.
#[derive(Parser)]
#[command(name = "oww-rhasspy")]
struct Args {
    /// Configuration yaml file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address the UDP audio sockets bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Write Hermes messages to stdout as JSON lines instead of logging them
    #[arg(long)]
    jsonl: bool,

    /// Label the built-in energy scorer reports; must be allowed by `model_names` or
    /// `publish_all_models`
    #[arg(long, default_value = DEFAULT_RMS_LABEL)]
    energy_label: String,

    /// More logging, repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new().filter_level(level).parse_default_env().init();

    let config = load_config(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e).context("refusing to start");
    }
    let sensitivity = config.oww.activation_threshold;

    let bridge = Bridge::bind(config, args.bind).await.context("starting audio sources")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Can't listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutting down");
        on_ctrl_c.cancel();
    });

    let inference = RmsInference::new(&args.energy_label, DEFAULT_FULL_SCALE_RMS);
    if args.jsonl {
        serve(bridge, inference, JsonLinesPublisher::new(std::io::stdout(), sensitivity), cancel).await
    } else {
        serve(bridge, inference, LogPublisher::new(sensitivity), cancel).await
    }
}

async fn serve<P>(bridge: Bridge, inference: RmsInference, publisher: P, cancel: CancellationToken) -> anyhow::Result<()>
where
    P: Publisher + Send + 'static,
{
    info!("Scoring windows with the built-in energy model as {:?}", inference.label());
    match bridge.run(inference, publisher, cancel).await {
        Ok(_) => {}
        Err(BridgeError::Config(e)) => {
            error!("Invalid configuration: {}", e);
            return Err(e).context("refusing to start");
        }
        Err(e) => return Err(e.into()),
    }
    info!("Program terminated successfully");
    Ok(())
}
