//! `send`: report one event as the tracker would from a page.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use clap::Args;
use plausible_tracker::{
    DetachedPage, DispatchOutcome, Dispatcher, DryRunTransport, EventOptions, ReqwestTransport,
    TrackerConfig, Transport, PAGEVIEW,
};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

use super::common::{self, SourceOverrides};
use crate::error::CliError;

/// Upper bound on waiting for the request to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Arguments for `send`.
#[derive(Debug, Args)]
pub struct SendArgs {
    /// URL of the page the event happened on
    #[arg(long)]
    pub url: String,

    /// Event name
    #[arg(long, default_value = PAGEVIEW)]
    pub name: String,

    /// Document referrer
    #[arg(long)]
    pub referrer: Option<String>,

    /// Custom properties as a JSON object
    #[arg(long)]
    pub props: Option<String>,

    /// Metadata as a JSON object
    #[arg(long)]
    pub meta: Option<String>,

    /// Viewport width reported with the event
    #[arg(long, default_value_t = DetachedPage::DEFAULT_VIEWPORT_WIDTH)]
    pub width: u32,

    /// Log the request instead of sending it
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub overrides: SourceOverrides,
}

/// Run `send`.
pub fn run(args: SendArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let source = common::load_source(config_path, &args.overrides)?;
    let config = TrackerConfig::from_source(&source, source.features())?;

    let mut page = DetachedPage::at(&args.url)
        .map_err(|e| CliError::InvalidArgument(format!("--url {}: {}", args.url, e)))?
        .with_viewport_width(args.width);
    if let Some(referrer) = &args.referrer {
        page = page.with_referrer(referrer.as_str());
    }

    let mut options = EventOptions::default();
    if let Some(props) = &args.props {
        options = options.props(common::parse_properties("--props", props)?);
    }
    if let Some(meta) = &args.meta {
        options = options.meta(common::parse_properties("--meta", meta)?);
    }

    let transport: Rc<dyn Transport> = if args.dry_run {
        Rc::new(DryRunTransport)
    } else {
        Rc::new(ReqwestTransport::new()?)
    };
    let dispatcher = Dispatcher::new(config, Rc::new(page), transport)?;

    let runtime = common::runtime()?;
    LocalSet::new().block_on(&runtime, send_event(dispatcher, args.name, options))
}

async fn send_event(
    dispatcher: Dispatcher,
    name: String,
    options: EventOptions,
) -> Result<(), CliError> {
    let (settled_tx, settled_rx) = oneshot::channel();
    let options = options.callback(move || {
        let _ = settled_tx.send(());
    });

    match dispatcher.dispatch(&name, options) {
        DispatchOutcome::Suppressed(reason) => {
            println!("Suppressed '{}': {}", name, reason);
        }
        DispatchOutcome::Sent => {
            match tokio::time::timeout(SETTLE_TIMEOUT, settled_rx).await {
                Ok(_) => println!("Sent '{}' to {}", name, dispatcher.config().endpoint),
                Err(_) => println!("Sent '{}', still waiting after {:?}", name, SETTLE_TIMEOUT),
            }
        }
    }
    Ok(())
}
