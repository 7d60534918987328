//! `classify`: show how a link click would be reported.
//!
//! Events are logged through the dry-run transport; nothing is sent.

use std::path::Path;
use std::rc::Rc;

use clap::Args;
use plausible_tracker::classifier::{ClickEvent, MouseButton, NAVIGATION_DELAY};
use plausible_tracker::config::{split_list, ConfigSource, ATTR_FILE_TYPES};
use plausible_tracker::{
    Anchor, DetachedPage, Dispatcher, DryRunTransport, InteractionClassifier, Page, TokioScheduler,
    TrackerConfig,
};
use tokio::task::LocalSet;

use super::common::{self, SourceOverrides};
use crate::error::CliError;

/// Arguments for `classify`.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Link href
    pub href: String,

    /// URL of the page containing the link
    #[arg(long)]
    pub page: String,

    /// Link target attribute
    #[arg(long)]
    pub target: Option<String>,

    /// Middle-button click (auxclick)
    #[arg(long)]
    pub middle: bool,

    /// Hold ctrl
    #[arg(long)]
    pub ctrl: bool,

    /// Hold meta (cmd)
    #[arg(long)]
    pub meta: bool,

    /// Hold shift
    #[arg(long)]
    pub shift: bool,

    #[command(flatten)]
    pub overrides: SourceOverrides,
}

impl ClassifyArgs {
    fn click_event(&self) -> ClickEvent {
        let mut event = if self.middle {
            ClickEvent::aux_click(MouseButton::Middle)
        } else {
            ClickEvent::click()
        };
        event.ctrl_key = self.ctrl;
        event.meta_key = self.meta;
        event.shift_key = self.shift;
        event
    }

    fn anchor(&self) -> Anchor {
        let anchor = Anchor::new(self.href.as_str());
        match &self.target {
            Some(target) => anchor.with_target(target.as_str()),
            None => anchor,
        }
    }
}

/// Run `classify`.
pub fn run(args: ClassifyArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let source = common::load_source(config_path, &args.overrides)?;
    let mut features = source.features();
    features.outbound_links = true;
    features.file_downloads = true;

    let mut config = TrackerConfig::new("dry-run", "dry-run").with_features(features);
    if let Some(list) = source.attribute(ATTR_FILE_TYPES) {
        let extensions = split_list(&list);
        if !extensions.is_empty() {
            config = config.with_file_extensions(extensions);
        }
    }

    let page = Rc::new(
        DetachedPage::at(&args.page)
            .map_err(|e| CliError::InvalidArgument(format!("--page {}: {}", args.page, e)))?,
    );

    let runtime = common::runtime()?;
    LocalSet::new().block_on(&runtime, async move {
        let dispatcher = Rc::new(Dispatcher::new(
            config.clone(),
            page.clone(),
            Rc::new(DryRunTransport),
        )?);
        let classifier =
            InteractionClassifier::new(&config, page.clone(), dispatcher, Rc::new(TokioScheduler));

        let anchor = args.anchor();
        if let Some(link) = classifier.classify(&anchor) {
            println!("resolved:      {}", link.url);
            println!("file download: {}", link.file_download);
            println!("outbound:      {}", link.outbound);
        }

        let outcome = classifier.handle_anchor(&anchor, &args.click_event());
        println!("outcome:       {:?}", outcome);

        if outcome.prevents_default() {
            tokio::time::sleep(NAVIGATION_DELAY * 2).await;
            println!("navigated to:  {}", page.location().href);
        }
        Ok::<(), CliError>(())
    })
}
