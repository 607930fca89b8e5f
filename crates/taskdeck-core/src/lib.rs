pub mod app;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod render;
pub mod repository;
pub mod store;
pub mod task;
pub mod timers;
pub mod undo;
pub mod view;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::app::{
  App,
  AppOptions
};
use crate::clock::SystemClock;
use crate::store::{
  FileStore,
  KeyValueStore,
  MemoryStore
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskdeck"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let renderer =
    render::Renderer::new(&cfg)?;
  let options = AppOptions {
    timings:       cfg.timings(),
    timezone:      datetime::resolve_timezone(
      cfg.get("timezone").as_deref()
    ),
    ambient_theme: cfg.ambient_theme(),
    ids:           cfg.id_generator()
  };

  if cli.ephemeral {
    info!("running without persistence");
    return run_interactive(
      MemoryStore::new(),
      options,
      &renderer
    );
  }

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = FileStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open store at {}",
      data_dir.display()
    )
  })?;

  run_interactive(
    store, options, &renderer
  )
}

fn run_interactive<S: KeyValueStore>(
  store: S,
  options: AppOptions,
  renderer: &render::Renderer
) -> anyhow::Result<()> {
  let mut app = App::with_options(
    store,
    SystemClock,
    options
  );

  let stdin = io::stdin();
  let mut stdout = io::stdout();
  commands::run_session(
    &mut app,
    renderer,
    stdin.lock(),
    &mut stdout,
    std::thread::sleep
  )?;

  info!("done");
  Ok(())
}
