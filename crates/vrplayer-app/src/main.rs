use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vrplayer_core::{CaptureError, DecodeError, ErrorClass, PlayerConfig, PlayerError, PoseError, RenderError};

mod app;
mod cli;
mod notify;
mod signals;
mod throttle;
mod zoom;

use cli::Cli;

/// Failure class of the first typed error in the chain.
fn error_class(err: &anyhow::Error) -> ErrorClass {
    err.chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<PlayerError>() {
                Some(e.class())
            } else if let Some(e) = cause.downcast_ref::<CaptureError>() {
                Some(e.class())
            } else if let Some(e) = cause.downcast_ref::<RenderError>() {
                Some(e.class())
            } else if let Some(e) = cause.downcast_ref::<DecodeError>() {
                Some(e.class())
            } else if cause.downcast_ref::<PoseError>().is_some() {
                Some(ErrorClass::PoseSource)
            } else {
                None
            }
        })
        .unwrap_or(ErrorClass::ResourceAcquisitionFailure)
}

fn exit_code(class: ErrorClass) -> ExitCode {
    ExitCode::from(class.exit_code() as u8)
}

fn start(cli: Cli) -> Result<()> {
    let config = PlayerConfig::resolve(cli.raw_options())?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    app::run(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { exit_code(ErrorClass::Usage) } else { ExitCode::SUCCESS };
        }
    };

    info!("vr-video-player v{}", env!("CARGO_PKG_VERSION"));

    match start(cli) {
        Ok(()) => {
            info!("vr-video-player exited cleanly.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let class = error_class(&e);
            error!("Fatal error ({}): {:#}", class.label(), e);
            exit_code(class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_found_through_context() {
        let err = Err::<(), _>(CaptureError::WindowGone { window: 0x42 })
            .context("capturing window 0x42")
            .expect_err("error");
        assert_eq!(error_class(&err), ErrorClass::InvalidWindowReference);

        let err = anyhow::Error::from(PlayerError::usage("bad zoom"));
        assert_eq!(error_class(&err), ErrorClass::Usage);

        let err = Err::<(), _>(PoseError::RuntimeUnavailable { reason: "no runtime".into() })
            .context("starting VR session")
            .expect_err("error");
        assert_eq!(error_class(&err), ErrorClass::PoseSource);
    }

    #[test]
    fn untyped_errors_are_resource_failures() {
        assert_eq!(error_class(&anyhow::anyhow!("boom")), ErrorClass::ResourceAcquisitionFailure);
    }
}
