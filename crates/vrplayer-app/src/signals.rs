//! Process signals: SIGUSR1/SIGUSR2 recentre the view, SIGINT/SIGTERM quit.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

static RESET_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_reset_signal(_signal: c_int) {
    RESET_REQUESTED.store(true, Ordering::SeqCst);
}

pub struct Signals {
    quit: Arc<AtomicBool>,
}

impl Signals {
    /// Install the handlers. Call once per process.
    pub fn install() -> Result<Self> {
        let quit = Arc::new(AtomicBool::new(false));
        {
            let quit = Arc::clone(&quit);
            ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst))
                .context("installing SIGINT/SIGTERM handler")?;
        }

        for signal in [libc::SIGUSR1, libc::SIGUSR2] {
            let handler = on_reset_signal as extern "C" fn(c_int) as libc::sighandler_t;
            if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
                anyhow::bail!("installing handler for signal {signal} failed");
            }
        }
        debug!("Signal handlers installed");
        Ok(Self { quit })
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// True once per received SIGUSR1/SIGUSR2 burst.
    pub fn take_reset(&self) -> bool {
        take_reset()
    }
}

fn take_reset() -> bool {
    RESET_REQUESTED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_signal_is_consumed_once() {
        on_reset_signal(libc::SIGUSR1);
        on_reset_signal(libc::SIGUSR2);
        assert!(take_reset());
        assert!(!take_reset());
    }
}
