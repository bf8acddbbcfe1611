use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// A process-wide interrupt flag, set by the SIGINT handler and polled at
/// every cooperative cancellation point (approval prompt, batch loop,
/// subagent wait, the outer iterative loop). This is the one legitimate
/// global the design calls for (spec.md §9): it must be reachable from
/// signal-handler context, where threading a value through is not an
/// option.
pub type InterruptFlag = &'static AtomicBool;

static INTERRUPT: OnceLock<AtomicBool> = OnceLock::new();

/// Returns the process-wide interrupt flag, initializing it to `false` on
/// first access.
pub fn interrupt_flag() -> InterruptFlag {
    INTERRUPT.get_or_init(|| AtomicBool::new(false))
}

/// Installs a SIGINT handler that sets the interrupt flag and returns
/// immediately — no unwinding happens inside the handler itself, every
/// blocking site polls the flag cooperatively at its own pace. Safe to
/// call more than once; only the first installation takes effect.
///
/// Uses the `ctrlc` crate rather than a hand-rolled `sigaction` so this
/// crate's `#![deny(unsafe_code)]` holds; the subagent supervisor's use of
/// `SIGTERM`/`SIGKILL` against *children* is a separate, unrelated concern
/// handled in `ralph-subagent`.
///
/// # Panics
///
/// Panics if the underlying signal handler cannot be installed (e.g. a
/// platform without SIGINT support); this is treated as a startup-time
/// configuration error, not a recoverable runtime condition.
pub fn install_sigint_handler() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let flag = interrupt_flag();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .expect("failed to install SIGINT handler");
    });
}

/// Clears the interrupt flag. Called once a pending interrupt has been
/// consumed (e.g. by the batch executor filling remaining slots with
/// `interrupted` results).
pub fn clear_interrupt(flag: InterruptFlag) {
    flag.store(false, Ordering::SeqCst);
}
