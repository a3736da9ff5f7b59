//! Moving one named interface between namespaces

use std::sync::Arc;
use tracing::{debug, error, warn};

use nsmove_core::{Error, InterfaceName, NetNsRef, Result};

use crate::provider::{NetNsHandle, NetNsProvider};
use crate::switcher::NamespaceSwitcher;

/// Move `name` from namespace `from` to namespace `to`
///
/// The thread is switched into `from` for the lookup and reassignment and is
/// always switched back to the switcher's home afterwards, whatever the
/// outcome. Must run on the worker thread that owns `switcher`.
///
/// # Errors
/// - [`Error::Switch`] if entering `from` fails (nothing else is attempted)
/// - [`Error::Lookup`] if `name` does not exist in `from`
/// - [`Error::Relocation`] if the kernel refuses the move
/// - [`Error::UnrecoverableState`] if switching back home fails; this wins
///   over any earlier error, which is kept in the message
pub fn move_interface(
    switcher: &NamespaceSwitcher,
    name: &InterfaceName,
    from: &NetNsHandle,
    to: &NetNsHandle,
) -> Result<()> {
    switcher.switch_to(from)?;

    let outcome = switcher
        .provider()
        .find_interface(name)
        .and_then(|interface| switcher.provider().move_interface(&interface, to));

    if let Err(restore_err) = switcher.restore() {
        let mut message = format!(
            "failed to switch back to home network namespace {} after moving {name}: {restore_err}",
            switcher.home()
        );
        if let Err(e) = &outcome {
            message.push_str(&format!(" (move itself failed: {e})"));
        }
        error!(interface = %name, home = %switcher.home(), "{message}");
        return Err(Error::UnrecoverableState { message });
    }

    if outcome.is_ok() {
        debug!(interface = %name, from = %from, to = %to, "Moved interface");
    }
    outcome
}

/// Open handles for moving one interface between home and a target namespace
///
/// Holds the switcher (home) and the target handle for the duration of a
/// request, so a compensating move reuses the handles the forward move used.
#[derive(Debug)]
pub struct InterfaceRelocator {
    switcher: NamespaceSwitcher,
    target: NetNsHandle,
    interface: InterfaceName,
}

impl InterfaceRelocator {
    /// Open the target namespace, then capture home
    ///
    /// Must run on the worker thread. On failure every handle opened so far is
    /// released.
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] if either handle cannot be opened
    pub fn open(
        provider: Arc<dyn NetNsProvider>,
        target: &NetNsRef,
        interface: InterfaceName,
    ) -> Result<Self> {
        let target_handle = provider.open(target).map_err(|e| match e {
            Error::Acquisition { .. } => e,
            other => Error::acquisition(format!(
                "failed to open network namespace {target}: {other}"
            )),
        })?;

        let switcher = match NamespaceSwitcher::create(provider.clone()) {
            Ok(switcher) => switcher,
            Err(e) => {
                if let Err(release_err) = provider.release(target_handle) {
                    warn!(error = %release_err, "Failed to release target namespace handle");
                }
                return Err(e);
            }
        };

        Ok(Self {
            switcher,
            target: target_handle,
            interface,
        })
    }

    /// Interface being moved
    #[must_use]
    pub const fn interface(&self) -> &InterfaceName {
        &self.interface
    }

    /// Move the interface from home into the target namespace
    ///
    /// # Errors
    /// See [`move_interface`]
    pub fn move_to_target(&self) -> Result<()> {
        move_interface(
            &self.switcher,
            &self.interface,
            self.switcher.home(),
            &self.target,
        )
    }

    /// Move the interface from the target namespace back home
    ///
    /// # Errors
    /// See [`move_interface`]
    pub fn move_to_home(&self) -> Result<()> {
        move_interface(
            &self.switcher,
            &self.interface,
            &self.target,
            self.switcher.home(),
        )
    }

    /// Release the target handle and the switcher
    ///
    /// Both are released even if the first release fails; the first error is
    /// returned.
    ///
    /// # Errors
    /// Returns the first release failure
    pub fn close(self) -> Result<()> {
        let Self {
            switcher, target, ..
        } = self;

        let target_result = switcher.provider().release(target);
        let switcher_result = switcher.close();
        target_result.and(switcher_result)
    }

    /// [`close`](Self::close), logging instead of returning failures
    pub fn release(self) {
        let interface = self.interface.clone();
        if let Err(e) = self.close() {
            warn!(interface = %interface, error = %e, "Failed to release namespace handles");
        }
    }
}
