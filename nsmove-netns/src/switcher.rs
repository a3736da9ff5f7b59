//! Switching the calling thread between network namespaces

use std::sync::Arc;
use tracing::{trace, warn};

use nsmove_core::{Error, Result};

use crate::provider::{NetNsHandle, NetNsProvider};

/// Switches the calling thread between namespaces and back to "home"
///
/// Home is the namespace the thread was in when the switcher was created; it
/// never changes afterwards. All methods act on the calling OS thread, so a
/// switcher must only be used from the [`NetNsWorker`](crate::NetNsWorker)
/// thread that created it.
pub struct NamespaceSwitcher {
    provider: Arc<dyn NetNsProvider>,
    home: NetNsHandle,
}

impl NamespaceSwitcher {
    /// Capture the calling thread's current namespace as home
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] if the current namespace cannot be read
    pub fn create(provider: Arc<dyn NetNsProvider>) -> Result<Self> {
        let home = provider.current().map_err(|e| {
            Error::acquisition(format!("failed to capture home network namespace: {e}"))
        })?;

        trace!(home = %home, "Created namespace switcher");
        Ok(Self { provider, home })
    }

    /// The home namespace
    #[must_use]
    pub const fn home(&self) -> &NetNsHandle {
        &self.home
    }

    /// The provider this switcher works through
    #[must_use]
    pub fn provider(&self) -> &dyn NetNsProvider {
        self.provider.as_ref()
    }

    /// Switch the calling thread to `target`
    ///
    /// Does nothing (and issues no set call) if the thread is already there.
    ///
    /// # Errors
    /// Returns [`Error::Switch`] if the current namespace cannot be read or the
    /// switch is refused
    pub fn switch_to(&self, target: &NetNsHandle) -> Result<()> {
        let current = self
            .provider
            .current()
            .map_err(|e| Error::switch(format!("failed to read current network namespace: {e}")))?;

        let already_there = self.provider.same(&current, target);
        if let Err(e) = self.provider.release(current) {
            warn!(error = %e, "Failed to release current namespace handle");
        }

        if already_there {
            trace!(netns = %target, "Already in requested namespace");
            return Ok(());
        }

        self.provider.set_current(target).map_err(|e| match e {
            Error::Switch { .. } => e,
            other => Error::switch(format!("failed to switch to {target}: {other}")),
        })
    }

    /// Switch the calling thread back to home
    ///
    /// # Errors
    /// Returns [`Error::Switch`] if the switch is refused
    pub fn restore(&self) -> Result<()> {
        self.switch_to(&self.home)
    }

    /// Release the home handle
    ///
    /// # Errors
    /// Returns error if the provider fails to release the handle
    pub fn close(self) -> Result<()> {
        trace!(home = %self.home, "Closing namespace switcher");
        self.provider.release(self.home)
    }
}

impl std::fmt::Debug for NamespaceSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceSwitcher")
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNetNs, MockOp};
    use nsmove_core::NetNsRef;
    use std::thread;

    fn setup() -> (MockNetNs, Arc<dyn NetNsProvider>) {
        let mock = MockNetNs::new();
        mock.add_namespace("/var/run/netns/client1");
        let provider: Arc<dyn NetNsProvider> = Arc::new(mock.clone());
        (mock, provider)
    }

    #[test]
    fn test_switch_to_current_is_noop() {
        let (mock, provider) = setup();
        let switcher = NamespaceSwitcher::create(provider.clone()).unwrap();

        let home = provider.current().unwrap();
        switcher.switch_to(&home).unwrap();
        switcher.restore().unwrap();

        assert_eq!(mock.count(MockOp::SetCurrent), 0);

        provider.release(home).unwrap();
        switcher.close().unwrap();
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_switch_and_restore() {
        let (mock, provider) = setup();
        let switcher = NamespaceSwitcher::create(provider.clone()).unwrap();
        let target = provider
            .open(&NetNsRef::from_path("/var/run/netns/client1"))
            .unwrap();

        switcher.switch_to(&target).unwrap();
        assert_eq!(mock.thread_namespace(thread::current().id()), target.id());

        switcher.restore().unwrap();
        assert_eq!(mock.thread_namespace(thread::current().id()), mock.home());
        assert_eq!(mock.count(MockOp::SetCurrent), 2);

        provider.release(target).unwrap();
        switcher.close().unwrap();
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_create_fails_without_current() {
        let (mock, provider) = setup();
        mock.fail(MockOp::Current);

        let err = NamespaceSwitcher::create(provider).unwrap_err();
        assert!(matches!(err, Error::Acquisition { .. }));
    }

    #[test]
    fn test_switch_failure() {
        let (mock, provider) = setup();
        let switcher = NamespaceSwitcher::create(provider.clone()).unwrap();
        let target = provider
            .open(&NetNsRef::from_path("/var/run/netns/client1"))
            .unwrap();
        mock.fail_switch_into(target.id());

        let err = switcher.switch_to(&target).unwrap_err();
        assert!(matches!(err, Error::Switch { .. }));
        assert_eq!(mock.thread_namespace(thread::current().id()), mock.home());

        provider.release(target).unwrap();
        switcher.close().unwrap();
    }
}
