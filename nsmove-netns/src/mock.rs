//! In-memory [`NetNsProvider`] for tests
//!
//! Models a set of namespaces, the interfaces inside them and the current
//! namespace of every OS thread that has called into it. Failures can be
//! injected per operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use nsmove_core::{Error, InterfaceName, NetNsRef, Result};

use crate::provider::{InterfaceRef, NetNsHandle, NetNsId, NetNsProvider};

const MOCK_DEV: u64 = 4;
const HOME_INO: u64 = 4_026_531_840;

/// Provider operations, for failure injection and call inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`NetNsProvider::current`]
    Current,
    /// [`NetNsProvider::open`]
    Open,
    /// [`NetNsProvider::set_current`]
    SetCurrent,
    /// [`NetNsProvider::find_interface`]
    FindInterface,
    /// [`NetNsProvider::move_interface`]
    MoveInterface,
    /// [`NetNsProvider::release`]
    Release,
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Operation
    pub op: MockOp,
    /// Calling thread
    pub thread: ThreadId,
    /// Namespace argument, if any
    pub netns: Option<NetNsId>,
}

/// Mock provider (doesn't touch the kernel)
///
/// # Example
/// ```
/// use nsmove_core::{InterfaceName, NetNsRef};
/// use nsmove_netns::{MockNetNs, NetNsProvider};
///
/// let mock = MockNetNs::new();
/// let client = mock.add_namespace("/var/run/netns/client1");
/// mock.add_interface(mock.home(), "veth0");
///
/// let target = mock.open(&NetNsRef::from_path("/var/run/netns/client1")).unwrap();
/// let veth = mock.find_interface(&InterfaceName::new("veth0").unwrap()).unwrap();
/// mock.move_interface(&veth, &target).unwrap();
/// mock.release(target).unwrap();
///
/// assert_eq!(mock.interface_namespace("veth0"), Some(client));
/// assert_eq!(mock.open_handles(), 0);
/// ```
#[derive(Clone)]
pub struct MockNetNs {
    state: Arc<Mutex<MockState>>,
}

struct MockNamespace {
    path: Option<PathBuf>,
    interfaces: BTreeMap<String, u32>,
}

#[derive(Default)]
struct Failure {
    after: usize,
    seen: usize,
}

struct MockState {
    home: NetNsId,
    next_ino: u64,
    next_index: u32,
    namespaces: BTreeMap<NetNsId, MockNamespace>,
    threads: HashMap<ThreadId, NetNsId>,
    open_handles: usize,
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, Failure>,
    switch_failures: HashSet<NetNsId>,
}

impl MockState {
    fn new() -> Self {
        let home = NetNsId::new(MOCK_DEV, HOME_INO);
        let mut namespaces = BTreeMap::new();
        namespaces.insert(
            home,
            MockNamespace {
                path: None,
                interfaces: BTreeMap::new(),
            },
        );

        Self {
            home,
            next_ino: HOME_INO + 1,
            next_index: 2,
            namespaces,
            threads: HashMap::new(),
            open_handles: 0,
            calls: Vec::new(),
            failures: HashMap::new(),
            switch_failures: HashSet::new(),
        }
    }

    fn record(&mut self, op: MockOp, netns: Option<NetNsId>) {
        self.calls.push(MockCall {
            op,
            thread: thread::current().id(),
            netns,
        });
    }

    fn injected(&mut self, op: MockOp) -> bool {
        match self.failures.get_mut(&op) {
            Some(failure) if failure.seen >= failure.after => true,
            Some(failure) => {
                failure.seen += 1;
                false
            }
            None => false,
        }
    }

    fn thread_namespace(&self) -> NetNsId {
        self.threads
            .get(&thread::current().id())
            .copied()
            .unwrap_or(self.home)
    }
}

impl MockNetNs {
    /// Create a mock with only the home namespace
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Namespace every thread starts in
    #[must_use]
    pub fn home(&self) -> NetNsId {
        self.state().home
    }

    /// Add a namespace reachable at `path`
    pub fn add_namespace(&self, path: impl Into<PathBuf>) -> NetNsId {
        let mut state = self.state();
        let id = NetNsId::new(MOCK_DEV, state.next_ino);
        state.next_ino += 1;
        state.namespaces.insert(
            id,
            MockNamespace {
                path: Some(path.into()),
                interfaces: BTreeMap::new(),
            },
        );
        id
    }

    /// Add an interface to a namespace
    pub fn add_interface(&self, netns: NetNsId, name: &str) {
        let mut state = self.state();
        let index = state.next_index;
        state.next_index += 1;
        if let Some(ns) = state.namespaces.get_mut(&netns) {
            ns.interfaces.insert(name.to_string(), index);
        }
    }

    /// Namespace that currently holds the named interface
    #[must_use]
    pub fn interface_namespace(&self, name: &str) -> Option<NetNsId> {
        self.state()
            .namespaces
            .iter()
            .find(|(_, ns)| ns.interfaces.contains_key(name))
            .map(|(id, _)| *id)
    }

    /// Current namespace of a thread
    #[must_use]
    pub fn thread_namespace(&self, thread: ThreadId) -> NetNsId {
        let state = self.state();
        state.threads.get(&thread).copied().unwrap_or(state.home)
    }

    /// Handles opened and not yet released
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    /// All recorded calls
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls of one operation
    #[must_use]
    pub fn count(&self, op: MockOp) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    /// Make every call of `op` fail
    pub fn fail(&self, op: MockOp) {
        self.fail_after(op, 0);
    }

    /// Let `op` succeed `successes` times, then fail
    pub fn fail_after(&self, op: MockOp, successes: usize) {
        self.state().failures.insert(
            op,
            Failure {
                after: successes,
                seen: 0,
            },
        );
    }

    /// Make switching into one namespace fail
    pub fn fail_switch_into(&self, netns: NetNsId) {
        self.state().switch_failures.insert(netns);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.switch_failures.clear();
    }
}

impl Default for MockNetNs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockNetNs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNetNs").finish_non_exhaustive()
    }
}

impl NetNsProvider for MockNetNs {
    fn current(&self) -> Result<NetNsHandle> {
        let mut state = self.state();
        let id = state.thread_namespace();
        state.record(MockOp::Current, Some(id));

        if state.injected(MockOp::Current) {
            return Err(Error::acquisition("mock: injected current() failure"));
        }

        state.open_handles += 1;
        Ok(NetNsHandle::detached(id))
    }

    fn open(&self, reference: &NetNsRef) -> Result<NetNsHandle> {
        let mut state = self.state();
        state.record(MockOp::Open, None);

        if state.injected(MockOp::Open) {
            return Err(Error::acquisition("mock: injected open() failure"));
        }

        let id = state
            .namespaces
            .iter()
            .find(|(_, ns)| ns.path.as_deref() == Some(reference.path()))
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                Error::acquisition(format!("mock: no network namespace at {reference}"))
            })?;

        state.open_handles += 1;
        tracing::debug!(netns = %id, reference = %reference, "Mock: Opened namespace");
        Ok(NetNsHandle::detached(id))
    }

    fn set_current(&self, handle: &NetNsHandle) -> Result<()> {
        let mut state = self.state();
        let id = handle.id();
        state.record(MockOp::SetCurrent, Some(id));

        if state.injected(MockOp::SetCurrent) || state.switch_failures.contains(&id) {
            return Err(Error::switch(format!("mock: injected setns({id}) failure")));
        }
        if !state.namespaces.contains_key(&id) {
            return Err(Error::switch(format!("mock: unknown namespace {id}")));
        }

        state.threads.insert(thread::current().id(), id);
        tracing::debug!(netns = %id, "Mock: Switched namespace");
        Ok(())
    }

    fn find_interface(&self, name: &InterfaceName) -> Result<InterfaceRef> {
        let mut state = self.state();
        let current = state.thread_namespace();
        state.record(MockOp::FindInterface, Some(current));

        let lookup_error = |message: String| Error::Lookup {
            interface: name.to_string(),
            message,
        };

        if state.injected(MockOp::FindInterface) {
            return Err(lookup_error("mock: injected lookup failure".to_string()));
        }

        state
            .namespaces
            .get(&current)
            .and_then(|ns| ns.interfaces.get(name.as_str()))
            .map(|&index| InterfaceRef {
                name: name.clone(),
                index,
            })
            .ok_or_else(|| lookup_error(format!("no such device in {current}")))
    }

    fn move_interface(&self, interface: &InterfaceRef, target: &NetNsHandle) -> Result<()> {
        let mut state = self.state();
        let current = state.thread_namespace();
        let to = target.id();
        state.record(MockOp::MoveInterface, Some(to));

        let relocation_error = |message: String| Error::Relocation {
            interface: interface.name.to_string(),
            message,
        };

        if state.injected(MockOp::MoveInterface) {
            return Err(relocation_error("mock: injected move failure".to_string()));
        }
        if !state.namespaces.contains_key(&to) {
            return Err(relocation_error(format!("mock: unknown namespace {to}")));
        }

        let index = state
            .namespaces
            .get_mut(&current)
            .and_then(|ns| ns.interfaces.remove(interface.name.as_str()))
            .ok_or_else(|| relocation_error(format!("not present in {current}")))?;

        if let Some(ns) = state.namespaces.get_mut(&to) {
            ns.interfaces.insert(interface.name.to_string(), index);
        }

        tracing::debug!(
            interface = %interface.name,
            from = %current,
            to = %to,
            "Mock: Moved interface"
        );
        Ok(())
    }

    fn release(&self, handle: NetNsHandle) -> Result<()> {
        let mut state = self.state();
        state.record(MockOp::Release, Some(handle.id()));
        state.open_handles = state.open_handles.saturating_sub(1);

        if state.injected(MockOp::Release) {
            return Err(Error::Io(std::io::Error::other(
                "mock: injected release failure",
            )));
        }
        Ok(())
    }
}
