//! Capability traits for the platform services the ring engine consumes.
//!
//! The concrete mechanisms behind these traits (hypervisor page sharing,
//! cross-domain interrupt lines, a hierarchical configuration store) exist
//! only in the paravirtual domain, so the engine talks to them through
//! trait objects. Any shared-memory-plus-doorbell transport satisfying the
//! ordering contracts documented here can stand in: production bindings,
//! an in-process device model, or the fakes used by the integration tests.

use std::fmt;
use std::sync::Arc;

use pvinput_proto::SharedPage;

use crate::error::{ChannelError, GrantError, ServiceError, StoreError};

/// Identifier of a peer execution domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(pub u16);

/// Frame number backing the shared page, as published under the legacy
/// `page-ref` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameNumber(pub u64);

/// Externally visible reference number of a grant entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantRef(pub u32);

/// Port number of a signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port(pub u32);

/// Reference-counted access to a platform service.
///
/// `acquire` pins the service for a connected lifetime and may fail if the
/// service is unavailable; `release` undoes one acquire. The engine only
/// holds acquisitions through [`ServiceGuard`], which releases on drop so
/// a failed connect unwinds automatically.
pub trait Service: Send + Sync {
    fn acquire(&self) -> Result<(), ServiceError>;
    fn release(&self);
}

/// RAII pairing of [`Service::acquire`] and [`Service::release`].
pub struct ServiceGuard<S: Service + ?Sized> {
    service: Arc<S>,
}

impl<S: Service + ?Sized> ServiceGuard<S> {
    pub fn acquire(service: Arc<S>) -> Result<Self, ServiceError> {
        service.acquire()?;
        Ok(Self { service })
    }

    pub fn get(&self) -> &S {
        &self.service
    }
}

impl<S: Service + ?Sized> Drop for ServiceGuard<S> {
    fn drop(&mut self) {
        self.service.release();
    }
}

/// Callback invoked by the platform's fault-reporting path.
///
/// May run during a crash: implementations must not block, allocate or
/// take locks, and may only emit output through
/// [`DebugService::printf`].
pub trait DebugCallback: Send + Sync {
    fn debug(&self, crashing: bool);
}

/// A live diagnostics registration; dropping it deregisters the callback.
pub trait DebugRegistration: Send + Sync {}

/// Debug-dump registration service.
pub trait DebugService: Service {
    fn register(
        &self,
        name: &str,
        callback: Arc<dyn DebugCallback>,
    ) -> Result<Box<dyn DebugRegistration>, ServiceError>;

    /// Fault-safe formatted output; usable from a [`DebugCallback`] even
    /// while the system is crashing.
    fn printf(&self, args: fmt::Arguments<'_>);
}

/// An open configuration-store transaction.
///
/// Writes are buffered; nothing becomes visible to the peer unless
/// `commit` succeeds. Dropping an uncommitted transaction aborts it.
pub trait StoreTransaction: Send {
    fn write(&mut self, path: &str, key: &str, value: &str) -> Result<(), StoreError>;
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// The shared configuration store both domains use for discovery.
pub trait ConfigStore: Service {
    /// Read a key under `path`. Missing keys are an error (the caller
    /// decides whether absence is meaningful).
    fn read(&self, path: &str, key: &str) -> Result<String, StoreError>;

    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Lock handed to a grant cache so it can serialize its internal
/// callbacks against concurrent grant-service activity. Critical sections
/// are short and bounded; the lock is never held across a blocking call.
pub trait CacheLock: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
}

/// A granted page: the peer domain holds read (and optionally write)
/// access until the entry is dropped, which revokes the grant
/// (best-effort; revoke failures are advisory).
pub trait GrantEntry: Send + Sync {
    fn reference(&self) -> GrantRef;
}

/// Per-instance pool batching grant allocations. Destroyed on drop.
pub trait GrantCache: Send + Sync {
    /// Permit `domain` to access `page`. In this hosted realization the
    /// grant carries the page handle itself: granting is sharing.
    fn permit_foreign_access(
        &self,
        domain: DomainId,
        page: Arc<SharedPage>,
        readonly: bool,
    ) -> Result<Box<dyn GrantEntry>, GrantError>;
}

/// Memory-grant service.
pub trait GrantService: Service {
    fn create_cache(
        &self,
        name: &str,
        lock: Arc<dyn CacheLock>,
    ) -> Result<Box<dyn GrantCache>, GrantError>;
}

/// Interrupt-context handler for a signal channel.
///
/// Runs in the platform's interrupt context: short, non-preemptible, must
/// not block. Returns whether the signal was handled (the engine always
/// answers `true`; it never defers to a lower-priority handler).
pub trait SignalHandler: Send + Sync {
    fn signal(&self) -> bool;
}

/// An open inter-domain signal channel.
///
/// Delivery contract: signals are edge-triggered doorbells with no
/// payload; several may be delivered back to back before any handler
/// work runs, and the platform may suppress delivery while the channel
/// is masked. [`Channel::unmask`] re-arms delivery and is idempotent;
/// on a closed channel it is a no-op, so an already-queued drain pass
/// cannot misfire after disconnect.
pub trait Channel: Send + Sync {
    fn port(&self) -> Port;
    fn mask(&self);
    fn unmask(&self);
    /// Close the channel. Idempotent; also performed on final drop.
    fn close(&self);
}

/// Signal-channel service.
pub trait ChannelService: Service {
    /// Open an unbound channel to `remote`, registering `handler` for its
    /// signals. The channel starts masked when `masked` is set.
    fn open_unbound(
        &self,
        remote: DomainId,
        handler: Arc<dyn SignalHandler>,
        masked: bool,
    ) -> Result<Arc<dyn Channel>, ChannelError>;
}

/// One unit of deferred work.
pub trait DeferredJob: Send + Sync {
    fn run(&self);
}

/// The platform's deferred-execution facility.
///
/// Jobs submitted for one engine are executed serially and to completion;
/// there is no cancellation. The engine coalesces upstream, so at most one
/// submission per engine is outstanding at a time.
pub trait WorkQueue: Send + Sync {
    fn submit(&self, job: Arc<dyn DeferredJob>);
}

/// Where decoded events go. Calls never block and never fail.
pub trait EventSink: Send + Sync {
    fn motion(&self, rel_x: i32, rel_y: i32, rel_z: i32);
    fn key(&self, keycode: u32, pressed: bool);
    fn position(&self, abs_x: i32, abs_y: i32, rel_z: i32);
}

/// The frontend object owning this engine: overall connect state, the
/// backend's domain id and the store paths of both ends.
pub trait Frontend: Send + Sync {
    fn backend_domain(&self) -> DomainId;
    /// Store path of this device (connection info is published here).
    fn frontend_path(&self) -> String;
    /// Store path advertised by the backend (features are read here).
    fn backend_path(&self) -> String;
}
