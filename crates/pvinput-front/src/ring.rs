//! The ring engine: connection lifecycle, deferred drain and diagnostics.
//!
//! One engine instance exists per device, owned by the frontend object for
//! its connected lifetime. `connect` provisions the cross-domain resources
//! (page grant, signal channel, diagnostics registration) with full
//! rollback on partial failure; the backend discovers them through the
//! keys written by `publish_connection_info`. Once the backend attaches,
//! its doorbell signals are coalesced into deferred drain passes that walk
//! the shared ring and dispatch each record to the event sink.

use std::sync::{Arc, OnceLock};

use tracing::{debug, error, trace};

use pvinput_proto::{InputEvent, SharedPage};

use crate::error::{ConnectError, StoreError};
use crate::notify::{Notifier, SpinLock};
use crate::platform::{
    CacheLock, Channel, ChannelService, ConfigStore, DebugCallback, DebugRegistration,
    DebugService, DeferredJob, DomainId, EventSink, FrameNumber, Frontend, GrantCache,
    GrantEntry, GrantService, ServiceGuard, SignalHandler, StoreTransaction, WorkQueue,
};

/// The platform services the engine consumes, handed over by the frontend
/// at construction time.
pub struct Services {
    pub debug: Arc<dyn DebugService>,
    pub store: Arc<dyn ConfigStore>,
    pub evtchn: Arc<dyn ChannelService>,
    pub gnttab: Arc<dyn GrantService>,
    pub queue: Arc<dyn WorkQueue>,
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingCounters {
    /// Doorbell signals delivered by the channel.
    pub signals: u64,
    /// Drain passes submitted to the deferred queue (coalesced).
    pub drains_scheduled: u64,
}

/// Closes the channel deterministically at disconnect, rather than relying
/// on the last `Arc` drop (the drain job keeps a clone).
struct ChannelGuard {
    channel: Arc<dyn Channel>,
}

impl ChannelGuard {
    fn open(
        service: &dyn ChannelService,
        remote: DomainId,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<Self, ConnectError> {
        let channel = service
            .open_unbound(remote, handler, true)
            .map_err(ConnectError::ChannelOpen)?;
        Ok(Self { channel })
    }

    fn get(&self) -> &dyn Channel {
        &*self.channel
    }

    fn handle(&self) -> Arc<dyn Channel> {
        self.channel.clone()
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.channel.close();
    }
}

/// Everything `connect` provisions.
///
/// Fields drop in declaration order, which is exactly the disconnect
/// sequence: deregister diagnostics, close the channel, revoke the grant,
/// free the page, destroy the cache, then release the four services in
/// reverse order of acquisition. A failed connect never builds this
/// struct; its partially provisioned locals unwind the same way.
/// Underscore-prefixed fields exist only for that drop order.
struct Connection {
    _debug_registration: Box<dyn DebugRegistration>,
    channel: ChannelGuard,
    grant: Box<dyn GrantEntry>,
    _page: Arc<SharedPage>,
    frame: FrameNumber,
    _cache: Box<dyn GrantCache>,
    job: Arc<DrainPass>,
    _gnttab: ServiceGuard<dyn GrantService>,
    _evtchn: ServiceGuard<dyn ChannelService>,
    _store: ServiceGuard<dyn ConfigStore>,
    _debug: ServiceGuard<dyn DebugService>,
}

/// The deferred drain pass. At most one instance per engine runs at a
/// time: the pending flag coalesces submissions and the work queue
/// serializes execution.
struct DrainPass {
    notifier: Arc<Notifier>,
    page: Arc<SharedPage>,
    sink: Arc<dyn EventSink>,
    /// Set right after the channel opens; the pass re-arms delivery
    /// through it. Empty only during the connect window before the
    /// channel exists.
    channel: OnceLock<Arc<dyn Channel>>,
}

impl DeferredJob for DrainPass {
    fn run(&self) {
        // Clear the pending mark before reading the cursors so a doorbell
        // arriving mid-dispatch schedules a fresh pass.
        self.notifier.begin_drain();

        drain(&self.page, &*self.sink);

        // Exactly once per pass, after the final empty re-check.
        if let Some(channel) = self.channel.get() {
            channel.unmask();
        }
    }
}

/// Interrupt-context relay registered with the signal channel.
struct SignalRelay {
    notifier: Arc<Notifier>,
    queue: Arc<dyn WorkQueue>,
    job: Arc<dyn DeferredJob>,
}

impl SignalHandler for SignalRelay {
    fn signal(&self) -> bool {
        self.notifier.signal(&*self.queue, &self.job)
    }
}

/// Fault-dump callback: instance address and enabled state, emitted via
/// the debug service's fault-safe printf. No locks, no allocation.
struct DebugReport {
    debug: Arc<dyn DebugService>,
    notifier: Arc<Notifier>,
    /// The engine is an owned value and may move between calls; the
    /// notifier is its one heap allocation with a stable address for the
    /// engine's whole lifetime, so that address identifies the instance.
    instance: usize,
}

impl DebugCallback for DebugReport {
    fn debug(&self, _crashing: bool) {
        self.debug.printf(format_args!(
            "{:#x} [{}]",
            self.instance,
            if self.notifier.is_enabled() {
                "ENABLED"
            } else {
                "DISABLED"
            }
        ));
    }
}

/// Frontend-side engine of the paravirtual input ring.
pub struct RingEngine {
    frontend: Arc<dyn Frontend>,
    services: Services,
    sink: Arc<dyn EventSink>,
    notifier: Arc<Notifier>,
    cache_lock: Arc<SpinLock>,
    abs_pointer: bool,
    connection: Option<Connection>,
}

impl RingEngine {
    /// Construct an empty, disconnected engine.
    pub fn new(frontend: Arc<dyn Frontend>, services: Services, sink: Arc<dyn EventSink>) -> Self {
        Self {
            frontend,
            services,
            sink,
            notifier: Arc::new(Notifier::new()),
            cache_lock: Arc::new(SpinLock::new()),
            abs_pointer: false,
            connection: None,
        }
    }

    /// Provision the shared page, grant, signal channel and diagnostics
    /// registration, in that order. On failure at any step the already
    /// provisioned subset is released deepest-first and the originating
    /// error is returned.
    ///
    /// Calling `connect` on an already connected engine is a contract
    /// violation.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        assert!(
            self.connection.is_none(),
            "connect called on a connected engine"
        );

        match self.try_connect() {
            Ok(connection) => {
                self.connection = Some(connection);
                debug!(abs_pointer = self.abs_pointer, "input ring connected");
                Ok(())
            }
            Err(err) => {
                // Signals received during the failed attempt are forgotten
                // along with the channel that delivered them.
                self.notifier.reset_signals();
                error!(error = %err, "input ring connect failed");
                Err(err)
            }
        }
    }

    fn try_connect(&mut self) -> Result<Connection, ConnectError> {
        // Locals unwind in reverse declaration order on any early return,
        // giving the deepest-first rollback for free.
        let debug = ServiceGuard::acquire(self.services.debug.clone()).map_err(|source| {
            ConnectError::Service {
                service: "debug",
                source,
            }
        })?;
        let store = ServiceGuard::acquire(self.services.store.clone()).map_err(|source| {
            ConnectError::Service {
                service: "store",
                source,
            }
        })?;
        let evtchn = ServiceGuard::acquire(self.services.evtchn.clone()).map_err(|source| {
            ConnectError::Service {
                service: "evtchn",
                source,
            }
        })?;
        let gnttab = ServiceGuard::acquire(self.services.gnttab.clone()).map_err(|source| {
            ConnectError::Service {
                service: "gnttab",
                source,
            }
        })?;

        let cache = gnttab
            .get()
            .create_cache("pvinput-ring", self.cache_lock.clone() as Arc<dyn CacheLock>)
            .map_err(ConnectError::CacheCreate)?;

        self.abs_pointer = read_feature_flag(
            store.get(),
            &self.frontend.backend_path(),
            "feature-abs-pointer",
        );

        let page = Arc::new(SharedPage::new());
        let frame = page_frame(&page);

        let grant = cache
            .permit_foreign_access(self.frontend.backend_domain(), page.clone(), false)
            .map_err(ConnectError::Grant)?;

        let job = Arc::new(DrainPass {
            notifier: self.notifier.clone(),
            page: page.clone(),
            sink: self.sink.clone(),
            channel: OnceLock::new(),
        });
        let handler: Arc<dyn SignalHandler> = Arc::new(SignalRelay {
            notifier: self.notifier.clone(),
            queue: self.services.queue.clone(),
            job: job.clone() as Arc<dyn DeferredJob>,
        });

        let channel = ChannelGuard::open(evtchn.get(), self.frontend.backend_domain(), handler)?;
        let _ = job.channel.set(channel.handle());

        // Deliver the backend's signals from here on.
        channel.get().unmask();

        let debug_registration = debug
            .get()
            .register(
                "pvinput|ring",
                Arc::new(DebugReport {
                    debug: self.services.debug.clone(),
                    notifier: self.notifier.clone(),
                    instance: Arc::as_ptr(&self.notifier) as usize,
                }),
            )
            .map_err(ConnectError::DebugRegister)?;

        Ok(Connection {
            _debug_registration: debug_registration,
            channel,
            grant,
            _page: page,
            frame,
            _cache: cache,
            job,
            _gnttab: gnttab,
            _evtchn: evtchn,
            _store: store,
            _debug: debug,
        })
    }

    /// Write the four discovery keys under the device path, inside the
    /// caller-owned transaction: `page-gref`, `page-ref` (legacy frame
    /// number), `event-channel` and `request-abs-pointer`. The first
    /// failing write aborts the whole transaction.
    pub fn publish_connection_info(
        &self,
        txn: &mut dyn StoreTransaction,
    ) -> Result<(), StoreError> {
        let connection = self
            .connection
            .as_ref()
            .expect("publish on a disconnected engine");
        let path = self.frontend.frontend_path();

        txn.write(
            &path,
            "page-gref",
            &connection.grant.reference().0.to_string(),
        )?;
        // Kept for backends that do not honor grant references.
        txn.write(&path, "page-ref", &connection.frame.0.to_string())?;
        txn.write(
            &path,
            "event-channel",
            &connection.channel.get().port().0.to_string(),
        )?;
        txn.write(
            &path,
            "request-abs-pointer",
            if self.abs_pointer { "1" } else { "0" },
        )?;
        Ok(())
    }

    /// Permit dispatch and schedule one catch-up drain pass for events
    /// that arrived before dispatch was allowed. Requires the engine to be
    /// connected and currently disabled.
    pub fn enable(&mut self) {
        let connection = self
            .connection
            .as_ref()
            .expect("enable on a disconnected engine");
        self.notifier.set_enabled(true);
        debug!("input ring enabled");

        let job: Arc<dyn DeferredJob> = connection.job.clone();
        self.notifier.schedule(&*self.services.queue, &job);
    }

    /// Stop scheduling new drain passes. An already-queued or in-flight
    /// pass still runs to completion and dispatches. Requires the engine
    /// to be currently enabled.
    pub fn disable(&mut self) {
        assert!(
            self.connection.is_some(),
            "disable on a disconnected engine"
        );
        self.notifier.set_enabled(false);
        debug!("input ring disabled");
    }

    /// Explicit local kick from the frontend state machine (e.g. after
    /// resume): schedules a drain pass regardless of the enable gate.
    pub fn notify(&self) {
        if let Some(connection) = &self.connection {
            let job: Arc<dyn DeferredJob> = connection.job.clone();
            self.notifier.schedule(&*self.services.queue, &job);
        }
    }

    /// Release everything `connect` provisioned, in strict reverse order
    /// of acquisition, and zero the signal counter. Individual release
    /// results are advisory; disconnect itself always succeeds. Calling it
    /// on a disconnected engine is a contract violation.
    pub fn disconnect(&mut self) {
        let connection = self
            .connection
            .take()
            .expect("disconnect on a disconnected engine");
        drop(connection);
        self.notifier.reset_signals();
        debug!("input ring disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_enabled()
    }

    /// Whether the backend advertised (and we requested) absolute pointer
    /// coordinates. Valid after `connect`.
    pub fn abs_pointer(&self) -> bool {
        self.abs_pointer
    }

    pub fn counters(&self) -> RingCounters {
        RingCounters {
            signals: self.notifier.signals(),
            drains_scheduled: self.notifier.drains_scheduled(),
        }
    }
}

impl Drop for RingEngine {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(
                self.connection.is_none(),
                "ring engine dropped while connected"
            );
        }
    }
}

/// One drain pass: consume every visible record, then re-check the
/// producer cursor before leaving.
///
/// Unmasking happens only after this returns, so the outer loop's final
/// empty re-read closes the missed-wakeup race against records produced
/// during dispatch. The consumer cursor becomes visible to the producer
/// once per inner pass, not per record.
fn drain(page: &SharedPage, sink: &dyn EventSink) {
    loop {
        let mut in_cons = page.consumer_cursor();
        let in_prod = page.producer_cursor();

        if in_cons == in_prod {
            break;
        }

        while in_cons != in_prod {
            let event = InputEvent::decode(page.read_slot(in_cons));
            in_cons = in_cons.wrapping_add(1);
            dispatch(sink, event);
        }

        page.advance_consumer(in_cons);
    }
}

/// Dispatch never blocks and never fails; a malformed tag lands in the
/// `Unknown` arm rather than aborting the drain.
fn dispatch(sink: &dyn EventSink, event: InputEvent) {
    match event {
        InputEvent::Motion {
            rel_x,
            rel_y,
            rel_z,
        } => sink.motion(rel_x, rel_y, rel_z),
        InputEvent::Key { keycode, pressed } => sink.key(keycode, pressed),
        InputEvent::Position {
            abs_x,
            abs_y,
            rel_z,
        } => sink.position(abs_x, abs_y, rel_z),
        InputEvent::MultiTouch {
            event_type,
            contact_id,
            abs_x,
            abs_y,
        } => {
            // Reserved: observed but not yet forwarded to the sink.
            trace!(event_type, contact_id, abs_x, abs_y, "multi-touch event");
        }
        InputEvent::Unknown { tag } => {
            trace!(tag, "dropping event with unknown tag");
        }
    }
}

fn read_feature_flag(store: &dyn ConfigStore, path: &str, key: &str) -> bool {
    match store.read(path, key) {
        Ok(value) => parse_feature_flag(&value),
        Err(_) => false,
    }
}

/// Feature flags are base-2 integer strings; anything unparseable reads
/// as false.
fn parse_feature_flag(value: &str) -> bool {
    u32::from_str_radix(value.trim(), 2)
        .map(|v| v != 0)
        .unwrap_or(false)
}

/// The page is heap-backed in this realization; the legacy `page-ref` key
/// publishes its virtual frame.
fn page_frame(page: &Arc<SharedPage>) -> FrameNumber {
    FrameNumber((Arc::as_ptr(page) as usize as u64) >> 12)
}
