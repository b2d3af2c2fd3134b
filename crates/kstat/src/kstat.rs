//! Handles for individual kstats (`module:instance:name` collections).

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::backend::{
    Backend, KSTAT_TYPE_INTR, KSTAT_TYPE_IO, KSTAT_TYPE_NAMED, KSTAT_TYPE_RAW, KSTAT_TYPE_TIMER,
    KstatHeader, KstatId,
};
use crate::error::KstatError;
use crate::named::Named;
use crate::raw::{RawBlob, RawLayout, copy_into, read_layout};
use crate::session::Shared;
use crate::types::{Io, Mntinfo};

/// Raw kstats whose layout is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    /// Opaque bytes with no dedicated decoder.
    Generic,
    /// `unix:*:sysinfo`, see [`Sysinfo`](crate::Sysinfo).
    Sysinfo,
    /// `unix:*:vminfo`, see [`Vminfo`](crate::Vminfo).
    Vminfo,
    /// `unix:*:var`, see [`Var`](crate::Var).
    Var,
    /// `nfs:*:mntinfo`, see [`Mntinfo`].
    Mntinfo,
}

impl RawKind {
    fn classify(module: &str, name: &str) -> RawKind {
        match (module, name) {
            ("unix", "sysinfo") => RawKind::Sysinfo,
            ("unix", "vminfo") => RawKind::Vminfo,
            ("unix", "var") => RawKind::Var,
            ("nfs", "mntinfo") => RawKind::Mntinfo,
            _ => RawKind::Generic,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RawKind::Generic => "raw",
            RawKind::Sysinfo => "raw(sysinfo)",
            RawKind::Vminfo => "raw(vminfo)",
            RawKind::Var => "raw(var)",
            RawKind::Mntinfo => "raw(mntinfo)",
        }
    }
}

/// What kind of data a kstat holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KstatKind {
    /// A list of named statistics.
    Named,
    /// Disk I/O counters, see [`Io`].
    Io,
    /// Raw bytes, possibly of a known layout.
    Raw(RawKind),
    /// Interrupt, timer or unknown kstats. Only [`Kstat::raw`] applies.
    Unsupported(u8),
}

impl KstatKind {
    pub(crate) fn classify(header: &KstatHeader) -> KstatKind {
        match header.ks_type {
            KSTAT_TYPE_NAMED => KstatKind::Named,
            KSTAT_TYPE_IO => KstatKind::Io,
            KSTAT_TYPE_RAW => KstatKind::Raw(RawKind::classify(&header.module, &header.name)),
            other => KstatKind::Unsupported(other),
        }
    }
}

impl fmt::Display for KstatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KstatKind::Named => f.write_str("named"),
            KstatKind::Io => f.write_str("io"),
            KstatKind::Raw(raw) => f.write_str(raw.label()),
            KstatKind::Unsupported(KSTAT_TYPE_INTR) => f.write_str("intr"),
            KstatKind::Unsupported(KSTAT_TYPE_TIMER) => f.write_str("timer"),
            KstatKind::Unsupported(other) => write!(f, "type-{}", other),
        }
    }
}

/// Access handle for one kstat.
///
/// Handles are created and cached by their [`Session`](crate::Session):
/// looking up the same kstat twice yields the same `Rc`. Once the session
/// is closed every operation on the handle fails with
/// [`KstatError::InvalidHandle`]; the identity fields stay readable.
pub struct Kstat<B: Backend> {
    module: String,
    instance: i32,
    name: String,
    class: String,
    kind: KstatKind,
    crtime: i64,
    snaptime: Cell<i64>,

    id: KstatId,
    session: Weak<Shared<B>>,
    valid: Cell<bool>,
}

impl<B: Backend> Kstat<B> {
    pub(crate) fn new(header: KstatHeader, id: KstatId, session: Weak<Shared<B>>) -> Self {
        let kind = KstatKind::classify(&header);
        Self {
            module: header.module,
            instance: header.instance,
            name: header.name,
            class: header.class,
            kind,
            crtime: header.crtime,
            snaptime: Cell::new(header.snaptime),
            id,
            session,
            valid: Cell::new(true),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn instance(&self) -> i32 {
        self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class label such as `disk`, `net` or `misc`.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn kind(&self) -> KstatKind {
        self.kind
    }

    /// Creation time, nanoseconds since an arbitrary point (see gethrtime(3C)).
    pub fn crtime(&self) -> i64 {
        self.crtime
    }

    /// Time the currently held data was read, on the same clock as
    /// [`crtime`](Self::crtime). Zero until the first read.
    pub fn snaptime(&self) -> i64 {
        self.snaptime.get()
    }

    /// Whether the owning session is still open.
    pub fn is_valid(&self) -> bool {
        self.valid.get() && self.session.strong_count() > 0
    }

    pub(crate) fn key(&self) -> (String, i32, String) {
        (self.module.clone(), self.instance, self.name.clone())
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }

    fn shared(&self) -> Result<Rc<Shared<B>>, KstatError> {
        if !self.valid.get() {
            return Err(KstatError::InvalidHandle);
        }
        self.session.upgrade().ok_or(KstatError::InvalidHandle)
    }

    fn expect_kind(&self, expected: KstatKind, label: &'static str) -> Result<(), KstatError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(KstatError::WrongType {
                kstat: format!("{}:{}:{}", self.module, self.instance, self.name),
                kind: self.kind.to_string(),
                expected: label,
            })
        }
    }

    /// Reads fresh data from the kernel (`kstat_read`).
    ///
    /// The snapshot time is updated to whatever the read reports. Lookups
    /// already refresh, so calling this is only needed to pick up newer
    /// values later on.
    pub fn refresh(&self) -> Result<(), KstatError> {
        let shared = self.shared()?;
        self.refresh_with(&shared)
    }

    fn refresh_with(&self, shared: &Shared<B>) -> Result<(), KstatError> {
        let mut guard = shared.backend.borrow_mut();
        let backend = guard.as_mut().ok_or(KstatError::InvalidHandle)?;
        if let Err(e) = backend.read(self.id) {
            debug!(kstat = %self, error = %e, "kstat read failed");
            return Err(e.into());
        }
        self.snaptime.set(backend.snaptime(self.id));
        Ok(())
    }

    /// Reads data only if none was ever loaded.
    fn ensure_loaded(&self, shared: &Shared<B>) -> Result<(), KstatError> {
        let loaded = {
            let guard = shared.backend.borrow();
            let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
            backend.data(self.id).is_some()
        };
        if !loaded {
            self.refresh_with(shared)?;
        }
        Ok(())
    }

    /// Returns the named statistic `stat` (`kstat_data_lookup`).
    ///
    /// Data is read on the first access only. Later calls decode whatever
    /// the last read returned, so call [`refresh`](Self::refresh) to see
    /// newer values.
    pub fn get_named(self: &Rc<Self>, stat: &str) -> Result<Named<B>, KstatError> {
        let shared = self.shared()?;
        self.expect_kind(KstatKind::Named, "named")?;
        self.ensure_loaded(&shared)?;

        let guard = shared.backend.borrow();
        let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
        let raw = backend.data_lookup(self.id, stat).ok_or_else(|| {
            KstatError::NotFound(format!(
                "{}:{}:{}:{}",
                self.module, self.instance, self.name, stat
            ))
        })?;
        Ok(Named::from_raw(self, &raw, self.snaptime.get()))
    }

    /// Returns every named statistic, in kernel order.
    ///
    /// Follows the same load rule as [`get_named`](Self::get_named).
    pub fn all_named(self: &Rc<Self>) -> Result<Vec<Named<B>>, KstatError> {
        let shared = self.shared()?;
        self.expect_kind(KstatKind::Named, "named")?;
        self.ensure_loaded(&shared)?;

        let guard = shared.backend.borrow();
        let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
        let snaptime = self.snaptime.get();
        Ok(backend
            .named_records(self.id)
            .iter()
            .map(|raw| Named::from_raw(self, raw, snaptime))
            .collect())
    }

    /// Reads fresh disk I/O counters.
    ///
    /// Always refreshes, so the snapshot time moves on every call.
    pub fn get_io(&self) -> Result<Io, KstatError> {
        let shared = self.shared()?;
        self.expect_kind(KstatKind::Io, "io")?;
        self.refresh_with(&shared)?;

        let guard = shared.backend.borrow();
        let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
        let data = backend
            .data(self.id)
            .ok_or_else(|| KstatError::NotFound(format!("data for {}", self)))?;
        read_layout(data.bytes)
    }

    /// Copies out the currently loaded data without refreshing it.
    ///
    /// A kstat that was never read (possible for handles from
    /// [`Session::all`](crate::Session::all)) is read once first.
    pub fn raw(&self) -> Result<RawBlob, KstatError> {
        let shared = self.shared()?;
        self.ensure_loaded(&shared)?;

        let guard = shared.backend.borrow();
        let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
        let data = backend
            .data(self.id)
            .ok_or_else(|| KstatError::NotFound(format!("data for {}", self)))?;
        Ok(RawBlob {
            data: data.bytes.to_vec(),
            ndata: data.ndata,
            snaptime: self.snaptime.get(),
        })
    }

    /// Copies the currently loaded data into `dest`.
    ///
    /// `dest` must be exactly as large as the data; otherwise
    /// [`KstatError::SizeMismatch`] is returned and `dest` is untouched.
    /// Does not refresh, apart from the first-read rule of [`raw`](Self::raw).
    pub fn copy_to<T: RawLayout>(&self, dest: &mut T) -> Result<(), KstatError> {
        let shared = self.shared()?;
        self.ensure_loaded(&shared)?;

        let guard = shared.backend.borrow();
        let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
        let data = backend
            .data(self.id)
            .ok_or_else(|| KstatError::NotFound(format!("data for {}", self)))?;
        copy_into(data.bytes, dest)
    }

    /// Decodes the current data of an `nfs:*:mntinfo` kstat.
    pub fn mntinfo(&self) -> Result<Mntinfo, KstatError> {
        if !self.is_valid() {
            return Err(KstatError::InvalidHandle);
        }
        self.expect_kind(KstatKind::Raw(RawKind::Mntinfo), "mntinfo")?;
        let mut mi = Mntinfo::default();
        self.copy_to(&mut mi)?;
        Ok(mi)
    }
}

impl<B: Backend> fmt::Display for Kstat<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} ({})",
            self.module, self.instance, self.name, self.class
        )
    }
}

impl<B: Backend> fmt::Debug for Kstat<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kstat")
            .field("module", &self.module)
            .field("instance", &self.instance)
            .field("name", &self.name)
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("crtime", &self.crtime)
            .field("snaptime", &self.snaptime.get())
            .field("valid", &self.is_valid())
            .finish()
    }
}
