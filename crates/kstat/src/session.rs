//! Kstat sessions: ownership of the native context and the handle cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::backend::{Backend, KstatId};
use crate::error::KstatError;
use crate::kstat::Kstat;
use crate::named::Named;
use crate::raw::RawLayout;
use crate::types::{Mntinfo, Sysinfo, Var, Vminfo};

/// Cache key: `(module, instance, name)` as reported by the kernel.
type KstatKey = (String, i32, String);

/// State shared between a session and the handles it hands out.
///
/// Handles only hold a `Weak` reference; the session is the sole owner.
pub(crate) struct Shared<B: Backend> {
    /// `None` once the session is closed.
    pub(crate) backend: RefCell<Option<B>>,
    cache: RefCell<HashMap<KstatKey, Rc<Kstat<B>>>>,
}

/// An open kstat context (`kstat_ctl_t`).
///
/// A session owns its backend and every [`Kstat`] it hands out. Closing it,
/// explicitly with [`close`](Self::close) or by dropping it, invalidates all
/// of those handles at once.
///
/// Sessions are single threaded; the underlying library is not safe to
/// use concurrently.
///
/// ```
/// use kstat::{MockBackend, Session};
///
/// let session = Session::with_backend(MockBackend::typical_system());
/// let sys = session.lookup("cpu", Some(0), "sys").unwrap();
/// let syscall = sys.get_named("syscall").unwrap();
/// assert!(syscall.uint_val() > 0);
/// session.close().unwrap();
/// ```
pub struct Session<B: Backend> {
    shared: Rc<Shared<B>>,
}

impl<B: Backend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Session<B> {
    /// Opens a new context (`kstat_open`).
    pub fn open() -> Result<Self, KstatError> {
        let backend = B::open()?;
        Ok(Self::with_backend(backend))
    }

    /// Wraps an already opened backend.
    pub fn with_backend(backend: B) -> Self {
        debug!("kstat session opened");
        Self {
            shared: Rc::new(Shared {
                backend: RefCell::new(Some(backend)),
                cache: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.backend.borrow().is_some()
    }

    /// Closes the context (`kstat_close`).
    ///
    /// Every kstat obtained from this session becomes permanently invalid,
    /// even if the native close reports an error. Closing an already
    /// closed session does nothing.
    pub fn close(&self) -> Result<(), KstatError> {
        let Some(mut backend) = self.shared.backend.borrow_mut().take() else {
            return Ok(());
        };

        let handles: Vec<Rc<Kstat<B>>> = self
            .shared
            .cache
            .borrow_mut()
            .drain()
            .map(|(_, ks)| ks)
            .collect();
        for ks in &handles {
            ks.invalidate();
        }

        backend.close()?;
        debug!(invalidated = handles.len(), "kstat session closed");
        Ok(())
    }

    /// Returns every kstat known to the session, in chain order.
    ///
    /// Kstats are not read. A closed session yields an empty list. Kstats
    /// created after the session was opened are not picked up.
    pub fn all(&self) -> Vec<Rc<Kstat<B>>> {
        let guard = self.shared.backend.borrow();
        let Some(backend) = guard.as_ref() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut cursor = backend.first();
        while let Some(id) = cursor {
            out.push(self.handle_for(backend, id).0);
            cursor = backend.next(id);
        }
        out
    }

    /// Looks up a kstat and reads its data (`kstat_lookup` + `kstat_read`).
    ///
    /// An empty `module` or `name`, or an instance of `None` or below zero,
    /// matches the first kstat found. If the read fails the lookup fails as
    /// well.
    pub fn lookup(
        &self,
        module: &str,
        instance: Option<i32>,
        name: &str,
    ) -> Result<Rc<Kstat<B>>, KstatError> {
        // kstat_lookup treats -1 (and any negative instance) as a wildcard
        let instance = instance.filter(|i| *i >= 0);
        let (ks, created) = {
            let guard = self.shared.backend.borrow();
            let backend = guard.as_ref().ok_or(KstatError::InvalidHandle)?;
            let id = backend
                .lookup(non_empty(module), instance, non_empty(name))
                .ok_or_else(|| {
                    KstatError::NotFound(format!(
                        "kstat {}:{}:{}",
                        module,
                        instance.map_or_else(|| "*".to_string(), |i| i.to_string()),
                        name
                    ))
                })?;
            self.handle_for(backend, id)
        };

        if let Err(e) = ks.refresh() {
            if created {
                self.shared.cache.borrow_mut().remove(&ks.key());
            }
            return Err(e);
        }
        Ok(ks)
    }

    /// Shorthand for [`lookup`](Self::lookup) then [`Kstat::get_named`].
    ///
    /// Because the lookup always reads, this returns the latest value.
    pub fn get_named(
        &self,
        module: &str,
        instance: Option<i32>,
        name: &str,
        stat: &str,
    ) -> Result<Named<B>, KstatError> {
        self.lookup(module, instance, name)?.get_named(stat)
    }

    /// Reads `unix:0:sysinfo`.
    pub fn sysinfo(&self) -> Result<(Rc<Kstat<B>>, Sysinfo), KstatError> {
        self.fixed("unix", Some(0), "sysinfo")
    }

    /// Reads `unix:0:vminfo`.
    pub fn vminfo(&self) -> Result<(Rc<Kstat<B>>, Vminfo), KstatError> {
        self.fixed("unix", Some(0), "vminfo")
    }

    /// Reads `unix:0:var`.
    pub fn var(&self) -> Result<(Rc<Kstat<B>>, Var), KstatError> {
        self.fixed("unix", Some(0), "var")
    }

    /// Reads the first `nfs:*:mntinfo`.
    pub fn mntinfo(&self) -> Result<(Rc<Kstat<B>>, Mntinfo), KstatError> {
        self.fixed("nfs", None, "mntinfo")
    }

    fn fixed<T: RawLayout + Default>(
        &self,
        module: &str,
        instance: Option<i32>,
        name: &str,
    ) -> Result<(Rc<Kstat<B>>, T), KstatError> {
        let ks = self.lookup(module, instance, name)?;
        let mut out = T::default();
        ks.copy_to(&mut out)?;
        Ok((ks, out))
    }

    /// Returns the cached handle for `id`, creating it if needed.
    fn handle_for(&self, backend: &B, id: KstatId) -> (Rc<Kstat<B>>, bool) {
        let header = backend.header(id);
        let key = (header.module.clone(), header.instance, header.name.clone());

        let mut cache = self.shared.cache.borrow_mut();
        if let Some(ks) = cache.get(&key) {
            return (Rc::clone(ks), false);
        }

        let ks = Rc::new(Kstat::new(header, id, Rc::downgrade(&self.shared)));
        cache.insert(key, Rc::clone(&ks));
        (ks, true)
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "closing kstat session on drop failed");
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::backend::mock::MockNamed;
    use crate::error::NativeError;
    use crate::kstat::{KstatKind, RawKind};
    use crate::named::{DataType, NamedValue};
    use crate::raw::RawLayout;
    use crate::types::Io;

    fn start() -> Session<MockBackend> {
        Session::with_backend(MockBackend::typical_system())
    }

    #[test]
    fn test_open_close() {
        let session = start();
        assert!(session.is_open());
        session.close().unwrap();
        assert!(!session.is_open());
        // second close is a no-op
        session.close().unwrap();
    }

    #[test]
    fn test_open_via_backend() {
        let session = Session::<MockBackend>::open().unwrap();
        assert!(!session.all().is_empty());
    }

    #[test]
    fn test_open_failure() {
        MockBackend::fail_next_open(libc::EACCES);
        let err = Session::<MockBackend>::open().unwrap_err();
        assert_eq!(err, KstatError::Native(NativeError::new("kstat_open", libc::EACCES)));
    }

    #[test]
    fn test_lookup_named() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        assert_eq!(ks.module(), "cpu");
        assert_eq!(ks.name(), "sys");
        assert_eq!(ks.instance(), 0);
        assert_eq!(ks.class(), "misc");
        assert_eq!(ks.kind(), KstatKind::Named);

        let n = ks.get_named("syscall").unwrap();
        assert_eq!(n.data_type, DataType::UINT64);
        assert!(n.uint_val() > 0);
        assert_eq!(n.string_val(), "");
        assert_eq!(n.int_val(), 0);
        assert_eq!(n.name, "syscall");
        assert_eq!(n.to_string(), "cpu:0:sys:syscall");

        let n1 = session.get_named("cpu", None, "sys", "syscall").unwrap();
        assert_eq!(n1.data_type, n.data_type);
        assert_eq!(n1.string_val(), n.string_val());
        assert_eq!(n1.int_val(), n.int_val());
    }

    #[test]
    fn test_lookup_sets_snaptime() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        assert!(ks.snaptime() > 0);
    }

    #[test]
    fn test_same_kstat_across_lookups() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        let k2 = session.lookup("cpu", Some(0), "sys").unwrap();
        assert!(Rc::ptr_eq(&ks, &k2));

        let n = session.get_named("cpu", None, "sys", "syscall").unwrap();
        assert!(Rc::ptr_eq(&ks, &n.kstat));
        let n2 = session.get_named("", None, "sys", "syscall").unwrap();
        assert!(Rc::ptr_eq(&ks, &n2.kstat));

        let listed = session
            .all()
            .into_iter()
            .find(|k| k.module() == "cpu" && k.name() == "sys")
            .unwrap();
        assert!(Rc::ptr_eq(&ks, &listed));
    }

    #[test]
    fn test_refresh_advances_values() {
        let session = start();
        let ks = session.lookup("unix", None, "system_misc").unwrap();
        let n = ks.get_named("clk_intr").unwrap();
        assert_eq!(n.data_type, DataType::UINT32);
        let osnap = ks.snaptime();

        ks.refresh().unwrap();
        assert!(ks.snaptime() > osnap);

        let n2 = ks.get_named("clk_intr").unwrap();
        assert_ne!(n2.uint_val(), n.uint_val());
        assert_eq!(n2.snaptime, ks.snaptime());
    }

    #[test]
    fn test_get_named_does_not_refresh_loaded_data() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        let osnap = ks.snaptime();

        let n = ks.get_named("syscall").unwrap();
        assert_eq!(ks.snaptime(), osnap);
        assert_eq!(n.snaptime, osnap);
        let n2 = ks.get_named("sysread").unwrap();
        assert_eq!(n2.snaptime, n.snaptime);
        let again = ks.get_named("syscall").unwrap();
        assert_eq!(again.uint_val(), n.uint_val());

        // the direct path always reads
        let direct = session.get_named("cpu", None, "sys", "syscall").unwrap();
        assert!(direct.snaptime > osnap);
        assert_ne!(direct.uint_val(), n.uint_val());
    }

    #[test]
    fn test_get_named_loads_unread_kstat() {
        let session = start();
        let ks = session
            .all()
            .into_iter()
            .find(|k| k.module() == "cpu_info")
            .unwrap();
        assert_eq!(ks.snaptime(), 0);
        let n = ks.get_named("state").unwrap();
        assert!(ks.snaptime() > 0);
        assert_eq!(n.snaptime, ks.snaptime());
    }

    #[test]
    fn test_snaptime_never_decreases() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        let mut last = ks.snaptime();
        for _ in 0..5 {
            ks.refresh().unwrap();
            assert!(ks.snaptime() >= last);
            last = ks.snaptime();
        }
    }

    #[test]
    fn test_post_close() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        let io = session.lookup("sd", Some(0), "sd0").unwrap();
        session.close().unwrap();

        assert_eq!(
            session.lookup("cpu", None, "sys").unwrap_err(),
            KstatError::InvalidHandle
        );
        assert!(session.all().is_empty());
        assert!(!ks.is_valid());
        assert_eq!(ks.refresh().unwrap_err(), KstatError::InvalidHandle);
        assert_eq!(ks.get_named("trap").unwrap_err(), KstatError::InvalidHandle);
        assert_eq!(ks.all_named().unwrap_err(), KstatError::InvalidHandle);
        assert_eq!(ks.raw().unwrap_err(), KstatError::InvalidHandle);
        assert_eq!(io.get_io().unwrap_err(), KstatError::InvalidHandle);
        let mut dest = Io::default();
        assert_eq!(io.copy_to(&mut dest).unwrap_err(), KstatError::InvalidHandle);
        assert_eq!(
            session.get_named("cpu", None, "sys", "syscall").unwrap_err(),
            KstatError::InvalidHandle
        );

        // identity fields remain readable
        assert_eq!(ks.to_string(), "cpu:0:sys (misc)");
        session.close().unwrap();
    }

    #[test]
    fn test_handles_invalid_after_drop() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        drop(session);
        assert!(!ks.is_valid());
        assert_eq!(ks.refresh().unwrap_err(), KstatError::InvalidHandle);
    }

    #[test]
    fn test_all_and_all_named() {
        let session = start();
        let all = session.all();
        assert!(!all.is_empty());
        assert_eq!(all.len(), session.all().len());

        let ks = session.lookup("cpu", None, "sys").unwrap();
        let named = ks.all_named().unwrap();
        assert!(named.len() > 1);
        assert!(named.iter().any(|n| n.name == "syscall"));
    }

    #[test]
    fn test_not_named() {
        let session = start();
        let ks = session.lookup("unix", None, "vminfo").unwrap();
        assert_eq!(ks.kind(), KstatKind::Raw(RawKind::Vminfo));

        // kstat(1) shows this as a field, but it is a struct member
        let err = ks.get_named("swap_alloc").unwrap_err();
        assert!(matches!(err, KstatError::WrongType { expected: "named", .. }));
        assert!(matches!(ks.all_named().unwrap_err(), KstatError::WrongType { .. }));

        let io = session.lookup("sd", Some(0), "sd0").unwrap();
        assert_eq!(io.kind(), KstatKind::Io);
        assert!(matches!(io.get_named("reads").unwrap_err(), KstatError::WrongType { .. }));

        let sys = session.lookup("cpu", None, "sys").unwrap();
        assert!(matches!(sys.get_io().unwrap_err(), KstatError::WrongType { .. }));
    }

    #[test]
    fn test_no_such() {
        let session = start();
        let ks = session.lookup("cpu", None, "sys").unwrap();
        assert!(matches!(
            ks.get_named("nosuch").unwrap_err(),
            KstatError::NotFound(_)
        ));
        assert!(matches!(
            session.lookup("nosuch", None, "nosuch").unwrap_err(),
            KstatError::NotFound(_)
        ));
    }

    #[test]
    fn test_wildcard_lookups() {
        let session = start();

        let res = session.lookup("", None, "sys").unwrap();
        assert_eq!(res.module(), "cpu");
        assert_eq!(res.instance(), 0);

        let res = session.lookup("acpi", None, "").unwrap();
        assert_eq!(res.name(), "acpi");
        assert_eq!(res.instance(), 0);

        let res = session.lookup("cpu", Some(1), "sys").unwrap();
        assert_eq!(res.instance(), 1);
    }

    #[test]
    fn test_negative_instance_is_wildcard() {
        let session = start();
        let ks = session.lookup("cpu", Some(-1), "sys").unwrap();
        assert_eq!(ks.instance(), 0);
        let k2 = session.lookup("cpu", None, "sys").unwrap();
        assert!(Rc::ptr_eq(&ks, &k2));

        let n = session.get_named("cpu_info", Some(-1), "", "state").unwrap();
        assert_eq!(n.kstat.instance(), 0);
    }

    #[test]
    fn test_named_string_with_invalid_utf8() {
        let mut backend = MockBackend::new();
        let mut value = [0u8; 16];
        value[..3].copy_from_slice(b"\xffok");
        backend.add_named(
            "test",
            0,
            "raw_chars",
            "misc",
            vec![MockNamed::with_tag("label", DataType::CHAR.0, value)],
        );
        let session = Session::with_backend(backend);

        let n = session.get_named("test", Some(0), "raw_chars", "label").unwrap();
        assert_eq!(n.value, NamedValue::Bytes(b"\xffok".to_vec()));
        assert_eq!(n.bytes_val(), b"\xffok");
        assert_eq!(n.string_val(), "\u{fffd}ok");
    }

    #[test]
    fn test_named_types() {
        let session = start();

        let n = session.get_named("cpu_info", None, "cpu_info0", "state").unwrap();
        assert_eq!(n.data_type, DataType::CHAR);
        assert_eq!(n.value, NamedValue::String("on-line".into()));

        let n = session.get_named("cpu_info", None, "cpu_info0", "brand").unwrap();
        assert_eq!(n.data_type, DataType::STRING);
        assert!(!n.string_val().is_empty());
        assert_eq!(n.uint_val(), 0);

        let n = session.get_named("cpu_info", None, "cpu_info0", "family").unwrap();
        assert_eq!(n.data_type, DataType::INT32);
        assert!(n.int_val() != 0);
        assert_eq!(n.string_val(), "");

        let n = session
            .get_named("cpu_info", None, "cpu_info0", "clock_MHz")
            .unwrap();
        assert_eq!(n.data_type, DataType::INT64);
        assert!(n.int_val() != 0);
    }

    #[test]
    fn test_lookup_fails_when_read_fails() {
        let mut backend = MockBackend::typical_system();
        backend.fail_reads("sd", 0, "sd0", libc::ENXIO);
        let session = Session::with_backend(backend);

        let err = session.lookup("sd", Some(0), "sd0").unwrap_err();
        assert!(matches!(err, KstatError::Native(ref e) if e.errno == libc::ENXIO));

        // the failed handle was not kept
        let cached = session.shared.cache.borrow();
        assert!(!cached.keys().any(|(m, _, _)| m == "sd"));
    }

    #[test]
    fn test_disk_stats() {
        let session = start();
        let mut found = false;
        for ks in session.all() {
            if ks.kind() != KstatKind::Io {
                continue;
            }
            found = true;
            let io = ks.get_io().unwrap();
            assert!(ks.snaptime() != 0);
            assert!(io.reads > 0 || io.writes > 0);
        }
        assert!(found);

        let ks = session.lookup("sd", None, "sd0").unwrap();
        let io = ks.get_io().unwrap();
        assert!(io.nread > 0 && io.nwritten > 0);
        assert!(io.rlastupdate > 0 && io.rlentime > 0 && io.wtime > 0);
    }

    #[test]
    fn test_get_io_always_refreshes() {
        let session = start();
        let ks = session.lookup("sd", Some(0), "sd0").unwrap();
        let osnap = ks.snaptime();
        let first = ks.get_io().unwrap();
        assert_ne!(ks.snaptime(), osnap);
        let snap = ks.snaptime();
        let second = ks.get_io().unwrap();
        assert_ne!(ks.snaptime(), snap);
        assert!(second.reads > first.reads);
    }

    #[test]
    fn test_raw() {
        let session = start();
        let ks = session.lookup("sd", Some(0), "sd0").unwrap();
        let osnap = ks.snaptime();
        let r = ks.raw().unwrap();
        assert_eq!(r.snaptime, osnap);
        assert_eq!(ks.snaptime(), osnap);
        assert_eq!(r.len(), std::mem::size_of::<Io>());
        assert_eq!(r.ndata, 1);

        let ks = session.lookup("cpu", None, "sys").unwrap();
        let r = ks.raw().unwrap();
        assert!(r.ndata > 1);
        assert_eq!(r.len() as u64, r.ndata * crate::backend::KSTAT_NAMED_SIZE as u64);

        let ks = session.lookup("unix", None, "sysinfo").unwrap();
        let r = ks.raw().unwrap();
        let size = std::mem::size_of::<Sysinfo>();
        assert_eq!(r.len(), size);
        assert_eq!(r.ndata, size as u64);

        session.close().unwrap();
        assert_eq!(ks.raw().unwrap_err(), KstatError::InvalidHandle);
    }

    #[test]
    fn test_unix_stats() {
        let session = start();

        let (ks, si) = session.sysinfo().unwrap();
        assert_eq!((ks.module(), ks.instance(), ks.name()), ("unix", 0, "sysinfo"));
        assert!(si.updates > 0);

        let (ks, vmi) = session.vminfo().unwrap();
        assert_eq!((ks.module(), ks.instance(), ks.name()), ("unix", 0, "vminfo"));
        assert!(vmi.updates > 0);

        let (ks, var) = session.var().unwrap();
        assert_eq!((ks.module(), ks.instance(), ks.name()), ("unix", 0, "var"));
        assert!(var.proc > 0);
    }

    /// Six u32s like `Sysinfo`, arranged through nested structs and arrays.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    struct SysinfoAlt {
        updates: u32,
        runs: Runs,
        swps: [u32; 2],
        waiting: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    struct Runs {
        runque: u32,
        runocc: u32,
    }

    unsafe impl RawLayout for SysinfoAlt {}

    #[test]
    fn test_copy_to() {
        let session = start();
        let (ks, var) = session.var().unwrap();
        let mut r = Var::default();
        ks.copy_to(&mut r).unwrap();
        assert_eq!(r, var);

        let (ks, si) = session.sysinfo().unwrap();
        let mut f = SysinfoAlt::default();
        ks.copy_to(&mut f).unwrap();
        assert_eq!(si.updates, f.updates);
        assert_eq!(si.runque, f.runs.runque);
        assert_eq!(si.runocc, f.runs.runocc);
        assert_eq!([si.swpque, si.swpocc], f.swps);
        assert_eq!(si.waiting, f.waiting);

        session.close().unwrap();
        assert_eq!(ks.copy_to(&mut f).unwrap_err(), KstatError::InvalidHandle);
    }

    #[test]
    fn test_copy_to_size_mismatch() {
        let session = start();
        let (ks, _) = session.sysinfo().unwrap();

        let mut small = [0u32; 5];
        assert_eq!(
            ks.copy_to(&mut small).unwrap_err(),
            KstatError::SizeMismatch { expected: 24, actual: 20 }
        );
        let mut large = [0u32; 7];
        assert_eq!(
            ks.copy_to(&mut large).unwrap_err(),
            KstatError::SizeMismatch { expected: 24, actual: 28 }
        );
        assert_eq!(small, [0; 5]);
    }

    #[test]
    fn test_mntinfo() {
        let session = start();
        let ks = session.lookup("nfs", None, "mntinfo").unwrap();
        let osnap = ks.snaptime();
        let mi = ks.mntinfo().unwrap();
        assert!(!mi.proto().is_empty());
        assert!(!mi.curserver().is_empty());
        assert!(mi.vers == 3 || mi.vers == 4);
        assert_eq!(ks.snaptime(), osnap);

        let (k2, mi2) = session.mntinfo().unwrap();
        assert!(Rc::ptr_eq(&ks, &k2));
        assert_eq!(mi2.proto(), mi.proto());

        session.close().unwrap();
        assert_eq!(ks.mntinfo().unwrap_err(), KstatError::InvalidHandle);
    }

    #[test]
    fn test_mntinfo_errors() {
        let session = start();
        let ks = session.lookup("unix", None, "sysinfo").unwrap();
        assert!(matches!(ks.mntinfo().unwrap_err(), KstatError::WrongType { .. }));
        let ks = session.lookup("sd", None, "sd0").unwrap();
        assert!(matches!(ks.mntinfo().unwrap_err(), KstatError::WrongType { .. }));
    }

    #[test]
    fn test_mntinfo_missing() {
        let session = Session::with_backend(MockBackend::minimal_system());
        assert!(matches!(
            session.mntinfo().unwrap_err(),
            KstatError::NotFound(_)
        ));
    }

    #[test]
    fn test_unsupported_kind_only_allows_raw() {
        let session = start();
        let ks = session.lookup("ata", None, "ata0").unwrap();
        assert_eq!(ks.kind(), KstatKind::Unsupported(crate::backend::KSTAT_TYPE_INTR));
        assert_eq!(ks.kind().to_string(), "intr");
        assert!(matches!(ks.get_io().unwrap_err(), KstatError::WrongType { .. }));
        assert!(!ks.raw().unwrap().is_empty());
    }

    #[test]
    fn test_close_failure_still_invalidates() {
        let mut backend = MockBackend::typical_system();
        backend.fail_close(libc::EBADF);
        let session = Session::with_backend(backend);
        let ks = session.lookup("cpu", None, "sys").unwrap();

        let err = session.close().unwrap_err();
        assert!(matches!(err, KstatError::Native(ref e) if e.op == "kstat_close"));
        assert!(!ks.is_valid());
        assert_eq!(ks.refresh().unwrap_err(), KstatError::InvalidHandle);
        session.close().unwrap();
    }
}
