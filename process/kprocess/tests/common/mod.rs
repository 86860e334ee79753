//! Host stand-ins for the scheduler, MMU, VFS and trap frame.

#![allow(dead_code)]

use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicIsize, AtomicU32, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
};

use kerrno::{KError, KResult};
use kprocess::{
    ExecImage, Process, ProcessConfig, ProcessTable, ProcessThread, ThreadBinding, Tid, attach,
    kernel::{
        AddrSpace, ProgramLoader, Scheduler, ThreadEntry, TrapFrame, Vnode, VnodeRef,
    },
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A thread control block.
pub struct MockThread {
    tid: Tid,
    binding: ThreadBinding,
}

impl MockThread {
    pub fn new(tid: Tid) -> Arc<Self> {
        Arc::new(Self {
            tid,
            binding: ThreadBinding::new(),
        })
    }
}

impl ProcessThread for MockThread {
    fn tid(&self) -> Tid {
        self.tid
    }

    fn binding(&self) -> &ThreadBinding {
        &self.binding
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<MockThread>>> = const { RefCell::new(None) };
}

/// The mock thread the calling host thread is running as.
pub fn current_thread() -> Arc<MockThread> {
    CURRENT.with(|c| c.borrow().clone()).expect("not running on a forked thread")
}

/// The process of the calling forked thread.
pub fn current_process() -> Arc<Process> {
    current_thread().process().expect("current thread has no process")
}

/// Unwinding payload used to leave a thread through `thread_exit`.
struct ThreadExit;

/// Runs every forked thread on its own host thread.
pub struct MockScheduler {
    next_tid: AtomicU32,
    fail_fork: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MockScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_tid: AtomicU32::new(1000),
            fail_fork: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn new_thread(&self) -> Arc<MockThread> {
        MockThread::new(self.next_tid.fetch_add(1, Ordering::Relaxed))
    }

    pub fn set_fail_fork(&self, fail: bool) {
        self.fail_fork.store(fail, Ordering::SeqCst);
    }

    /// Joins every forked thread, including threads forked while joining.
    pub fn join_all(&self) {
        loop {
            let handle = self.handles.lock().unwrap().pop();
            match handle {
                Some(handle) => handle.join().expect("forked thread panicked"),
                None => break,
            }
        }
    }
}

impl Scheduler for MockScheduler {
    fn thread_fork(&self, name: &str, proc: &Arc<Process>, entry: ThreadEntry) -> KResult {
        if self.fail_fork.load(Ordering::SeqCst) {
            return Err(KError::NoMemory);
        }
        let thread = self.new_thread();
        attach(proc, &*thread)?;

        let spawned = std::thread::Builder::new()
            .name(format!("{name}-{}", thread.tid()))
            .spawn({
                let thread = thread.clone();
                move || {
                    CURRENT.with(|c| *c.borrow_mut() = Some(thread));
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
                        if !payload.is::<ThreadExit>() {
                            panic::resume_unwind(payload);
                        }
                    }
                    CURRENT.with(|c| c.borrow_mut().take());
                }
            });
        match spawned {
            Ok(handle) => {
                self.handles.lock().unwrap().push(handle);
                Ok(())
            }
            Err(_) => {
                kprocess::detach(&*thread);
                Err(KError::NoMemory)
            }
        }
    }

    fn block_on(&self, fut: std::pin::Pin<&mut (dyn Future<Output = ()> + Send + '_)>) {
        futures::executor::block_on(fut)
    }

    fn thread_exit(&self) -> ! {
        panic::resume_unwind(Box::new(ThreadExit))
    }
}

type DestroyHook = Arc<dyn Fn() + Send + Sync>;

/// Tracks address spaces: how many exist and which one is loaded.
#[derive(Default)]
pub struct MockMmu {
    next_id: AtomicUsize,
    live: AtomicUsize,
    active: AtomicUsize,
    fail_duplicate: AtomicBool,
    on_destroy: Mutex<Option<DestroyHook>>,
}

impl MockMmu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(1),
            ..Default::default()
        })
    }

    pub fn new_space(self: &Arc<Self>) -> Box<dyn AddrSpace> {
        Box::new(self.new_mock_space())
    }

    fn new_mock_space(self: &Arc<Self>) -> MockAddrSpace {
        self.live.fetch_add(1, Ordering::SeqCst);
        MockAddrSpace {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            mmu: self.clone(),
        }
    }

    /// Address spaces created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Id of the loaded address space, 0 if none.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_fail_duplicate(&self, fail: bool) {
        self.fail_duplicate.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` whenever an address space is destroyed.
    pub fn on_destroy(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_destroy.lock().unwrap() = Some(Arc::new(hook));
    }
}

pub struct MockAddrSpace {
    id: usize,
    mmu: Arc<MockMmu>,
}

impl AddrSpace for MockAddrSpace {
    fn duplicate(&self) -> KResult<Box<dyn AddrSpace>> {
        if self.mmu.fail_duplicate.load(Ordering::SeqCst) {
            return Err(KError::NoMemory);
        }
        Ok(self.mmu.new_space())
    }

    fn activate(&self) {
        self.mmu.active.store(self.id, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        let _ = self
            .mmu
            .active
            .compare_exchange(self.id, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.mmu.active() == self.id
    }
}

impl Drop for MockAddrSpace {
    fn drop(&mut self) {
        let hook = self.mmu.on_destroy.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.mmu.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A directory vnode with a visible reference count.
pub struct MockVnode {
    refs: AtomicIsize,
}

impl MockVnode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refs: AtomicIsize::new(0),
        })
    }

    /// Opens the node, taking one reference.
    pub fn open(self: &Arc<Self>) -> VnodeRef {
        self.incref();
        VnodeRef::adopt(self.clone())
    }

    pub fn refs(&self) -> isize {
        self.refs.load(Ordering::SeqCst)
    }
}

impl Vnode for MockVnode {
    fn incref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn decref(&self) {
        let prev = self.refs.fetch_sub(1, Ordering::SeqCst);
        assert!(prev > 0, "vnode reference count underflow");
    }
}

/// A trap frame whose "user program" is a host closure run in the child.
#[derive(Clone)]
pub struct MockFrame {
    program: Arc<dyn Fn() + Send + Sync>,
}

impl MockFrame {
    pub fn new(program: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            program: Arc::new(program),
        }
    }

    /// A child that exits right away with `code`.
    pub fn exit_with(table: &Arc<ProcessTable>, code: i32) -> Self {
        let table = table.clone();
        Self::new(move || {
            let thread = current_thread();
            let proc = current_process();
            table.exit(&proc, &*thread, kprocess::WaitStatus::exited(code));
        })
    }
}

impl TrapFrame for MockFrame {
    fn snapshot(&self) -> Box<dyn TrapFrame> {
        Box::new(self.clone())
    }

    fn enter_forked(self: Box<Self>) {
        (self.program)()
    }
}

/// Loads nothing; fails on demand.
pub struct MockLoader {
    pub mmu: Arc<MockMmu>,
    pub fail_load: bool,
}

impl ProgramLoader for MockLoader {
    fn create_aspace(&self) -> KResult<Box<dyn AddrSpace>> {
        Ok(self.mmu.new_space())
    }

    fn load(&self, path: &str, argv: &[&str], aspace: &dyn AddrSpace) -> KResult<ExecImage> {
        assert!(aspace.is_active(), "program loaded into an inactive address space");
        if self.fail_load || path == "/missing" {
            return Err(KError::NotFound);
        }
        Ok(ExecImage {
            entry: 0x40_0000,
            stack_ptr: 0x7fff_f000,
            argc: argv.len(),
            argv_ptr: 0x7fff_f000,
        })
    }
}

/// A booted process table plus its collaborators.
pub struct TestKernel {
    pub table: Arc<ProcessTable>,
    pub sched: Arc<MockScheduler>,
    pub mmu: Arc<MockMmu>,
    pub root_dir: Arc<MockVnode>,
}

impl TestKernel {
    pub fn boot() -> Self {
        Self::boot_with(ProcessConfig::default())
    }

    pub fn boot_with(config: ProcessConfig) -> Self {
        init_logger();
        let sched = MockScheduler::new();
        let table = ProcessTable::bootstrap(config, sched.clone());
        let root_dir = MockVnode::new();
        table.kernel_process().set_cwd(Some(root_dir.open()));
        Self {
            table,
            sched,
            mmu: MockMmu::new(),
            root_dir,
        }
    }

    /// Starts a user process under `parent`, with an address space and a
    /// thread that the test itself plays.
    pub fn spawn_user(&self, parent: &Arc<Process>, name: &str) -> (Arc<Process>, Arc<MockThread>) {
        let proc = self
            .table
            .create_for_program(parent, name)
            .expect("create_for_program failed");
        proc.set_aspace(Some(self.mmu.new_space()));
        let thread = self.sched.new_thread();
        attach(&proc, &*thread).expect("attach failed");
        (proc, thread)
    }

    /// `init` (pid 1) under the kernel process and `root` (pid 2) under init.
    pub fn spawn_tree(&self) -> UserTree {
        let (init, init_thread) = self.spawn_user(self.table.kernel_process(), "init");
        let (root, root_thread) = self.spawn_user(&init, "root");
        assert_eq!(init.pid(), 1);
        assert_eq!(root.pid(), 2);
        UserTree {
            init,
            init_thread,
            root,
            root_thread,
        }
    }

    /// Blocks on `waitpid` from `parent` for `pid`.
    pub fn wait(&self, parent: &Process, pid: u32) -> KResult<kprocess::WaitStatus> {
        futures::executor::block_on(self.table.waitpid(parent, pid))
    }
}

pub struct UserTree {
    pub init: Arc<Process>,
    pub init_thread: Arc<MockThread>,
    pub root: Arc<Process>,
    pub root_thread: Arc<MockThread>,
}
