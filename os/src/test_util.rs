//! 本 crate 测试的机器桥接
//!
//! test-support 的 mock 只持有原始状态；这里为它实现本 crate 和
//! `mm` 的 ops trait（后者经由本地桥接类型，遵守孤儿规则）、
//! 提供一个单线程的测试调度器，并模拟"用户指令"视角的内存访问
//! 和系统调用陷入。
//!
//! # 测试调度器
//!
//! fork 出的线程体要么立刻执行（eager 模式，默认），要么进入
//! 延迟队列由测试泵动（deferred 模式，用于测试"join 先于子进程
//! 退出"的睡眠路径）。线程体结束后切换回进入前的当前进程——
//! 真实机器上这由调度器的上下文切换完成。

use crate::kernel;
use crate::machine::coff::{CoffImage, CoffSectionInfo, ExecOps, SectionFlags};
use crate::machine::console::{ConsoleOps, Stream};
use crate::machine::processor::{ExceptionCause, ProcessorOps, reg};
use crate::machine::thread::{SchedOps, ThreadId};
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use mm::page_table::TranslationEntry;
use mm::{PageNum, Paddr, Ppn, UsizeConvert, Vpn};
use sync::SpinLock;
use test_support::mock::machine::{MOCK_MACHINE, MockMachine, RawTlbEntry};
use test_support::{MOCK_CONSOLE, MOCK_EXEC_FS, MockProgram};

/// mock 机器的页大小
pub(crate) const PAGE_SIZE: usize = test_support::PAGE_SIZE;

// ========== 每个用例的标准开场 ==========

/// 串行化、注册、重置，并以常驻变体初始化内核。
///
/// 需要按需调页时在其后调用 `kernel::init(true)`。
pub(crate) fn setup(num_phys_pages: usize) -> test_support::SerialGuard {
    static REGISTERED: AtomicBool = AtomicBool::new(false);

    let guard = test_support::serial();

    if !REGISTERED.swap(true, Ordering::SeqCst) {
        unsafe {
            sync::register_arch_ops(&MOCK_MACHINE);
            mm::register_machine_ops(&MACHINE_BRIDGE);
            mm::register_config(&CONFIG_BRIDGE);
            crate::machine::register_processor_ops(&MOCK_MACHINE);
            crate::machine::register_console_ops(&CONSOLE_BRIDGE);
            crate::machine::register_sched_ops(&TEST_SCHED);
            crate::machine::register_exec_ops(&EXEC_BRIDGE);
        }
    }

    MOCK_MACHINE.reset(num_phys_pages, test_support::TLB_SIZE);
    MOCK_CONSOLE.reset();
    MOCK_EXEC_FS.clear();
    reset_sched();
    kernel::init(false);

    guard
}

// ========== 用户视角的模拟 ==========

/// 注册下一个被 fork 的用户线程进入 `run()` 时执行的程序体。
pub(crate) fn push_program(body: Box<dyn FnOnce() + Send>) {
    PROGRAMS.lock().push_back(body);
}

/// 在当前线程上模拟一次用户系统调用。
///
/// 把调用号和参数放进寄存器、触发系统调用异常，返回 v0 里的
/// 返回值。`exit` 这类不返回的调用会经由线程结束载荷展开出去。
pub(crate) fn user_syscall(num: u32, a0: u32, a1: u32, a2: u32) -> i32 {
    let ops = crate::machine::processor_ops();
    ops.write_register(reg::V0, num);
    ops.write_register(reg::A0, a0);
    ops.write_register(reg::A1, a1);
    ops.write_register(reg::A2, a2);
    crate::trap::handle_exception(ExceptionCause::Syscall);
    ops.read_register(reg::V0) as i32
}

/// 模拟处理器的 TLB 查找：返回命中的槽位和条目。
pub(crate) fn tlb_lookup(vaddr: u32) -> Option<(usize, TranslationEntry)> {
    let ops = mm::machine_ops();
    let vpn = Vpn(vaddr as usize / PAGE_SIZE);
    (0..ops.tlb_size())
        .map(|slot| (slot, ops.read_tlb_entry(slot)))
        .find(|(_, entry)| entry.valid && entry.vpn == vpn)
}

/// 模拟用户指令读一个字节（按需调页变体）。
///
/// 按处理器的方式先查 TLB；缺失时触发 TLB 缺失异常后重试，
/// 对应"异常返回后重新执行同一条指令"。命中时置访问位。
pub(crate) fn user_read_u8(vaddr: u32) -> u8 {
    let ops = mm::machine_ops();
    loop {
        if let Some((slot, mut entry)) = tlb_lookup(vaddr) {
            entry.used = true;
            ops.write_tlb_entry(slot, entry);

            let mut byte = [0u8; 1];
            ops.read_phys(entry.ppn.addr_with_offset(vaddr as usize % PAGE_SIZE), &mut byte);
            return byte[0];
        }
        raise_tlb_miss(vaddr);
    }
}

/// 模拟用户指令写一个字节（按需调页变体）。
///
/// 对只读页的写触发只读异常（击杀进程，不返回）。
pub(crate) fn user_write_u8(vaddr: u32, value: u8) {
    let ops = mm::machine_ops();
    loop {
        if let Some((slot, mut entry)) = tlb_lookup(vaddr) {
            if entry.read_only {
                MOCK_MACHINE.set_reg(reg::BAD_VADDR, vaddr);
                crate::trap::handle_exception(ExceptionCause::ReadOnly);
                unreachable!("write to a read-only page must kill the process");
            }
            entry.used = true;
            entry.dirty = true;
            ops.write_tlb_entry(slot, entry);

            ops.write_phys(entry.ppn.addr_with_offset(vaddr as usize % PAGE_SIZE), &[value]);
            return;
        }
        raise_tlb_miss(vaddr);
    }
}

fn raise_tlb_miss(vaddr: u32) {
    MOCK_MACHINE.set_reg(reg::BAD_VADDR, vaddr);
    crate::trap::handle_exception(ExceptionCause::TlbMiss);
}

// ========== 测试调度器 ==========

type Body = Box<dyn FnOnce() + Send>;

static PROGRAMS: SpinLock<VecDeque<Body>> = SpinLock::new(VecDeque::new());
static DEFERRED: SpinLock<VecDeque<(u64, Body)>> = SpinLock::new(VecDeque::new());
/// 当前线程栈：栈底（空栈）代表引导线程 1
static CURRENT_STACK: SpinLock<Vec<u64>> = SpinLock::new(Vec::new());
static WOKEN: SpinLock<Vec<u64>> = SpinLock::new(Vec::new());
static NEXT_TID: AtomicU64 = AtomicU64::new(2);
static EAGER: AtomicBool = AtomicBool::new(true);
static TERMINATED: AtomicBool = AtomicBool::new(false);

/// 切换 fork 行为：false 时 fork 只入队，由 [`run_next`] 泵动。
pub(crate) fn set_eager(eager: bool) {
    EAGER.store(eager, Ordering::SeqCst);
}

/// 运行延迟队列里的下一个线程体；队列空时返回 false。
pub(crate) fn run_next() -> bool {
    let job = DEFERRED.lock().pop_front();
    match job {
        Some((tid, body)) => {
            run_thread(tid, body);
            true
        }
        None => false,
    }
}

/// 内核是否已请求终止。
pub(crate) fn terminated() -> bool {
    TERMINATED.load(Ordering::SeqCst)
}

fn reset_sched() {
    PROGRAMS.lock().clear();
    DEFERRED.lock().clear();
    CURRENT_STACK.lock().clear();
    WOKEN.lock().clear();
    NEXT_TID.store(2, Ordering::SeqCst);
    EAGER.store(true, Ordering::SeqCst);
    TERMINATED.store(false, Ordering::SeqCst);
}

/// 在当前宿主线程上执行一个线程体；结束后切换回进入前的
/// 当前进程（真实机器上由调度器的上下文切换完成）。
fn run_thread(tid: u64, body: Body) {
    let previous = kernel::current_process();

    CURRENT_STACK.lock().push(tid);
    test_support::run_catching(body);
    CURRENT_STACK.lock().pop();

    if let Some(previous) = previous {
        kernel::switch_to(&previous);
    }
}

/// 测试调度器：单线程模拟内核线程。
struct TestSched;

static TEST_SCHED: TestSched = TestSched;

impl SchedOps for TestSched {
    fn fork(&self, _name: &str, body: Box<dyn FnOnce() + Send>) -> ThreadId {
        let tid = NEXT_TID.fetch_add(1, Ordering::SeqCst);
        if EAGER.load(Ordering::SeqCst) {
            run_thread(tid, body);
        } else {
            DEFERRED.lock().push_back((tid, body));
        }
        ThreadId(tid)
    }

    fn current_thread(&self) -> ThreadId {
        ThreadId(CURRENT_STACK.lock().last().copied().unwrap_or(1))
    }

    fn sleep_current(&self) {
        let me = self.current_thread().0;
        loop {
            {
                let mut woken = WOKEN.lock();
                if let Some(pos) = woken.iter().position(|&tid| tid == me) {
                    woken.remove(pos);
                    return;
                }
            }
            // 睡眠期间让别的线程运行；没有可运行线程即死锁
            assert!(run_next(), "thread {} sleeps with nothing runnable to wake it", me);
        }
    }

    fn ready(&self, thread: ThreadId) {
        WOKEN.lock().push(thread.0);
    }

    fn finish_current(&self) -> ! {
        test_support::thread_exit()
    }

    fn terminate_kernel(&self) -> ! {
        TERMINATED.store(true, Ordering::SeqCst);
        test_support::kernel_terminated()
    }
}

// ========== 处理器桥接 ==========

impl ProcessorOps for MockMachine {
    fn read_register(&self, r: usize) -> u32 {
        self.reg(r)
    }

    fn write_register(&self, r: usize, value: u32) {
        self.set_reg(r, value);
    }

    fn advance_pc(&self) {
        self.step_pc(reg::PC, reg::NEXT_PC);
    }

    fn run(&self) -> ! {
        let body = PROGRAMS.lock().pop_front();
        if let Some(body) = body {
            body();
        }
        // 程序体执行完即线程结束（真实用户程序会以 exit 收尾）
        test_support::thread_exit()
    }

    fn halt(&self) -> ! {
        self.set_halted();
        test_support::machine_halted()
    }
}

// ========== 内存桥接 ==========

fn from_raw(raw: RawTlbEntry) -> TranslationEntry {
    TranslationEntry {
        vpn: Vpn(raw.vpn),
        ppn: Ppn(raw.ppn),
        valid: raw.valid,
        read_only: raw.read_only,
        used: raw.used,
        dirty: raw.dirty,
    }
}

fn to_raw(entry: TranslationEntry) -> RawTlbEntry {
    RawTlbEntry {
        vpn: entry.vpn.as_usize(),
        ppn: entry.ppn.as_usize(),
        valid: entry.valid,
        read_only: entry.read_only,
        used: entry.used,
        dirty: entry.dirty,
    }
}

/// mm 的机器接口桥接（孤儿规则：mm 的 trait 配本地类型）
struct MachineBridge;

static MACHINE_BRIDGE: MachineBridge = MachineBridge;

impl mm::MachineMmOps for MachineBridge {
    fn num_phys_pages(&self) -> usize {
        MOCK_MACHINE.num_phys_pages()
    }

    fn tlb_size(&self) -> usize {
        MOCK_MACHINE.tlb_size()
    }

    fn read_phys(&self, paddr: Paddr, buf: &mut [u8]) {
        MOCK_MACHINE.read_memory(paddr.as_usize(), buf);
    }

    fn write_phys(&self, paddr: Paddr, data: &[u8]) {
        MOCK_MACHINE.write_memory(paddr.as_usize(), data);
    }

    fn fill_phys(&self, paddr: Paddr, byte: u8, len: usize) {
        MOCK_MACHINE.fill_memory(paddr.as_usize(), byte, len);
    }

    fn read_tlb_entry(&self, slot: usize) -> TranslationEntry {
        from_raw(MOCK_MACHINE.tlb_entry(slot))
    }

    fn write_tlb_entry(&self, slot: usize, entry: TranslationEntry) {
        MOCK_MACHINE.set_tlb_entry(slot, to_raw(entry));
    }

    fn set_page_table(&self, entries: &[TranslationEntry]) {
        MOCK_MACHINE.set_page_table(entries.iter().map(|e| to_raw(*e)).collect());
    }
}

struct ConfigBridge;

static CONFIG_BRIDGE: ConfigBridge = ConfigBridge;

impl mm::MmConfig for ConfigBridge {
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }
}

// ========== 控制台桥接 ==========

struct ConsoleBridge;

static CONSOLE_BRIDGE: ConsoleBridge = ConsoleBridge;

/// fd 0：从脚本化缓冲读
struct StdinBridge;

impl Stream for StdinBridge {
    fn read(&self, buf: &mut [u8]) -> usize {
        // 单线程测试里没有真正的阻塞：脚本喂多少读多少
        MOCK_CONSOLE.read_input(buf)
    }

    fn write(&self, _data: &[u8]) -> usize {
        0
    }
}

/// fd 1：写进捕获缓冲
struct StdoutBridge;

impl Stream for StdoutBridge {
    fn read(&self, _buf: &mut [u8]) -> usize {
        0
    }

    fn write(&self, data: &[u8]) -> usize {
        MOCK_CONSOLE.write_output(data);
        data.len()
    }
}

impl ConsoleOps for ConsoleBridge {
    fn open_stdin(&self) -> Arc<dyn Stream> {
        Arc::new(StdinBridge)
    }

    fn open_stdout(&self) -> Arc<dyn Stream> {
        Arc::new(StdoutBridge)
    }
}

// ========== 可执行文件桥接 ==========

struct ExecBridge;

static EXEC_BRIDGE: ExecBridge = ExecBridge;

impl ExecOps for ExecBridge {
    fn open_executable(&self, name: &[u8]) -> Option<Box<dyn CoffImage>> {
        MOCK_EXEC_FS
            .open(name)
            .map(|program| Box::new(CoffBridge(program)) as Box<dyn CoffImage>)
    }
}

/// 打开的假映像
struct CoffBridge(MockProgram);

impl CoffImage for CoffBridge {
    fn entry_point(&self) -> u32 {
        self.0.entry_point
    }

    fn num_sections(&self) -> usize {
        self.0.sections.len()
    }

    fn section(&self, index: usize) -> CoffSectionInfo {
        let section = &self.0.sections[index];
        let mut flags = SectionFlags::INITIALIZED;
        if section.read_only {
            flags |= SectionFlags::READ_ONLY;
        }
        CoffSectionInfo {
            name: section.name.clone(),
            first_vpn: self.0.first_vpn(index),
            length: section.data.len() / PAGE_SIZE,
            flags,
        }
    }

    fn load_page(&self, section: usize, spage: usize, ppn: Ppn) {
        let data = &self.0.sections[section].data[spage * PAGE_SIZE..(spage + 1) * PAGE_SIZE];
        mm::machine_ops().write_phys(ppn.start_addr(), data);
    }
}
