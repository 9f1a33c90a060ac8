//! 内核上下文与进程生命周期
//!
//! 本模块维护用户进程核心的全局状态：已创建进程总数（pid 来源）、
//! 存活进程数、根进程号、调页变体开关，以及当前运行的进程。
//! 这些状态集中在一个 [`KernelContext`] 里、由一把自旋锁保护，
//! 所有修改都发生在关中断的短临界区内。
//!
//! 存活计数归零时内核自动终止（经由调度器接口）。

pub mod loader;
pub mod process;
pub mod syscall;
pub mod umem;

#[cfg(test)]
mod tests;

pub use process::Process;

use crate::machine::thread::sched_ops;
use alloc::sync::Arc;
use lazy_static::lazy_static;
use mm::Pid;
use sync::{IntrGuard, SpinLock};

/// 内核全局上下文
///
/// 对应原本散落的全局量：把它们聚在一起，使"关中断临界区"
/// 有一个明确的保护对象。
pub struct KernelContext {
    /// 已创建进程总数，单调递增，pid 的来源
    pub(crate) total_created: Pid,
    /// 已 execute 且尚未完成销毁的进程数
    pub(crate) alive: i32,
    /// 根进程号（第一个创建的进程；只有它能停机）
    pub(crate) root_pid: Option<Pid>,
    /// 是否启用按需调页变体
    pub(crate) demand_paging: bool,
    /// 当前在处理器上运行的进程
    pub(crate) current: Option<Arc<Process>>,
}

impl KernelContext {
    fn fresh(demand_paging: bool) -> Self {
        KernelContext {
            total_created: 0,
            alive: 0,
            root_pid: None,
            demand_paging,
            current: None,
        }
    }
}

lazy_static! {
    /// 全局内核上下文实例，由自旋锁保护。
    pub(crate) static ref KERNEL: SpinLock<KernelContext> =
        SpinLock::new(KernelContext::fresh(false));
}

/// 初始化用户进程核心（内核启动入口）。
///
/// 选择地址空间变体，重置计数器，并用模拟机器的物理页数
/// 初始化帧池；按需调页变体还会清空倒排页表。
pub fn init(demand_paging: bool) {
    let _guard = IntrGuard::new();
    // 先丢弃旧状态（帧随 RAII 跟踪器回池），再重置帧池本身
    *KERNEL.lock() = KernelContext::fresh(demand_paging);
    mm::INVERTED_TABLE.lock().clear();
    mm::frame_allocator::init_frame_allocator(mm::machine_ops().num_phys_pages());
}

/// 当前运行的进程。
pub fn current_process() -> Option<Arc<Process>> {
    KERNEL.lock().current.clone()
}

/// 当前运行进程的 pid。
pub fn current_pid() -> Option<Pid> {
    KERNEL.lock().current.as_ref().map(|p| p.pid())
}

/// 上下文切换进内核的钩子：记录当前进程并恢复其地址空间状态。
///
/// 常驻变体把进程页表指给处理器；按需调页变体把上一个进程的
/// TLB 条目写回倒排页表并全部失效——TLB 是按 pid 的缓存。
pub fn switch_to(proc: &Arc<Process>) {
    let _guard = IntrGuard::new();
    let prev_pid = {
        let mut kernel = KERNEL.lock();
        let prev = kernel.current.as_ref().map(|p| p.pid());
        kernel.current = Some(Arc::clone(proc));
        prev
    };
    proc.restore_state(prev_pid);
}

/// 登记一次进程退出：存活数递减，归零时终止内核。
///
/// 由 [`Process::kill_process`] 在完成资源回收之后调用；不返回
/// 的终止路径也在那里。返回内核是否应当终止。
pub(crate) fn note_process_exit() -> bool {
    let mut kernel = KERNEL.lock();
    kernel.alive -= 1;
    assert!(kernel.alive >= 0, "Alive count is wrong!");
    kernel.alive == 0
}

/// 分配一个新的 pid；第一个分配到的进程当选根进程。
pub(crate) fn allocate_pid() -> (Pid, bool) {
    let mut kernel = KERNEL.lock();
    kernel.total_created += 1;
    let pid = kernel.total_created;
    let is_root = kernel.root_pid.is_none();
    if is_root {
        kernel.root_pid = Some(pid);
    }
    (pid, is_root)
}

/// 存活进程数（诊断/测试用）。
pub fn alive_processes() -> i32 {
    KERNEL.lock().alive
}

/// 终止路径的收尾：存活数归零时由销毁路径调用。
pub(crate) fn terminate() -> ! {
    kdebug::kdebug!('a', "last process exited, terminating kernel");
    sched_ops().terminate_kernel()
}
