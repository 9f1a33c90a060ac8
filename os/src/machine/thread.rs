//! 线程调度器接口 trait 定义和注册
//!
//! 内核线程系统（调度、上下文切换、就绪队列）是外部协作者；
//! 进程生命周期管理只需要这里列出的几个操作。
//! `sleep_current` 和 `ready` 必须在关中断状态下调用，
//! "检查条件—睡眠"序列的原子性由调用方的中断保护保证。

use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 不透明的内核线程句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

/// 线程调度器接口
pub trait SchedOps: Send + Sync {
    /// 创建一个新内核线程执行 `body` 并使其就绪
    fn fork(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> ThreadId;

    /// 当前线程的句柄
    fn current_thread(&self) -> ThreadId;

    /// 让当前线程睡眠，直到被 [`SchedOps::ready`] 唤醒
    ///
    /// 必须在关中断状态下调用。
    fn sleep_current(&self);

    /// 唤醒一个睡眠中的线程
    ///
    /// 必须在关中断状态下调用。
    fn ready(&self, thread: ThreadId);

    /// 结束当前线程；不返回
    fn finish_current(&self) -> !;

    /// 终止整个内核（最后一个进程退出时）；不返回
    fn terminate_kernel(&self) -> !;
}

static SCHED_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static SCHED_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册调度器接口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_sched_ops(ops: &'static dyn SchedOps) {
    let ptr = ops as *const dyn SchedOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn SchedOps, (usize, usize)>(ptr) };
    SCHED_OPS_DATA.store(data, Ordering::Release);
    SCHED_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的调度器接口实现
///
/// # Panics
/// 如果尚未调用 [`register_sched_ops`] 注册实现，则 panic
#[inline]
pub fn sched_ops() -> &'static dyn SchedOps {
    let data = SCHED_OPS_DATA.load(Ordering::Acquire);
    let vtable = SCHED_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("os: SchedOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn SchedOps>((data, vtable)) }
}
