//! 控制台设备接口 trait 定义和注册
//!
//! 内核只认识两个文件描述符：fd 0 是控制台输入，fd 1 是控制台
//! 输出。两者都是阻塞字节流；每个进程在构造时各自打开一份，
//! 退出时关闭。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 阻塞字节流
pub trait Stream: Send + Sync {
    /// 读取字节，至少阻塞到有一个字节可读。返回读到的字节数。
    fn read(&self, buf: &mut [u8]) -> usize;

    /// 写入字节。返回写出的字节数。
    fn write(&self, data: &[u8]) -> usize;

    /// 关闭流。之后的读写行为未定义。
    fn close(&self) {}
}

/// 控制台设备接口
pub trait ConsoleOps: Send + Sync {
    /// 打开控制台输入流
    fn open_stdin(&self) -> Arc<dyn Stream>;

    /// 打开控制台输出流
    fn open_stdout(&self) -> Arc<dyn Stream>;
}

static CONSOLE_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static CONSOLE_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册控制台接口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_console_ops(ops: &'static dyn ConsoleOps) {
    let ptr = ops as *const dyn ConsoleOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ConsoleOps, (usize, usize)>(ptr) };
    CONSOLE_OPS_DATA.store(data, Ordering::Release);
    CONSOLE_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的控制台接口实现
///
/// # Panics
/// 如果尚未调用 [`register_console_ops`] 注册实现，则 panic
#[inline]
pub fn console_ops() -> &'static dyn ConsoleOps {
    let data = CONSOLE_OPS_DATA.load(Ordering::Acquire);
    let vtable = CONSOLE_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("os: ConsoleOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ConsoleOps>((data, vtable)) }
}
