//! 测试支持 crate
//!
//! 为各 crate 的宿主机测试提供模拟机器的原始 Mock 和测试工具。
//!
//! # 依赖纪律
//!
//! 这里刻意**不依赖** `mm` 和 `os`：被测 crate 的 dev-dependency
//! 如果反过来依赖被测 crate，同一个测试进程里会出现它的两份拷贝
//! （各带一套全局量），注册机制随之失效。因此 mock 只持有原始
//! 状态（字节、寄存器值、[`RawTlbEntry`]），各 crate 在自己的
//! `cfg(test)` 代码里为这些类型实现各自的 ops trait 并注册。
//! `sync` 是唯一例外：它位于依赖栈底，自己的测试不用本 crate。
//!
//! # 不返回接口的模拟
//!
//! 机器接口里有三个 `-> !` 的操作（线程结束、停机、内核终止）。
//! 宿主机测试在单线程里模拟它们：以带类型的 panic 载荷展开，
//! 由 [`run_catching`] 收住；其它 panic（测试断言失败）原样续传。
//!
//! # 串行化
//!
//! 内核的全局量是进程级共享状态，而 `cargo test` 并行跑用例；
//! 每个用例以 [`serial`] 开头持有全局锁。

pub mod mock;

pub use mock::console::MOCK_CONSOLE;
pub use mock::fs::{MOCK_EXEC_FS, MockProgram, MockSection};
pub use mock::machine::{MOCK_MACHINE, PAGE_SIZE, RawTlbEntry, TLB_SIZE};

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Mutex, MutexGuard};

static SERIAL: Mutex<()> = Mutex::new(());

/// 测试串行锁的守卫；存活期间其它用例不会触碰内核全局量。
pub struct SerialGuard {
    _lock: MutexGuard<'static, ()>,
}

/// 获取测试串行锁。
pub fn serial() -> SerialGuard {
    // 预期之内的击杀路径 panic 会毒化锁；状态反正会被重置
    let lock = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    SerialGuard { _lock: lock }
}

// ========== 不返回接口的展开载荷 ==========

/// 线程结束载荷（`finish_current`）
pub struct ThreadExit;

/// 停机载荷（`halt`）
pub struct MachineHalted;

/// 内核终止载荷（`terminate_kernel`）
pub struct KernelTerminated;

/// 以线程结束载荷展开当前"线程"。
pub fn thread_exit() -> ! {
    std::panic::panic_any(ThreadExit)
}

/// 以停机载荷展开。
pub fn machine_halted() -> ! {
    std::panic::panic_any(MachineHalted)
}

/// 以内核终止载荷展开。
pub fn kernel_terminated() -> ! {
    std::panic::panic_any(KernelTerminated)
}

/// 执行一个线程体，吞掉认识的结束载荷。
///
/// 测试断言等真实 panic 原样续传。
pub fn run_catching(body: Box<dyn FnOnce() + Send>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(body)) {
        if payload.is::<ThreadExit>()
            || payload.is::<MachineHalted>()
            || payload.is::<KernelTerminated>()
        {
            return;
        }
        resume_unwind(payload);
    }
}
