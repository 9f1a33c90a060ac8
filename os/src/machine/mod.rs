//! 模拟机器接口
//!
//! 内核消费的全部外部协作者在此以 trait 形式声明，
//! 每个关注点一个接口、一次注册：
//!
//! - [`processor`] —— 模拟处理器：用户寄存器组、运行与停机
//! - [`coff`] —— COFF 解析器与宿主文件系统：打开可执行映像
//! - [`console`] —— 控制台设备：阻塞字节流 stdin/stdout
//! - [`thread`] —— 线程调度器：fork/睡眠/唤醒/结束
//!
//! 物理内存和 TLB 的访问接口在 `mm` crate（`MachineMmOps`），
//! 中断控制线在 `sync` crate（`ArchOps`）。

pub mod coff;
pub mod console;
pub mod processor;
pub mod thread;

pub use coff::{CoffImage, CoffSectionInfo, ExecOps, SectionFlags, exec_ops, register_exec_ops};
pub use console::{ConsoleOps, Stream, console_ops, register_console_ops};
pub use processor::{
    ExceptionCause, NUM_USER_REGISTERS, ProcessorOps, processor_ops, reg, register_processor_ops,
};
pub use thread::{SchedOps, ThreadId, register_sched_ops, sched_ops};
