//! 模拟处理器接口 trait 定义和注册
//!
//! MIPS 用户寄存器组的编号约定与模拟器一致：通用寄存器 0..32，
//! 其后是 LO/HI、PC、下一条 PC 和坏地址寄存器。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 用户寄存器总数
pub const NUM_USER_REGISTERS: usize = 38;

/// 寄存器编号常量
pub mod reg {
    /// 系统调用号 / 返回值
    pub const V0: usize = 2;
    pub const V1: usize = 3;
    /// 系统调用参数 0..3
    pub const A0: usize = 4;
    pub const A1: usize = 5;
    pub const A2: usize = 6;
    pub const A3: usize = 7;
    /// 栈指针
    pub const SP: usize = 29;
    pub const RA: usize = 31;
    pub const LO: usize = 32;
    pub const HI: usize = 33;
    /// 程序计数器
    pub const PC: usize = 34;
    pub const NEXT_PC: usize = 35;
    /// 触发异常的虚拟地址
    pub const BAD_VADDR: usize = 36;
}

/// 用户态异常原因
///
/// 与模拟处理器的异常编号一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCause {
    /// 系统调用陷入
    Syscall,
    /// 页错误（常驻变体的页表翻译失败）
    PageFault,
    /// TLB 缺失（按需调页变体）
    TlbMiss,
    /// 对只读页的写
    ReadOnly,
    /// 总线错误
    BusError,
    /// 地址错误
    AddressError,
    /// 算术溢出
    Overflow,
    /// 非法指令
    IllegalInstruction,
}

impl ExceptionCause {
    /// 诊断用名字
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionCause::Syscall => "syscall",
            ExceptionCause::PageFault => "page fault",
            ExceptionCause::TlbMiss => "TLB miss",
            ExceptionCause::ReadOnly => "read-only",
            ExceptionCause::BusError => "bus error",
            ExceptionCause::AddressError => "address error",
            ExceptionCause::Overflow => "overflow",
            ExceptionCause::IllegalInstruction => "illegal instruction",
        }
    }
}

/// 模拟处理器接口
///
/// 寄存器读写只作用于**当前**在处理器上运行的用户上下文；
/// 上下文切换由线程系统配合 [`crate::kernel::switch_to`] 完成。
pub trait ProcessorOps: Send + Sync {
    /// 读取用户寄存器
    fn read_register(&self, reg: usize) -> u32;

    /// 写入用户寄存器
    fn write_register(&self, reg: usize, value: u32);

    /// 前进一条指令：PC ← nextPC，nextPC += 4
    fn advance_pc(&self);

    /// 在当前线程上开始执行用户代码；不返回
    fn run(&self) -> !;

    /// 停机整台模拟机器；不返回
    fn halt(&self) -> !;
}

static PROCESSOR_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static PROCESSOR_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册处理器接口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_processor_ops(ops: &'static dyn ProcessorOps) {
    let ptr = ops as *const dyn ProcessorOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ProcessorOps, (usize, usize)>(ptr) };
    PROCESSOR_OPS_DATA.store(data, Ordering::Release);
    PROCESSOR_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的处理器接口实现
///
/// # Panics
/// 如果尚未调用 [`register_processor_ops`] 注册实现，则 panic
#[inline]
pub fn processor_ops() -> &'static dyn ProcessorOps {
    let data = PROCESSOR_OPS_DATA.load(Ordering::Acquire);
    let vtable = PROCESSOR_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("os: ProcessorOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ProcessorOps>((data, vtable)) }
}
