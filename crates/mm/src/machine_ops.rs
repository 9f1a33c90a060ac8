//! 模拟机器内存接口 trait 定义和注册

use crate::address::Paddr;
use crate::page_table::TranslationEntry;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 模拟机器的内存管理接口
///
/// 此 trait 抽象了模拟处理器暴露给内核的内存资源：
/// 物理内存数组、软件重填的全相联 TLB，以及常驻模式下的
/// 进程页表指针。os crate 的嵌入方（或测试的 mock 机器）
/// 需要实现此 trait 并注册。
pub trait MachineMmOps: Send + Sync {
    /// 物理页数
    fn num_phys_pages(&self) -> usize;

    /// TLB 槽位数
    fn tlb_size(&self) -> usize;

    /// 从物理内存读取字节序列
    ///
    /// # Panics
    /// `paddr + buf.len()` 超出物理内存时由机器侧 panic，
    /// 内核必须保证只传入经过翻译的合法物理范围。
    fn read_phys(&self, paddr: Paddr, buf: &mut [u8]);

    /// 向物理内存写入字节序列
    fn write_phys(&self, paddr: Paddr, data: &[u8]);

    /// 以同一字节填充一段物理内存（用于清零帧）
    fn fill_phys(&self, paddr: Paddr, byte: u8, len: usize);

    /// 读取 TLB 槽位
    fn read_tlb_entry(&self, slot: usize) -> TranslationEntry;

    /// 写入 TLB 槽位
    fn write_tlb_entry(&self, slot: usize, entry: TranslationEntry);

    /// 指定常驻模式下处理器使用的进程页表
    fn set_page_table(&self, entries: &[TranslationEntry]);
}

static MACHINE_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static MACHINE_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册机器内存接口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_machine_ops(ops: &'static dyn MachineMmOps) {
    let ptr = ops as *const dyn MachineMmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn MachineMmOps, (usize, usize)>(ptr) };
    MACHINE_OPS_DATA.store(data, Ordering::Release);
    MACHINE_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的机器内存接口实现
///
/// # Panics
/// 如果尚未调用 [`register_machine_ops`] 注册实现，则 panic
#[inline]
pub fn machine_ops() -> &'static dyn MachineMmOps {
    let data = MACHINE_OPS_DATA.load(Ordering::Acquire);
    let vtable = MACHINE_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("mm: MachineMmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn MachineMmOps>((data, vtable)) }
}
